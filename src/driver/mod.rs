//! Browser driver abstraction.
//!
//! Two engines with incompatible native protocols sit behind the
//! [`BrowserDriver`] trait: a DevTools-protocol Chromium ([`chromium`]) and
//! a WebDriver-server browser ([`webdriver`]). Callers never see protocol
//! details; page reads go through the closed set of named queries in
//! [`PageQuery`], each of which expands to a fixed script template with
//! JSON-escaped arguments.

pub mod chromium;
pub mod webdriver;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::config::{EngineKind, PilotConfig};
use crate::types::{ScrollDirection, Viewport};

pub use chromium::ChromiumDriver;
pub use webdriver::WebDriverDriver;

/// Errors surfaced by browser drivers.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Protocol or page-level failure with a human readable message.
    #[error("{0}")]
    Message(String),
    /// The driver has not been initialized or was already closed.
    #[error("driver not initialized")]
    NotInitialized,
    /// No driver exists for the requested engine name.
    #[error("unsupported engine '{name}'")]
    UnsupportedEngine { name: String },
    /// A driver operation exceeded its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("serialization failure: {0}")]
    Serde(#[from] serde_json::Error),
}

impl DriverError {
    pub fn message(message: impl Into<String>) -> Self {
        DriverError::Message(message.into())
    }
}

/// Options applied when a driver session is brought up.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub timeout_ms: u64,
    pub viewport: Viewport,
    pub chrome_executable: Option<String>,
    pub webdriver_url: String,
    /// Applied at session start. The WebDriver engine can only set the
    /// user agent here; Chromium can also change it later.
    pub user_agent: Option<String>,
}

impl LaunchOptions {
    pub fn from_config(config: &PilotConfig) -> Self {
        Self {
            headless: config.headless,
            timeout_ms: config.timeout_ms,
            viewport: config.viewport,
            chrome_executable: config.chrome_executable.clone(),
            webdriver_url: config.webdriver_url.clone(),
            user_agent: config.user_agent.clone(),
        }
    }
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self::from_config(&PilotConfig::default())
    }
}

/// Named page queries.
///
/// The set is closed so callers cannot smuggle arbitrary script into the
/// page. Every variant expands through [`PageQuery::script`] into an IIFE
/// with its arguments escaped via `serde_json::to_string`, which also
/// defuses quotes and backslashes in selectors and text.
#[derive(Debug, Clone, PartialEq)]
pub enum PageQuery {
    /// Whether any element matches the selector.
    ElementExists { selector: String },
    /// Bounding rect of the first match, or `null` when nothing matches.
    BoundingBox { selector: String },
    /// Scroll the first match into the viewport center. Returns a bool.
    ScrollIntoView { selector: String },
    /// Non-empty trimmed text content of every match.
    ExtractTexts { selector: String },
    /// First visible element whose text contains the needle
    /// (case-insensitive), with geometry and a best-effort selector.
    FindByText { text: String },
    /// Pruned DOM tree rooted at `<body>`, limited to `max_depth` levels.
    DomTree { max_depth: u32 },
    /// Scroll the window by a pixel delta. Returns a bool.
    ScrollBy { dx: i64, dy: i64 },
    /// Append text to the focused input and fire input/change events.
    TypeActive { text: String },
    /// Dispatch key events for one key to the focused element.
    PressActive { key: String },
    /// `document.readyState`.
    ReadyState,
    /// `document.title`.
    Title,
    /// `window.location.href`.
    Url,
}

impl PageQuery {
    /// Render the query as a self-contained script expression.
    pub fn script(&self) -> String {
        match self {
            PageQuery::ElementExists { selector } => format!(
                "(() => document.querySelector({}) !== null)()",
                js_string(selector)
            ),
            PageQuery::BoundingBox { selector } => format!(
                r#"(() => {{
  const el = document.querySelector({});
  if (!el) return null;
  const r = el.getBoundingClientRect();
  return {{ x: r.x, y: r.y, width: r.width, height: r.height }};
}})()"#,
                js_string(selector)
            ),
            PageQuery::ScrollIntoView { selector } => format!(
                r#"(() => {{
  const el = document.querySelector({});
  if (!el) return false;
  el.scrollIntoView({{ block: 'center', inline: 'center' }});
  return true;
}})()"#,
                js_string(selector)
            ),
            PageQuery::ExtractTexts { selector } => format!(
                r#"(() => Array.from(document.querySelectorAll({}))
  .map((el) => (el.textContent || '').trim())
  .filter((text) => text.length > 0))()"#,
                js_string(selector)
            ),
            PageQuery::FindByText { text } => format!(
                r#"(() => {{
  const needle = {}.toLowerCase();
  const nodes = document.querySelectorAll(
    'a, button, input, select, textarea, [role], label, h1, h2, h3, span, div'
  );
  for (const el of nodes) {{
    const text = ((el.textContent || el.value || '') + '').trim().toLowerCase();
    if (!text || !text.includes(needle)) continue;
    const r = el.getBoundingClientRect();
    if (r.width <= 0 || r.height <= 0) continue;
    let selector = el.tagName.toLowerCase();
    if (el.id) selector += '#' + el.id;
    return {{ selector, x: r.x, y: r.y, width: r.width, height: r.height }};
  }}
  return null;
}})()"#,
                js_string(text)
            ),
            PageQuery::DomTree { max_depth } => format!(
                r#"(() => {{
  const prune = (el, depth) => {{
    const node = {{ tag: el.tagName.toLowerCase() }};
    if (el.id) node.id = el.id;
    if (el.className && typeof el.className === 'string') node.class = el.className;
    const text = (el.textContent || '').trim();
    if (text) node.text = text.slice(0, 100);
    if (depth > 1) {{
      const children = [];
      for (const child of el.children) children.push(prune(child, depth - 1));
      if (children.length) node.children = children;
    }}
    return node;
  }};
  return document.body ? prune(document.body, {max_depth}) : null;
}})()"#
            ),
            PageQuery::ScrollBy { dx, dy } => format!(
                "(() => {{ window.scrollBy({dx}, {dy}); return true; }})()"
            ),
            PageQuery::TypeActive { text } => format!(
                r#"(() => {{
  const el = document.activeElement;
  if (!el || !('value' in el)) return false;
  el.value = (el.value || '') + {};
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return true;
}})()"#,
                js_string(text)
            ),
            PageQuery::PressActive { key } => format!(
                r#"(() => {{
  const key = {};
  const el = document.activeElement || document.body;
  for (const kind of ['keydown', 'keypress', 'keyup']) {{
    el.dispatchEvent(new KeyboardEvent(kind, {{ key, bubbles: true }}));
  }}
  if (key === 'Enter' && el.form) {{
    el.form.requestSubmit ? el.form.requestSubmit() : el.form.submit();
  }}
  return true;
}})()"#,
                js_string(key)
            ),
            PageQuery::ReadyState => "document.readyState".to_string(),
            PageQuery::Title => "document.title".to_string(),
            PageQuery::Url => "window.location.href".to_string(),
        }
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Protocol-neutral browser session.
///
/// `initialize` must succeed before any other call; drivers answer
/// [`DriverError::NotInitialized`] otherwise. `close` is idempotent.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Engine behind this driver, used for logging and dispatch.
    fn engine(&self) -> EngineKind;

    async fn initialize(&mut self, options: &LaunchOptions) -> Result<(), DriverError>;

    async fn goto(&self, url: &str) -> Result<(), DriverError>;

    async fn close(&mut self) -> Result<(), DriverError>;

    /// Capture the current page as an encoded image.
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;

    /// Run one named query against the page.
    async fn query(&self, query: &PageQuery) -> Result<JsonValue, DriverError>;

    async fn dimensions(&self) -> Result<Viewport, DriverError>;

    /// Click at viewport coordinates, then wait briefly for the page to
    /// settle. A settle timeout is swallowed; the click itself already
    /// succeeded.
    async fn click_at(&self, x: f64, y: f64) -> Result<(), DriverError>;

    /// Type into whatever currently has focus.
    async fn type_text(&self, text: &str) -> Result<(), DriverError>;

    async fn press_key(&self, key: &str) -> Result<(), DriverError>;

    async fn scroll(&self, direction: ScrollDirection, distance: i64) -> Result<(), DriverError>;

    async fn set_user_agent(&self, user_agent: &str) -> Result<(), DriverError>;
}

/// Build an uninitialized driver for the given engine.
pub fn create_driver(engine: EngineKind) -> Box<dyn BrowserDriver> {
    match engine {
        EngineKind::Chromium => Box::new(ChromiumDriver::new()),
        EngineKind::Webdriver => Box::new(WebDriverDriver::new()),
    }
}

/// Build a driver from an engine name, rejecting unknown names up front.
pub fn create_driver_named(name: &str) -> Result<Box<dyn BrowserDriver>, DriverError> {
    let engine = EngineKind::parse(name).ok_or_else(|| DriverError::UnsupportedEngine {
        name: name.to_string(),
    })?;
    Ok(create_driver(engine))
}

pub(crate) const CLICK_SETTLE_TIMEOUT: Duration = Duration::from_millis(2_000);
pub(crate) const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Poll `document.readyState` until it reports `complete` or the deadline
/// passes. Both outcomes return normally; a stuck page is not an error at
/// this layer.
pub(crate) async fn settle_after_interaction(driver: &dyn BrowserDriver, deadline: Duration) {
    let start = Instant::now();
    while start.elapsed() < deadline {
        match driver.query(&PageQuery::ReadyState).await {
            Ok(value) if value.as_str() == Some("complete") => return,
            Ok(_) => {}
            Err(_) => return,
        }
        tokio::time::sleep(SETTLE_POLL_INTERVAL).await;
    }
}
