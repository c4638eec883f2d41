//! Browser action agent.
//!
//! [`ActionAgent`] owns a [`BrowserDriver`] and exposes page actions that
//! always answer with an [`ActionResult`] envelope instead of propagating
//! driver errors to the caller. A strict session state machine sits in
//! front of the driver: `Uninitialized` until a successful `initialize`,
//! `Initialized` while the session is live, `Closed` after `close`. Every
//! action other than `initialize`/`close` requires `Initialized` and
//! otherwise fails with the exact error string `Browser not initialized`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Value as JsonValue};

use crate::config::{EngineKind, PilotConfig};
use crate::driver::{create_driver, BrowserDriver, DriverError, LaunchOptions, PageQuery};
use crate::logging::{LogConfig, PilotLogRecord, PilotLogger};
use crate::types::{ActionResult, ScrollDirection, StructuredValue, Viewport};

/// Error string every gated action reports before initialization.
pub const ERR_NOT_INITIALIZED: &str = "Browser not initialized";

const NAVIGATION_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Session lifecycle of an agent. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Uninitialized,
    Initialized,
    Closed,
}

pub struct ActionAgent {
    driver: Box<dyn BrowserDriver>,
    config: PilotConfig,
    logger: Arc<PilotLogger>,
    state: AgentState,
    screenshot_seq: AtomicU64,
}

impl ActionAgent {
    /// Build an agent with the driver selected by `config.engine`.
    pub fn new(config: PilotConfig) -> Self {
        let driver = create_driver(config.engine);
        Self::with_driver(driver, config)
    }

    /// Build an agent around an explicit driver. Useful for tests and for
    /// callers that construct drivers themselves.
    pub fn with_driver(driver: Box<dyn BrowserDriver>, config: PilotConfig) -> Self {
        let mut log_config = LogConfig::new(config.verbose);
        if let Some(sink) = config.logger.clone() {
            log_config.external_logger = Some(Arc::new(move |record: &PilotLogRecord| {
                sink(&format!(
                    "[{}][{}] {}",
                    record.category.as_deref().unwrap_or("pilot"),
                    record.level.label().to_lowercase(),
                    record.message
                ));
            }));
        }
        let logger = Arc::new(PilotLogger::with_config(log_config));
        Self {
            driver,
            config,
            logger,
            state: AgentState::Uninitialized,
            screenshot_seq: AtomicU64::new(1),
        }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn config(&self) -> &PilotConfig {
        &self.config
    }

    pub fn logger(&self) -> Arc<PilotLogger> {
        Arc::clone(&self.logger)
    }

    /// Bring up the browser session.
    ///
    /// Idempotent while initialized; fails once the agent is closed. If the
    /// driver fails part way through, any half-open session is torn down
    /// best effort and the agent stays `Uninitialized`.
    pub async fn initialize(&mut self) -> ActionResult {
        match self.state {
            AgentState::Initialized => return ActionResult::ok(),
            AgentState::Closed => {
                return ActionResult::fail("Browser session already closed");
            }
            AgentState::Uninitialized => {}
        }

        let options = LaunchOptions::from_config(&self.config);
        self.logger.info(
            format!("initializing {} driver", self.driver.engine().label()),
            Some("agent"),
            None,
        );

        if let Err(err) = self.driver.initialize(&options).await {
            self.logger.error(
                format!("driver initialization failed: {err}"),
                Some("agent"),
                None,
            );
            if let Err(close_err) = self.driver.close().await {
                self.logger.debug(
                    format!("cleanup after failed initialization also failed: {close_err}"),
                    Some("agent"),
                    None,
                );
            }
            return ActionResult::fail(err.to_string());
        }

        self.state = AgentState::Initialized;
        ActionResult::ok()
    }

    /// Shut the session down.
    ///
    /// A close before initialization is a no-op and the agent can still
    /// be initialized afterwards. Closing a live session is final.
    pub async fn close(&mut self) -> ActionResult {
        match self.state {
            AgentState::Uninitialized | AgentState::Closed => return ActionResult::ok(),
            AgentState::Initialized => {}
        }

        match self.driver.close().await {
            Ok(()) => {
                self.state = AgentState::Closed;
                ActionResult::ok()
            }
            Err(err) => {
                self.logger
                    .error(format!("driver close failed: {err}"), Some("agent"), None);
                ActionResult::fail(err.to_string())
            }
        }
    }

    fn guard(&self) -> Result<(), ActionResult> {
        if self.state == AgentState::Initialized {
            Ok(())
        } else {
            Err(ActionResult::fail(ERR_NOT_INITIALIZED))
        }
    }

    pub async fn navigate(&self, url: &str) -> ActionResult {
        if let Err(result) = self.guard() {
            return result;
        }

        self.logger
            .info(format!("navigating to {url}"), Some("action"), None);
        match self.driver.goto(url).await {
            Ok(()) => ActionResult::ok_with(json!({ "url": url })),
            Err(err) => ActionResult::fail(format!("navigate failed for '{url}': {err}")),
        }
    }

    /// Poll `document.readyState` until it is `complete` or the deadline
    /// passes. A timeout is still a success; slow pages are routine and
    /// the caller decides what to do next.
    pub async fn wait_for_navigation(&self, timeout_ms: Option<u64>) -> ActionResult {
        if let Err(result) = self.guard() {
            return result;
        }

        let deadline = Duration::from_millis(timeout_ms.unwrap_or(self.config.timeout_ms));
        let start = Instant::now();

        loop {
            match self.driver.query(&PageQuery::ReadyState).await {
                Ok(value) if value.as_str() == Some("complete") => {
                    return ActionResult::ok_with(json!({ "complete": true }));
                }
                Ok(_) => {}
                Err(err) => {
                    return ActionResult::fail(format!("navigation wait failed: {err}"));
                }
            }

            if start.elapsed() >= deadline {
                self.logger.debug(
                    format!("navigation wait hit deadline after {deadline:?}"),
                    Some("action"),
                    None,
                );
                return ActionResult::ok_with(json!({ "complete": false }));
            }
            tokio::time::sleep(NAVIGATION_POLL_INTERVAL).await;
        }
    }

    /// Click the center of the first element matching the selector.
    pub async fn click(&self, selector: &str) -> ActionResult {
        if let Err(result) = self.guard() {
            return result;
        }

        match self.click_selector(selector).await {
            Ok(()) => ActionResult::ok_with(json!({ "selector": selector })),
            Err(err) => ActionResult::fail(err),
        }
    }

    /// Click the element, then type into whatever took focus.
    pub async fn type_into(&self, selector: &str, text: &str) -> ActionResult {
        if let Err(result) = self.guard() {
            return result;
        }

        if let Err(err) = self.click_selector(selector).await {
            return ActionResult::fail(err);
        }
        match self.driver.type_text(text).await {
            Ok(()) => ActionResult::ok_with(json!({ "selector": selector })),
            Err(err) => ActionResult::fail(format!("type failed for '{selector}': {err}")),
        }
    }

    /// Type into the currently focused element.
    pub async fn type_text(&self, text: &str) -> ActionResult {
        if let Err(result) = self.guard() {
            return result;
        }

        match self.driver.type_text(text).await {
            Ok(()) => ActionResult::ok(),
            Err(err) => ActionResult::fail(format!("type failed: {err}")),
        }
    }

    pub async fn press_key(&self, key: &str) -> ActionResult {
        if let Err(result) = self.guard() {
            return result;
        }

        match self.driver.press_key(key).await {
            Ok(()) => ActionResult::ok(),
            Err(err) => ActionResult::fail(format!("press failed for '{key}': {err}")),
        }
    }

    pub async fn scroll(&self, direction: ScrollDirection, distance: i64) -> ActionResult {
        if let Err(result) = self.guard() {
            return result;
        }

        match self.driver.scroll(direction, distance).await {
            Ok(()) => ActionResult::ok(),
            Err(err) => ActionResult::fail(format!("scroll {direction} failed: {err}")),
        }
    }

    pub async fn set_user_agent(&self, user_agent: &str) -> ActionResult {
        if let Err(result) = self.guard() {
            return result;
        }

        match self.driver.set_user_agent(user_agent).await {
            Ok(()) => ActionResult::ok(),
            Err(err) => ActionResult::fail(format!("set user agent failed: {err}")),
        }
    }

    /// Capture the page and write it under `<output_dir>/screenshots/`.
    pub async fn screenshot(&self) -> ActionResult {
        if let Err(result) = self.guard() {
            return result;
        }

        match self.write_screenshot().await {
            Ok((path, _)) => ActionResult::ok_with(json!({ "path": path })),
            Err(err) => ActionResult::fail(format!("screenshot failed: {err}")),
        }
    }

    /// Extract trimmed text from every element matching the selector.
    pub async fn extract_text(&self, selector: &str) -> ActionResult {
        if let Err(result) = self.guard() {
            return result;
        }

        match self.query_texts(selector).await {
            Ok(texts) => ActionResult::ok_with(json!({
                "selector": selector,
                "texts": texts,
            })),
            Err(err) => ActionResult::fail(format!("extract failed for '{selector}': {err}")),
        }
    }

    /// Extract one value per named field.
    ///
    /// Each field collapses to `null` (no match), a single string, or an
    /// array of strings depending on how many elements matched.
    pub async fn extract_structured(&self, fields: &BTreeMap<String, String>) -> ActionResult {
        if let Err(result) = self.guard() {
            return result;
        }

        let mut extracted = serde_json::Map::new();
        for (name, selector) in fields {
            match self.query_texts(selector).await {
                Ok(texts) => {
                    let value = StructuredValue::from_texts(texts);
                    match serde_json::to_value(&value) {
                        Ok(rendered) => {
                            extracted.insert(name.clone(), rendered);
                        }
                        Err(err) => return ActionResult::fail(err.to_string()),
                    }
                }
                Err(err) => {
                    return ActionResult::fail(format!(
                        "extract failed for '{selector}': {err}"
                    ))
                }
            }
        }

        ActionResult::ok_with(JsonValue::Object(extracted))
    }

    // --- lower-level helpers shared with the snapshot and pilot layers ---

    pub(crate) async fn page_url(&self) -> Result<String, DriverError> {
        let value = self.driver.query(&PageQuery::Url).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub(crate) async fn page_title(&self) -> Result<String, DriverError> {
        let value = self.driver.query(&PageQuery::Title).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub(crate) async fn viewport(&self) -> Result<Viewport, DriverError> {
        self.driver.dimensions().await
    }

    pub(crate) async fn run_query(&self, query: &PageQuery) -> Result<JsonValue, DriverError> {
        self.driver.query(query).await
    }

    pub(crate) async fn click_point(&self, x: f64, y: f64) -> Result<(), DriverError> {
        self.driver.click_at(x, y).await
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.state == AgentState::Initialized
    }

    async fn query_texts(&self, selector: &str) -> Result<Vec<String>, DriverError> {
        let value = self
            .driver
            .query(&PageQuery::ExtractTexts {
                selector: selector.to_string(),
            })
            .await?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    pub(crate) async fn click_selector(&self, selector: &str) -> Result<(), String> {
        let exists = self
            .driver
            .query(&PageQuery::ElementExists {
                selector: selector.to_string(),
            })
            .await
            .map_err(|err| format!("click failed for '{selector}': {err}"))?;
        if exists.as_bool() != Some(true) {
            return Err(format!("no element matches selector '{selector}'"));
        }

        // Bring the element on screen so the rect is in viewport
        // coordinates the input layer can use.
        let scrolled = self
            .driver
            .query(&PageQuery::ScrollIntoView {
                selector: selector.to_string(),
            })
            .await
            .map_err(|err| format!("click failed for '{selector}': {err}"))?;
        if scrolled.as_bool() != Some(true) {
            return Err(format!("no element matches selector '{selector}'"));
        }

        let rect = self
            .driver
            .query(&PageQuery::BoundingBox {
                selector: selector.to_string(),
            })
            .await
            .map_err(|err| format!("click failed for '{selector}': {err}"))?;

        let (x, y) = match rect_center(&rect) {
            Some(center) => center,
            None => return Err(format!("no element matches selector '{selector}'")),
        };

        self.driver
            .click_at(x, y)
            .await
            .map_err(|err| format!("click failed for '{selector}': {err}"))
    }

    /// Capture the page and persist it, returning the path and raw bytes.
    pub(crate) async fn write_screenshot(&self) -> Result<(String, Vec<u8>), DriverError> {
        let bytes = self.driver.screenshot().await?;
        let path = self.next_screenshot_path();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| DriverError::message(err.to_string()))?;
        }
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|err| DriverError::message(err.to_string()))?;

        self.logger.debug(
            format!("screenshot written to {}", path.display()),
            Some("action"),
            None,
        );
        Ok((path.to_string_lossy().into_owned(), bytes))
    }

    fn next_screenshot_path(&self) -> PathBuf {
        // Chromium captures JPEG; the WebDriver protocol only exposes PNG.
        let extension = match self.driver.engine() {
            EngineKind::Chromium => "jpg",
            EngineKind::Webdriver => "png",
        };
        let seq = self.screenshot_seq.fetch_add(1, Ordering::Relaxed);
        let epoch_ms = Utc::now().timestamp_millis();
        Path::new(&self.config.output_dir)
            .join("screenshots")
            .join(format!("screenshot-{epoch_ms}-{seq}.{extension}"))
    }
}

fn rect_center(rect: &JsonValue) -> Option<(f64, f64)> {
    let x = rect.get("x")?.as_f64()?;
    let y = rect.get("y")?.as_f64()?;
    let width = rect.get("width")?.as_f64()?;
    let height = rect.get("height")?.as_f64()?;
    Some((x + width / 2.0, y + height / 2.0))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::config::EngineKind;
    use crate::driver::LaunchOptions;

    /// Scripted in-memory driver that records every call.
    pub(crate) struct MockDriver {
        pub engine: EngineKind,
        pub calls: Arc<Mutex<Vec<String>>>,
        /// Response returned for `BoundingBox`; `null` means no element.
        pub bounding_box: JsonValue,
        /// Response returned for `ExtractTexts`.
        pub texts: JsonValue,
        /// Response returned for `FindByText`; `null` means no element.
        pub find_by_text: JsonValue,
        /// Responses for `ReadyState`, consumed in order; the last one
        /// repeats once the queue drains.
        pub ready_states: Mutex<Vec<String>>,
        pub fail_screenshot: bool,
        pub fail_initialize: bool,
    }

    impl Default for MockDriver {
        fn default() -> Self {
            Self {
                engine: EngineKind::Chromium,
                calls: Arc::new(Mutex::new(Vec::new())),
                bounding_box: serde_json::json!({
                    "x": 10.0, "y": 20.0, "width": 100.0, "height": 40.0
                }),
                texts: serde_json::json!(["hello"]),
                find_by_text: serde_json::json!({
                    "selector": "button#go", "x": 5.0, "y": 6.0, "width": 50.0, "height": 20.0
                }),
                ready_states: Mutex::new(vec!["complete".to_string()]),
                fail_screenshot: false,
                fail_initialize: false,
            }
        }
    }

    impl MockDriver {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        /// Handle onto the call log that survives boxing the driver.
        pub fn call_log(&self) -> Arc<Mutex<Vec<String>>> {
            Arc::clone(&self.calls)
        }
    }

    #[async_trait]
    impl BrowserDriver for MockDriver {
        fn engine(&self) -> EngineKind {
            self.engine
        }

        async fn initialize(&mut self, _options: &LaunchOptions) -> Result<(), DriverError> {
            self.record("initialize");
            if self.fail_initialize {
                return Err(DriverError::message("launch refused"));
            }
            Ok(())
        }

        async fn goto(&self, url: &str) -> Result<(), DriverError> {
            self.record(format!("goto:{url}"));
            Ok(())
        }

        async fn close(&mut self) -> Result<(), DriverError> {
            self.record("close");
            Ok(())
        }

        async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
            self.record("screenshot");
            if self.fail_screenshot {
                return Err(DriverError::message("capture failed"));
            }
            Ok(vec![0xff, 0xd8, 0xff])
        }

        async fn query(&self, query: &PageQuery) -> Result<JsonValue, DriverError> {
            self.record(format!("query:{query:?}"));
            Ok(match query {
                PageQuery::ElementExists { .. } => {
                    serde_json::json!(!self.bounding_box.is_null())
                }
                PageQuery::BoundingBox { .. } => self.bounding_box.clone(),
                PageQuery::ExtractTexts { .. } => self.texts.clone(),
                PageQuery::FindByText { .. } => self.find_by_text.clone(),
                PageQuery::ScrollIntoView { .. } => {
                    serde_json::json!(!self.bounding_box.is_null())
                }
                PageQuery::ReadyState => {
                    let mut states = self.ready_states.lock().unwrap();
                    let state = if states.len() > 1 {
                        states.remove(0)
                    } else {
                        states[0].clone()
                    };
                    serde_json::json!(state)
                }
                PageQuery::Title => serde_json::json!("Mock Page"),
                PageQuery::Url => serde_json::json!("https://mock.test/"),
                _ => serde_json::json!(true),
            })
        }

        async fn dimensions(&self) -> Result<Viewport, DriverError> {
            self.record("dimensions");
            Ok(Viewport::default())
        }

        async fn click_at(&self, x: f64, y: f64) -> Result<(), DriverError> {
            self.record(format!("click_at:{x},{y}"));
            Ok(())
        }

        async fn type_text(&self, text: &str) -> Result<(), DriverError> {
            self.record(format!("type_text:{text}"));
            Ok(())
        }

        async fn press_key(&self, key: &str) -> Result<(), DriverError> {
            self.record(format!("press_key:{key}"));
            Ok(())
        }

        async fn scroll(
            &self,
            direction: ScrollDirection,
            distance: i64,
        ) -> Result<(), DriverError> {
            self.record(format!("scroll:{direction}:{distance}"));
            Ok(())
        }

        async fn set_user_agent(&self, user_agent: &str) -> Result<(), DriverError> {
            self.record(format!("set_user_agent:{user_agent}"));
            Ok(())
        }
    }

    pub(crate) fn test_config(output_dir: &str) -> PilotConfig {
        let mut config = PilotConfig::default();
        config.output_dir = output_dir.to_string();
        config.verbose = crate::config::Verbosity::Minimal;
        config
    }

    fn agent_with(driver: MockDriver) -> ActionAgent {
        ActionAgent::with_driver(Box::new(driver), test_config("./target/test-artifacts"))
    }

    #[tokio::test]
    async fn actions_fail_before_initialization() {
        let agent = agent_with(MockDriver::default());

        let result = agent.navigate("https://example.com").await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some(ERR_NOT_INITIALIZED));
        assert!(result.data.is_none());

        let result = agent.click("button").await;
        assert_eq!(result.error.as_deref(), Some(ERR_NOT_INITIALIZED));

        let result = agent.screenshot().await;
        assert_eq!(result.error.as_deref(), Some(ERR_NOT_INITIALIZED));
    }

    #[tokio::test]
    async fn initialize_is_idempotent_until_closed() {
        let mut agent = agent_with(MockDriver::default());

        assert!(agent.initialize().await.success);
        assert_eq!(agent.state(), AgentState::Initialized);
        assert!(agent.initialize().await.success);

        assert!(agent.close().await.success);
        assert_eq!(agent.state(), AgentState::Closed);
        assert!(agent.close().await.success);

        let result = agent.initialize().await;
        assert!(!result.success);
        assert_eq!(agent.state(), AgentState::Closed);
    }

    #[tokio::test]
    async fn close_before_initialization_is_a_no_op() {
        let mut agent = agent_with(MockDriver::default());

        assert!(agent.close().await.success);
        assert_eq!(agent.state(), AgentState::Uninitialized);

        // The session can still be brought up afterwards.
        assert!(agent.initialize().await.success);
        assert_eq!(agent.state(), AgentState::Initialized);
    }

    #[tokio::test]
    async fn failed_launch_keeps_agent_uninitialized() {
        let driver = MockDriver {
            fail_initialize: true,
            ..Default::default()
        };
        let mut agent = agent_with(driver);

        let result = agent.initialize().await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("launch refused"));
        assert_eq!(agent.state(), AgentState::Uninitialized);
    }

    #[tokio::test]
    async fn click_reports_missing_elements() {
        let driver = MockDriver {
            bounding_box: JsonValue::Null,
            ..Default::default()
        };
        let mut agent = agent_with(driver);
        agent.initialize().await;

        let result = agent.click("#missing").await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("#missing"));
    }

    #[tokio::test]
    async fn click_targets_the_element_center() {
        let mut agent = agent_with(MockDriver::default());
        agent.initialize().await;

        let result = agent.click("button.primary").await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn click_confirms_existence_before_scrolling() {
        let driver = MockDriver::default();
        let calls = driver.call_log();
        let mut agent = agent_with(driver);
        agent.initialize().await;

        assert!(agent.click("button.primary").await.success);

        let calls = calls.lock().unwrap();
        let exists = calls
            .iter()
            .position(|call| call.contains("ElementExists"))
            .expect("existence check ran");
        let scroll = calls
            .iter()
            .position(|call| call.contains("ScrollIntoView"))
            .expect("scroll ran");
        let click = calls
            .iter()
            .position(|call| call.starts_with("click_at"))
            .expect("click ran");
        assert!(exists < scroll);
        assert!(scroll < click);
    }

    #[tokio::test]
    async fn configured_logger_receives_agent_records() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let capture = Arc::clone(&lines);
        let mut config = test_config("./target/test-artifacts");
        config.verbose = crate::config::Verbosity::Detailed;
        config.logger = Some(Arc::new(move |line: &str| {
            capture.lock().unwrap().push(line.to_string());
        }));

        let mut agent = ActionAgent::with_driver(Box::new(MockDriver::default()), config);
        agent.initialize().await;
        agent.navigate("https://example.com").await;

        let lines = lines.lock().unwrap();
        assert!(lines
            .iter()
            .any(|line| line.contains("navigating to https://example.com")));
        assert!(lines.iter().any(|line| line.contains("[action][info]")));
    }

    #[tokio::test]
    async fn screenshot_writes_a_sequenced_jpg() {
        let dir = tempfile::tempdir().expect("tempdir");
        let driver = MockDriver::default();
        let mut agent = ActionAgent::with_driver(
            Box::new(driver),
            test_config(dir.path().to_str().unwrap()),
        );
        agent.initialize().await;

        let first = agent.screenshot().await;
        assert!(first.success);
        let path = first.data.unwrap()["path"].as_str().unwrap().to_string();
        assert!(path.contains("screenshots"));
        assert!(path.ends_with(".jpg"));
        assert!(std::path::Path::new(&path).exists());

        let second = agent.screenshot().await;
        let second_path = second.data.unwrap()["path"].as_str().unwrap().to_string();
        assert_ne!(path, second_path);
    }

    #[tokio::test]
    async fn webdriver_screenshots_use_the_png_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let driver = MockDriver {
            engine: EngineKind::Webdriver,
            ..Default::default()
        };
        let mut agent = ActionAgent::with_driver(
            Box::new(driver),
            test_config(dir.path().to_str().unwrap()),
        );
        agent.initialize().await;

        let result = agent.screenshot().await;
        assert!(result.success);
        let path = result.data.unwrap()["path"].as_str().unwrap().to_string();
        assert!(path.ends_with(".png"));
    }

    #[tokio::test]
    async fn extract_structured_collapses_match_counts() {
        let driver = MockDriver {
            texts: serde_json::json!([]),
            ..Default::default()
        };
        let mut agent = agent_with(driver);
        agent.initialize().await;

        let mut fields = BTreeMap::new();
        fields.insert("headline".to_string(), "h1".to_string());
        let result = agent.extract_structured(&fields).await;
        assert!(result.success);
        assert_eq!(result.data.unwrap()["headline"], JsonValue::Null);
    }

    #[tokio::test]
    async fn wait_for_navigation_times_out_successfully() {
        let driver = MockDriver {
            ready_states: Mutex::new(vec!["loading".to_string()]),
            ..Default::default()
        };
        let mut agent = agent_with(driver);
        agent.initialize().await;

        let start = Instant::now();
        let result = agent.wait_for_navigation(Some(100)).await;
        let elapsed = start.elapsed();

        assert!(result.success);
        assert_eq!(result.data.unwrap()["complete"], serde_json::json!(false));
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn wait_for_navigation_returns_early_when_complete() {
        let driver = MockDriver {
            ready_states: Mutex::new(vec!["loading".to_string(), "complete".to_string()]),
            ..Default::default()
        };
        let mut agent = agent_with(driver);
        agent.initialize().await;

        let result = agent.wait_for_navigation(Some(5_000)).await;
        assert!(result.success);
        assert_eq!(result.data.unwrap()["complete"], serde_json::json!(true));
    }
}
