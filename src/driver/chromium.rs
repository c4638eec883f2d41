//! DevTools-protocol driver backed by `chromiumoxide`.
//!
//! Launches a local Chromium, pumps its event handler on a background
//! task, and keeps a single page that all driver operations target.
//! Input lands through raw CDP `Input.dispatch*` commands so pages see
//! trusted events rather than synthetic DOM ones.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, InsertTextParams, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures_util::StreamExt;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::EngineKind;
use crate::driver::{
    settle_after_interaction, BrowserDriver, DriverError, LaunchOptions, PageQuery,
    CLICK_SETTLE_TIMEOUT,
};
use crate::types::{ScrollDirection, Viewport};

/// JPEG quality for page captures.
const SCREENSHOT_QUALITY: i64 = 80;

pub struct ChromiumDriver {
    state: Mutex<Option<ChromiumState>>,
}

struct ChromiumState {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
}

impl ChromiumDriver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    async fn page(&self) -> Result<Page, DriverError> {
        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(DriverError::NotInitialized)?;
        Ok(state.page.clone())
    }
}

impl Default for ChromiumDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    fn engine(&self) -> EngineKind {
        EngineKind::Chromium
    }

    async fn initialize(&mut self, options: &LaunchOptions) -> Result<(), DriverError> {
        if self.state.lock().await.is_some() {
            return Ok(());
        }

        let config = build_config(options)?;
        let (browser, handler) = Browser::launch(config).await.map_err(map_cdp_error)?;
        let handler = spawn_handler(handler);

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(err) => {
                handler.abort();
                return Err(map_cdp_error(err));
            }
        };

        if let Some(user_agent) = &options.user_agent {
            if let Err(err) = page.set_user_agent(user_agent).await {
                handler.abort();
                return Err(map_cdp_error(err));
            }
        }

        let mut guard = self.state.lock().await;
        *guard = Some(ChromiumState {
            browser,
            handler,
            page,
        });
        Ok(())
    }

    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        let page = self.page().await?;
        page.goto(url).await.map_err(map_cdp_error)?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        let state = {
            let mut guard = self.state.lock().await;
            guard.take()
        };

        if let Some(mut state) = state {
            // Browser teardown is best effort; the handler task dies with it.
            let _ = state.browser.close().await;
            let _ = state.browser.wait().await;
            state.handler.abort();
        }
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        let page = self.page().await?;
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Jpeg)
            .quality(SCREENSHOT_QUALITY)
            .build();
        page.screenshot(params).await.map_err(map_cdp_error)
    }

    async fn query(&self, query: &PageQuery) -> Result<JsonValue, DriverError> {
        let page = self.page().await?;
        let result = page
            .evaluate(query.script())
            .await
            .map_err(map_cdp_error)?;
        Ok(result.value().cloned().unwrap_or(JsonValue::Null))
    }

    async fn dimensions(&self) -> Result<Viewport, DriverError> {
        let page = self.page().await?;
        let result = page
            .evaluate("(() => ({ width: window.innerWidth, height: window.innerHeight }))()")
            .await
            .map_err(map_cdp_error)?;
        let value = result.value().cloned().unwrap_or(JsonValue::Null);
        Ok(serde_json::from_value(value)?)
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<(), DriverError> {
        let page = self.page().await?;

        let pressed = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MousePressed)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(DriverError::Message)?;
        page.execute(pressed).await.map_err(map_cdp_error)?;

        let released = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseReleased)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(DriverError::Message)?;
        page.execute(released).await.map_err(map_cdp_error)?;

        settle_after_interaction(self, CLICK_SETTLE_TIMEOUT).await;
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), DriverError> {
        let page = self.page().await?;
        let params = InsertTextParams::builder()
            .text(text)
            .build()
            .map_err(DriverError::Message)?;
        page.execute(params).await.map_err(map_cdp_error)?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), DriverError> {
        let page = self.page().await?;

        let mut down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .key(key);
        // Printable keys carry text so the page receives the character.
        if key.chars().count() == 1 {
            down = down.text(key);
        }
        let down = down.build().map_err(DriverError::Message)?;
        page.execute(down).await.map_err(map_cdp_error)?;

        let up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(key)
            .build()
            .map_err(DriverError::Message)?;
        page.execute(up).await.map_err(map_cdp_error)?;
        Ok(())
    }

    async fn scroll(&self, direction: ScrollDirection, distance: i64) -> Result<(), DriverError> {
        let (dx, dy) = direction.deltas(distance);
        self.query(&PageQuery::ScrollBy { dx, dy }).await?;
        Ok(())
    }

    async fn set_user_agent(&self, user_agent: &str) -> Result<(), DriverError> {
        let page = self.page().await?;
        page.set_user_agent(user_agent)
            .await
            .map_err(map_cdp_error)?;
        Ok(())
    }
}

fn build_config(options: &LaunchOptions) -> Result<BrowserConfig, DriverError> {
    let viewport = chromiumoxide::handler::viewport::Viewport {
        width: options.viewport.width,
        height: options.viewport.height,
        device_scale_factor: None,
        emulating_mobile: false,
        is_landscape: options.viewport.width >= options.viewport.height,
        has_touch: false,
    };

    let mut builder = BrowserConfig::builder();

    if let Some(path) = &options.chrome_executable {
        builder = builder.chrome_executable(path);
    }

    let builder = builder.viewport(viewport);

    let builder = if options.headless {
        builder
    } else {
        builder.with_head()
    };

    builder.build().map_err(DriverError::Message)
}

fn map_cdp_error<E: std::fmt::Display>(err: E) -> DriverError {
    DriverError::Message(err.to_string())
}

fn spawn_handler(mut handler: chromiumoxide::handler::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(result) = handler.next().await {
            if let Err(err) = result {
                eprintln!("chromium handler error: {err}");
            }
        }
    })
}
