//! WebDriver-protocol driver backed by `thirtyfour`.
//!
//! Talks to any WebDriver-compatible server (chromedriver, geckodriver,
//! a Selenium grid). Named queries run through `execute` by prefixing the
//! rendered expression with `return`; input is injected via the shared
//! focused-element query templates since the remote protocol offers no
//! trusted raw-input channel comparable to CDP.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thirtyfour::prelude::*;
use tokio::sync::Mutex;

use crate::config::EngineKind;
use crate::driver::{
    settle_after_interaction, BrowserDriver, DriverError, LaunchOptions, PageQuery,
    CLICK_SETTLE_TIMEOUT,
};
use crate::types::{ScrollDirection, Viewport};

pub struct WebDriverDriver {
    state: Mutex<Option<WebDriver>>,
}

impl WebDriverDriver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    async fn session(&self) -> Result<WebDriver, DriverError> {
        let guard = self.state.lock().await;
        guard.as_ref().cloned().ok_or(DriverError::NotInitialized)
    }
}

impl Default for WebDriverDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserDriver for WebDriverDriver {
    fn engine(&self) -> EngineKind {
        EngineKind::Webdriver
    }

    async fn initialize(&mut self, options: &LaunchOptions) -> Result<(), DriverError> {
        if self.state.lock().await.is_some() {
            return Ok(());
        }

        let caps = build_capabilities(options)?;
        let driver = WebDriver::new(&options.webdriver_url, caps)
            .await
            .map_err(map_webdriver_error)?;

        let timeout = Duration::from_millis(options.timeout_ms);
        driver
            .set_page_load_timeout(timeout)
            .await
            .map_err(map_webdriver_error)?;
        driver
            .set_script_timeout(timeout)
            .await
            .map_err(map_webdriver_error)?;
        driver
            .set_window_rect(0, 0, options.viewport.width, options.viewport.height)
            .await
            .map_err(map_webdriver_error)?;

        let mut guard = self.state.lock().await;
        *guard = Some(driver);
        Ok(())
    }

    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        let driver = self.session().await?;
        driver.goto(url).await.map_err(map_webdriver_error)?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        let driver = {
            let mut guard = self.state.lock().await;
            guard.take()
        };

        if let Some(driver) = driver {
            driver.quit().await.map_err(map_webdriver_error)?;
        }
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        let driver = self.session().await?;
        driver.screenshot_as_png().await.map_err(map_webdriver_error)
    }

    async fn query(&self, query: &PageQuery) -> Result<JsonValue, DriverError> {
        let driver = self.session().await?;
        let script = format!("return {};", query.script());
        let result = driver
            .execute(&script, vec![])
            .await
            .map_err(map_webdriver_error)?;
        Ok(result.json().clone())
    }

    async fn dimensions(&self) -> Result<Viewport, DriverError> {
        let driver = self.session().await?;
        let result = driver
            .execute(
                "return { width: window.innerWidth, height: window.innerHeight };",
                vec![],
            )
            .await
            .map_err(map_webdriver_error)?;
        Ok(serde_json::from_value(result.json().clone())?)
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<(), DriverError> {
        let driver = self.session().await?;
        driver
            .action_chain()
            .move_to(x as i64, y as i64)
            .click()
            .perform()
            .await
            .map_err(map_webdriver_error)?;

        settle_after_interaction(self, CLICK_SETTLE_TIMEOUT).await;
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), DriverError> {
        // No-op when nothing focused, matching the raw-input engine.
        self.query(&PageQuery::TypeActive {
            text: text.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), DriverError> {
        self.query(&PageQuery::PressActive {
            key: key.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn scroll(&self, direction: ScrollDirection, distance: i64) -> Result<(), DriverError> {
        let (dx, dy) = direction.deltas(distance);
        self.query(&PageQuery::ScrollBy { dx, dy }).await?;
        Ok(())
    }

    async fn set_user_agent(&self, _user_agent: &str) -> Result<(), DriverError> {
        // The remote protocol fixes the user agent at session creation;
        // it is applied from LaunchOptions during initialize.
        Err(DriverError::message(
            "webdriver engine cannot change the user agent after session start",
        ))
    }
}

fn build_capabilities(options: &LaunchOptions) -> Result<Capabilities, DriverError> {
    let mut caps = DesiredCapabilities::chrome();

    if options.headless {
        caps.add_arg("--headless=new").map_err(map_webdriver_error)?;
    }
    caps.add_arg("--no-sandbox").map_err(map_webdriver_error)?;
    caps.add_arg("--disable-dev-shm-usage")
        .map_err(map_webdriver_error)?;

    if let Some(user_agent) = &options.user_agent {
        caps.add_arg(&format!("--user-agent={user_agent}"))
            .map_err(map_webdriver_error)?;
    }

    Ok(caps.into())
}

fn map_webdriver_error<E: std::fmt::Display>(err: E) -> DriverError {
    DriverError::Message(err.to_string())
}
