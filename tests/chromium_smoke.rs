//! Live smoke test against a real Chromium binary.
//!
//! Skips itself unless `WEBPILOT_CHROME_BIN` points at a Chrome/Chromium
//! executable. Exercises the full deterministic path: launch, navigate,
//! wait, extract, screenshot, close.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::json;

use webpilot::config::{EngineKind, PilotConfig, Verbosity};
use webpilot::pilot::WebPilot;

fn chrome_bin() -> Option<PathBuf> {
    match env::var("WEBPILOT_CHROME_BIN") {
        Ok(value) if !value.trim().is_empty() => {
            let path = PathBuf::from(value);
            if path.exists() {
                Some(path)
            } else {
                eprintln!(
                    "skipping chromium smoke test: no executable at {}",
                    path.display()
                );
                None
            }
        }
        _ => {
            eprintln!("skipping chromium smoke test: WEBPILOT_CHROME_BIN not set");
            None
        }
    }
}

fn smoke_config(chrome: &PathBuf, output_dir: &str) -> PilotConfig {
    let mut config = PilotConfig::default();
    config.engine = EngineKind::Chromium;
    config.headless = true;
    config.chrome_executable = Some(chrome.to_string_lossy().into_owned());
    config.output_dir = output_dir.to_string();
    config.verbose = Verbosity::Minimal;
    config.timeout_ms = 15_000;
    config
}

#[tokio::test]
#[ignore = "Requires a Chromium binary via WEBPILOT_CHROME_BIN"]
#[serial_test::serial]
async fn chromium_navigates_extracts_and_screenshots() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let Some(chrome) = chrome_bin() else {
        return Ok(());
    };
    let dir = tempfile::tempdir().context("failed to create output dir")?;
    let config = smoke_config(&chrome, dir.path().to_str().context("utf-8 path")?);

    let mut pilot = WebPilot::new(config);
    let initialized = pilot.initialize().await;
    assert!(
        initialized.success,
        "initialize failed: {:?}",
        initialized.error
    );

    let navigated = pilot.navigate_to("https://example.com").await;
    assert!(navigated.success, "navigate failed: {:?}", navigated.error);

    let extracted = pilot.agent().extract_text("h1").await;
    assert!(extracted.success, "extract failed: {:?}", extracted.error);
    let texts = extracted.data.context("expected extraction data")?["texts"].clone();
    assert!(
        texts.as_array().is_some_and(|t| !t.is_empty()),
        "expected at least one heading, got {texts}"
    );

    let shot = pilot.agent().screenshot().await;
    assert!(shot.success, "screenshot failed: {:?}", shot.error);
    let path = shot.data.context("expected screenshot data")?["path"]
        .as_str()
        .context("path")?
        .to_string();
    assert!(std::path::Path::new(&path).exists());

    let located = pilot.locate_element("More information link").await;
    assert!(located.success, "locate failed: {:?}", located.error);

    assert!(pilot.close().await.success);
    Ok(())
}

#[tokio::test]
#[ignore = "Requires a Chromium binary via WEBPILOT_CHROME_BIN"]
#[serial_test::serial]
async fn chromium_runs_the_fallback_plan() -> Result<()> {
    let Some(chrome) = chrome_bin() else {
        return Ok(());
    };
    let dir = tempfile::tempdir().context("failed to create output dir")?;
    let config = smoke_config(&chrome, dir.path().to_str().context("utf-8 path")?);

    let mut pilot = WebPilot::new(config);
    assert!(pilot.initialize().await.success);
    assert!(pilot.navigate_to("https://example.com").await.success);

    // No planner attached, so this is the fixed extraction plan.
    let plan = pilot.create_plan_for_page("summarize the page").await;
    let result = pilot.execute_plan(&plan).await;
    assert!(result.success, "plan failed: {:?}", result.error);

    let actions = result.data.context("expected plan data")?["actions"].clone();
    assert_eq!(actions.as_array().map(Vec::len), Some(1));
    assert_eq!(actions[0]["success"], json!(true));

    assert!(pilot.close().await.success);
    Ok(())
}
