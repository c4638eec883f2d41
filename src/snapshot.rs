//! Page context capture.
//!
//! A snapshot bundles everything an AI planner needs to reason about the
//! current page: URL, title, viewport, a screenshot on disk, and a pruned
//! DOM tree. The screenshot is the one mandatory piece; a snapshot
//! without it is useless to a vision model, so its failure aborts the
//! capture while a failed DOM walk merely leaves the tree empty.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use thiserror::Error;

use crate::agent::ActionAgent;
use crate::driver::{DriverError, PageQuery};
use crate::types::ContextSnapshot;

/// Levels of the DOM kept in a snapshot, counted from `<body>`.
pub const DOM_TREE_DEPTH: u32 = 3;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("screenshot capture failed: {0}")]
    Screenshot(#[source] DriverError),
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Capture the current page state through an initialized agent.
pub async fn capture_context(agent: &ActionAgent) -> Result<ContextSnapshot, SnapshotError> {
    if !agent.is_ready() {
        return Err(SnapshotError::Driver(DriverError::NotInitialized));
    }

    let (screenshot_path, screenshot_bytes) = agent
        .write_screenshot()
        .await
        .map_err(SnapshotError::Screenshot)?;

    let url = agent.page_url().await?;
    let title = agent.page_title().await?;
    let viewport = agent.viewport().await?;

    let dom_tree = match agent
        .run_query(&PageQuery::DomTree {
            max_depth: DOM_TREE_DEPTH,
        })
        .await
    {
        Ok(value) => serde_json::from_value(value).ok(),
        Err(err) => {
            agent.logger().debug(
                format!("dom tree capture failed, snapshot continues without it: {err}"),
                Some("snapshot"),
                None,
            );
            None
        }
    };

    Ok(ContextSnapshot {
        url,
        title,
        screenshot: BASE64.encode(&screenshot_bytes),
        screenshot_path,
        viewport,
        dom_tree,
        captured_at: Utc::now(),
    })
}
