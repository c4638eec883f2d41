//! AI reasoning seams and the deterministic fallback.
//!
//! The pilot treats element location and plan creation as optional
//! capabilities behind the [`ElementLocator`] and [`ActionPlanner`]
//! traits. When no implementation is attached, or an implementation
//! fails, the deterministic keyword heuristic below takes over, so the
//! automation core keeps working without any model in the loop.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{ContextSnapshot, ElementMatch, Plan};

/// Confidence reported for heuristic (non-AI) matches.
pub const HEURISTIC_CONFIDENCE: f64 = 0.5;

/// Selector used when plan creation has no model to consult.
pub const FALLBACK_EXTRACT_SELECTOR: &str = "h1, h2, .content, article";

#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("model request failed: {0}")]
    Provider(String),
    #[error("model response could not be parsed: {0}")]
    Parse(String),
}

/// Maps a natural-language element description to a concrete on-page match.
#[async_trait]
pub trait ElementLocator: Send + Sync {
    /// `Ok(None)` means the model answered but found nothing; errors mean
    /// the model could not answer at all. Both trigger the heuristic
    /// fallback upstream.
    async fn locate(
        &self,
        description: &str,
        snapshot: &ContextSnapshot,
    ) -> Result<Option<ElementMatch>, ReasoningError>;
}

/// Produces a multi-step plan for a goal against the current page.
#[async_trait]
pub trait ActionPlanner: Send + Sync {
    async fn plan(&self, goal: &str, snapshot: &ContextSnapshot)
        -> Result<Plan, ReasoningError>;
}

/// Deterministic target derived from an element description.
#[derive(Debug, Clone, PartialEq)]
pub enum HeuristicTarget {
    /// A CSS selector covering the described control family.
    Selector(&'static str),
    /// No keyword matched; fall back to visible-text containment.
    Text(String),
}

/// Keyword heuristic used when AI location is disabled or unavailable.
///
/// Matching is case-insensitive and substring-based, checked in order:
/// button-like words first, then input-like words, then links.
pub fn heuristic_target(description: &str) -> HeuristicTarget {
    let lowered = description.to_lowercase();
    if lowered.contains("button") {
        HeuristicTarget::Selector(
            "button, input[type='submit'], input[type='button'], [role='button']",
        )
    } else if lowered.contains("input") || lowered.contains("text") || lowered.contains("field") {
        HeuristicTarget::Selector("input, textarea, select")
    } else if lowered.contains("link") {
        HeuristicTarget::Selector("a")
    } else {
        HeuristicTarget::Text(description.to_string())
    }
}
