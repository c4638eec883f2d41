//! AI-assisted browser automation over pluggable drivers.
//!
//! The crate is layered bottom-up:
//!
//! - [`driver`] — the engine abstraction: a [`driver::BrowserDriver`]
//!   trait, a closed set of named page queries, and adapters for a CDP
//!   engine (`chromiumoxide`) and a WebDriver engine (`thirtyfour`).
//! - [`agent`] — the action agent: a session state machine in front of a
//!   driver whose every operation answers with an
//!   [`types::ActionResult`] envelope.
//! - [`snapshot`] — one-pass capture of page context (screenshot, URL,
//!   title, viewport, shallow DOM tree) for the reasoning layer.
//! - [`reasoning`] / [`llm`] — optional AI capabilities: an
//!   [`reasoning::ElementLocator`] and an [`reasoning::ActionPlanner`],
//!   with an OpenAI-backed implementation and a deterministic keyword
//!   heuristic as the ever-present fallback.
//! - [`pilot`] — [`pilot::WebPilot`], the AI-enhanced agent composing an
//!   action agent with the optional capabilities: natural-language
//!   element location, plan creation, and plan execution.
//!
//! ```no_run
//! use webpilot::config::PilotConfig;
//! use webpilot::pilot::WebPilot;
//!
//! # async fn run() {
//! let mut pilot = WebPilot::new(PilotConfig::default());
//! pilot.initialize().await;
//! pilot.navigate_to("https://example.com").await;
//! let found = pilot.locate_element("the search button").await;
//! println!("{found:?}");
//! pilot.close().await;
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod driver;
pub mod llm;
pub mod logging;
pub mod pilot;
pub mod reasoning;
pub mod snapshot;
pub mod types;

pub use agent::{ActionAgent, AgentState, ERR_NOT_INITIALIZED};
pub use config::{EngineKind, PilotConfig, PilotConfigError, PilotConfigOverrides};
pub use driver::{create_driver, create_driver_named, BrowserDriver, DriverError, LaunchOptions};
pub use pilot::WebPilot;
pub use reasoning::{ActionPlanner, ElementLocator, ReasoningError};
pub use snapshot::{capture_context, SnapshotError};
pub use types::{
    ActionResult, ContextSnapshot, ElementMatch, Plan, PlanAction, PlanStep, Position, Rect,
};
