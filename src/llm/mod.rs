//! Language model client layer.
//!
//! Houses the provider-agnostic chat interface, an OpenAI-backed
//! implementation powered by `async-openai`, and the prompt builders that
//! turn page snapshots into locator and planner requests.

pub mod client;
pub mod error;
pub mod openai;
pub mod prompts;
pub mod provider;

pub use client::{ChatCompletionOptions, PilotLlmClient};
pub use error::PilotLlmError;
pub use openai::OpenAiChatProvider;
pub use provider::ChatCompletionProvider;
