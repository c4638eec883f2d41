use thiserror::Error;

use async_openai::error::OpenAIError;

/// Errors surfaced by the pilot LLM client layer.
#[derive(Debug, Error)]
pub enum PilotLlmError {
    #[error("missing OpenAI API key; set MODEL_API_KEY or OPENAI_API_KEY")]
    MissingApiKey,
    #[error("missing default model configuration")]
    MissingDefaultModel,
    #[error("invalid chat completion request: {0}")]
    InvalidRequest(String),
    #[error("model reply was not usable: {0}")]
    MalformedResponse(String),
    #[error(transparent)]
    OpenAi(#[from] OpenAIError),
}
