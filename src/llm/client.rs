use std::fmt;
use std::time::Instant;

use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessageArgs,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, CreateChatCompletionResponse, ResponseFormat,
};
use async_trait::async_trait;

use crate::config::{LoggerCallback, PilotConfig};
use crate::reasoning::{ActionPlanner, ElementLocator, ReasoningError};
use crate::types::{ContextSnapshot, ElementMatch, Plan};

use super::error::PilotLlmError;
use super::openai::OpenAiChatProvider;
use super::prompts::{
    build_locator_system_prompt, build_locator_user_message, build_planner_system_prompt,
    build_planner_user_message,
};
use super::provider::ChatCompletionProvider;

/// Optional parameters that influence chat completion requests.
#[derive(Debug, Default, Clone)]
pub struct ChatCompletionOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_completion_tokens: Option<u32>,
    pub seed: Option<i64>,
    pub response_format: Option<ResponseFormat>,
}

/// Provider-neutral LLM client that doubles as the pilot's AI locator and
/// planner.
pub struct PilotLlmClient<P: ChatCompletionProvider> {
    provider: P,
    default_model: String,
    logger: Option<LoggerCallback>,
}

impl<P> fmt::Debug for PilotLlmClient<P>
where
    P: ChatCompletionProvider + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PilotLlmClient")
            .field("provider", &self.provider)
            .field("default_model", &self.default_model)
            .field("logger_attached", &self.logger.is_some())
            .finish()
    }
}

impl<P: ChatCompletionProvider> PilotLlmClient<P> {
    /// Create a new client with the supplied provider and default model.
    pub fn new(default_model: impl Into<String>, provider: P) -> Self {
        Self {
            provider,
            default_model: default_model.into(),
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Option<LoggerCallback>) -> Self {
        self.logger = logger;
        self
    }

    pub fn set_logger(&mut self, logger: Option<LoggerCallback>) {
        self.logger = logger;
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Access the underlying provider (primarily for testing).
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Construct an `async-openai` chat completion request from messages
    /// and options.
    pub fn build_request(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        options: ChatCompletionOptions,
    ) -> Result<CreateChatCompletionRequest, PilotLlmError> {
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        if model.trim().is_empty() {
            return Err(PilotLlmError::MissingDefaultModel);
        }

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(model);
        builder.messages(messages);
        if let Some(temperature) = options.temperature {
            builder.temperature(temperature);
        }
        if let Some(max_completion_tokens) = options.max_completion_tokens {
            builder.max_completion_tokens(max_completion_tokens);
        }
        if let Some(seed) = options.seed {
            builder.seed(seed);
        }
        if let Some(response_format) = options.response_format {
            builder.response_format(response_format);
        }

        builder
            .build()
            .map_err(|err| PilotLlmError::InvalidRequest(err.to_string()))
    }

    pub async fn create_chat_completion(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        options: ChatCompletionOptions,
        function_name: Option<&str>,
    ) -> Result<CreateChatCompletionResponse, PilotLlmError> {
        let request = self.build_request(messages, options)?;
        let model = request.model.clone();
        self.log_debug(&format!(
            "sending chat completion request model={} function={}",
            model,
            function_name.unwrap_or("n/a")
        ));

        let start = Instant::now();
        match self.provider.create_chat_completion(request).await {
            Ok(response) => {
                self.log_debug(&format!(
                    "chat completion succeeded: model={} duration={}ms",
                    model,
                    start.elapsed().as_millis()
                ));
                Ok(response)
            }
            Err(err) => {
                self.log_error(&format!("chat completion failed for model={model}: {err}"));
                Err(PilotLlmError::OpenAi(err))
            }
        }
    }

    async fn ask_for_json(
        &self,
        system_prompt: String,
        user_message: String,
        function_name: &str,
    ) -> Result<String, PilotLlmError> {
        let messages = vec![system_message(system_prompt)?, user_message_of(user_message)?];
        let options = ChatCompletionOptions {
            temperature: Some(0.0),
            ..Default::default()
        };
        let response = self
            .create_chat_completion(messages, options, Some(function_name))
            .await?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| PilotLlmError::MalformedResponse("empty model reply".to_string()))
    }

    fn log_debug(&self, message: &str) {
        if let Some(logger) = &self.logger {
            logger(&format!("[llm][debug] {message}"));
        }
    }

    fn log_error(&self, message: &str) {
        if let Some(logger) = &self.logger {
            logger(&format!("[llm][error] {message}"));
        }
    }
}

impl PilotLlmClient<OpenAiChatProvider> {
    /// Convenience constructor that wires the OpenAI provider from config.
    pub fn from_config(config: &PilotConfig) -> Result<Self, PilotLlmError> {
        let provider = OpenAiChatProvider::from_config(config)?;
        let mut client = PilotLlmClient::new(config.model_name.as_str(), provider);
        client.set_logger(config.logger.clone());
        Ok(client)
    }
}

#[async_trait]
impl<P: ChatCompletionProvider> ElementLocator for PilotLlmClient<P> {
    async fn locate(
        &self,
        description: &str,
        snapshot: &ContextSnapshot,
    ) -> Result<Option<ElementMatch>, ReasoningError> {
        let content = self
            .ask_for_json(
                build_locator_system_prompt(),
                build_locator_user_message(description, snapshot),
                "locate",
            )
            .await
            .map_err(|err| ReasoningError::Provider(err.to_string()))?;

        serde_json::from_str::<Option<ElementMatch>>(extract_json(&content))
            .map(|found| found.map(ElementMatch::with_derived_position))
            .map_err(|err| ReasoningError::Parse(err.to_string()))
    }
}

#[async_trait]
impl<P: ChatCompletionProvider> ActionPlanner for PilotLlmClient<P> {
    async fn plan(
        &self,
        goal: &str,
        snapshot: &ContextSnapshot,
    ) -> Result<Plan, ReasoningError> {
        let content = self
            .ask_for_json(
                build_planner_system_prompt(),
                build_planner_user_message(goal, snapshot),
                "plan",
            )
            .await
            .map_err(|err| ReasoningError::Provider(err.to_string()))?;

        serde_json::from_str::<Plan>(extract_json(&content))
            .map_err(|err| ReasoningError::Parse(err.to_string()))
    }
}

fn system_message(text: String) -> Result<ChatCompletionRequestMessage, PilotLlmError> {
    Ok(ChatCompletionRequestMessage::System(
        ChatCompletionRequestSystemMessageArgs::default()
            .content(ChatCompletionRequestSystemMessageContent::Text(text))
            .build()
            .map_err(|err| PilotLlmError::InvalidRequest(err.to_string()))?,
    ))
}

fn user_message_of(text: String) -> Result<ChatCompletionRequestMessage, PilotLlmError> {
    Ok(ChatCompletionRequestMessage::User(
        ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Text(text))
            .build()
            .map_err(|err| PilotLlmError::InvalidRequest(err.to_string()))?,
    ))
}

/// Models often wrap JSON in markdown fences; strip them before parsing.
fn extract_json(content: &str) -> &str {
    let trimmed = content.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_openai::error::{ApiError, OpenAIError};
    use chrono::Utc;
    use serde_json::json;
    use tokio::sync::Mutex;

    use crate::types::{PlanAction, Viewport};

    #[derive(Debug, Default)]
    struct RecordingProvider {
        requests: Mutex<Vec<CreateChatCompletionRequest>>,
        response: Mutex<Option<Result<CreateChatCompletionResponse, OpenAIError>>>,
    }

    impl RecordingProvider {
        fn with_content(content: &str) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                response: Mutex::new(Some(Ok(response_with_content(content)))),
            }
        }

        fn with_error(error: OpenAIError) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                response: Mutex::new(Some(Err(error))),
            }
        }
    }

    #[async_trait]
    impl ChatCompletionProvider for RecordingProvider {
        async fn create_chat_completion(
            &self,
            request: CreateChatCompletionRequest,
        ) -> Result<CreateChatCompletionResponse, OpenAIError> {
            self.requests.lock().await.push(request);
            self.response.lock().await.take().unwrap_or_else(|| {
                Err(OpenAIError::ApiError(ApiError {
                    message: "no response configured".into(),
                    r#type: None,
                    param: None,
                    code: None,
                }))
            })
        }
    }

    fn response_with_content(content: &str) -> CreateChatCompletionResponse {
        serde_json::from_value(json!({
            "id": "cmpl-test",
            "object": "chat.completion",
            "created": 0,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "finish_reason": "stop",
                "message": {
                    "role": "assistant",
                    "content": content
                },
                "logprobs": null
            }],
            "usage": {
                "prompt_tokens": 10,
                "completion_tokens": 5,
                "total_tokens": 15
            },
            "system_fingerprint": null
        }))
        .unwrap()
    }

    fn sample_snapshot() -> ContextSnapshot {
        ContextSnapshot {
            url: "https://example.com/".to_string(),
            title: "Example".to_string(),
            screenshot: String::new(),
            screenshot_path: "/tmp/shot.jpg".to_string(),
            viewport: Viewport::default(),
            dom_tree: None,
            captured_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn build_request_uses_default_model() {
        let provider = RecordingProvider::with_content("{}");
        let client = PilotLlmClient::new("gpt-4o", provider);

        let request = client
            .build_request(
                vec![system_message("hi".to_string()).unwrap()],
                ChatCompletionOptions::default(),
            )
            .expect("build request");

        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.messages.len(), 1);
    }

    #[tokio::test]
    async fn locate_parses_an_element_match() {
        let provider = RecordingProvider::with_content(
            r##"{"selector":"#login","rect":{"x":10.0,"y":20.0,"width":80.0,"height":30.0},"confidence":0.92}"##,
        );
        let client = PilotLlmClient::new("gpt-4o", provider);

        let found = client
            .locate("the login button", &sample_snapshot())
            .await
            .expect("locate succeeds")
            .expect("element found");

        assert_eq!(found.selector, "#login");
        assert_eq!(found.confidence, 0.92);
        // The click point derives from the rect center.
        let position = found.position.expect("derived position");
        assert_eq!(position.x, 50.0);
        assert_eq!(position.y, 35.0);
    }

    #[tokio::test]
    async fn locate_accepts_matches_without_geometry() {
        let provider =
            RecordingProvider::with_content(r##"{"selector":"#login","confidence":0.7}"##);
        let client = PilotLlmClient::new("gpt-4o", provider);

        let found = client
            .locate("the login button", &sample_snapshot())
            .await
            .expect("locate succeeds")
            .expect("element found");

        assert_eq!(found.selector, "#login");
        assert!(found.rect.is_none());
        assert!(found.position.is_none());
    }

    #[tokio::test]
    async fn locate_accepts_null_for_no_match() {
        let provider = RecordingProvider::with_content("null");
        let client = PilotLlmClient::new("gpt-4o", provider);

        let found = client
            .locate("a unicorn", &sample_snapshot())
            .await
            .expect("locate succeeds");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn plan_parses_fenced_json() {
        let provider = RecordingProvider::with_content(
            "```json\n{\"actions\":[{\"type\":\"click\",\"params\":{\"element\":\"login\"}}]}\n```",
        );
        let client = PilotLlmClient::new("gpt-4o", provider);

        let plan = client
            .plan("log in", &sample_snapshot())
            .await
            .expect("plan succeeds");

        assert_eq!(plan.actions.len(), 1);
        assert_eq!(
            plan.actions[0].action,
            PlanAction::Click {
                element: "login".to_string()
            }
        );
    }

    #[tokio::test]
    async fn provider_errors_become_reasoning_errors() {
        let provider = RecordingProvider::with_error(OpenAIError::ApiError(ApiError {
            message: "quota exceeded".into(),
            r#type: None,
            param: None,
            code: None,
        }));
        let client = PilotLlmClient::new("gpt-4o", provider);

        let err = client
            .locate("anything", &sample_snapshot())
            .await
            .expect_err("should propagate");
        assert!(matches!(err, ReasoningError::Provider(_)));
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn malformed_replies_become_parse_errors() {
        let provider = RecordingProvider::with_content("sure, here is the element you asked for");
        let client = PilotLlmClient::new("gpt-4o", provider);

        let err = client
            .locate("anything", &sample_snapshot())
            .await
            .expect_err("should fail to parse");
        assert!(matches!(err, ReasoningError::Parse(_)));
    }
}
