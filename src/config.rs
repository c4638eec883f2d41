//! Strongly-typed configuration for the pilot runtime.
//!
//! Configuration values can be constructed from defaults, loaded from
//! environment variables (with optional `.env` support), or merged with
//! explicit overrides for ergonomic programmatic updates.

use std::env;
use std::fmt;
use std::num::{ParseFloatError, ParseIntError};
use std::sync::Arc;

use dotenvy::dotenv;
use serde::de::{Deserialize, Deserializer, Error as DeError};
use serde::ser::{Serialize, Serializer};
use serde::{Deserialize as DeriveDeserialize, Serialize as DeriveSerialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;

use crate::types::Viewport;

pub type JsonObject = JsonMap<String, JsonValue>;

/// Default WebDriver server endpoint for the remote-protocol engine.
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444";

/// Default directory for screenshots and other run artifacts.
pub const DEFAULT_OUTPUT_DIR: &str = "./webpilot-output";

/// Shared logger callback signature used by the configuration.
pub type LoggerCallback = Arc<dyn Fn(&str) + Send + Sync + 'static>;

/// Browser engine the pilot should drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeriveSerialize, DeriveDeserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// DevTools-protocol Chromium driven over a pipe/websocket.
    Chromium,
    /// Any browser behind a WebDriver-compatible server.
    Webdriver,
}

impl Default for EngineKind {
    fn default() -> Self {
        EngineKind::Chromium
    }
}

impl EngineKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chromium" | "chrome" | "cdp" => Some(EngineKind::Chromium),
            "webdriver" | "selenium" => Some(EngineKind::Webdriver),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EngineKind::Chromium => "chromium",
            EngineKind::Webdriver => "webdriver",
        }
    }
}

/// Verbosity level for pilot logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Minimal,
    Medium,
    Detailed,
}

impl Verbosity {
    fn as_u8(self) -> u8 {
        match self {
            Verbosity::Minimal => 0,
            Verbosity::Medium => 1,
            Verbosity::Detailed => 2,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Verbosity::Minimal),
            1 => Some(Verbosity::Medium),
            2 => Some(Verbosity::Detailed),
            _ => None,
        }
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Medium
    }
}

impl Serialize for Verbosity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Verbosity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Verbosity::from_u8(value).ok_or_else(|| {
            DeError::custom(format!(
                "invalid verbosity value {value}; expected 0, 1, or 2"
            ))
        })
    }
}

/// Configuration values for the pilot.
#[derive(DeriveSerialize, DeriveDeserialize, Clone)]
#[serde(default)]
pub struct PilotConfig {
    pub engine: EngineKind,
    pub headless: bool,
    /// Per-operation deadline applied to navigation and settle waits.
    #[serde(alias = "timeoutMs")]
    pub timeout_ms: u64,
    #[serde(alias = "userAgent")]
    pub user_agent: Option<String>,
    /// Directory that receives the `screenshots/` subdirectory.
    #[serde(alias = "outputDir")]
    pub output_dir: String,
    #[serde(alias = "webdriverUrl")]
    pub webdriver_url: String,
    #[serde(alias = "chromeExecutable")]
    pub chrome_executable: Option<String>,
    pub viewport: Viewport,
    /// When false, element location never consults the AI locator.
    #[serde(alias = "aiElementDetection")]
    pub ai_element_detection: bool,
    /// When true, `navigate_to` asks the planner for a plan after each load.
    #[serde(alias = "autonomousPlanning")]
    pub autonomous_planning: bool,
    /// Minimum locator confidence before falling back to heuristics.
    #[serde(alias = "confidenceThreshold")]
    pub confidence_threshold: f64,
    #[serde(alias = "maxRetries")]
    pub max_retries: u32,
    #[serde(alias = "modelName")]
    pub model_name: String,
    #[serde(alias = "modelApiKey")]
    pub model_api_key: Option<String>,
    #[serde(alias = "modelClientOptions")]
    pub model_client_options: Option<JsonObject>,
    #[serde(skip_serializing, skip_deserializing)]
    pub logger: Option<LoggerCallback>,
    pub verbose: Verbosity,
}

impl Default for PilotConfig {
    fn default() -> Self {
        PilotConfig {
            engine: EngineKind::default(),
            headless: true,
            timeout_ms: 30_000,
            user_agent: None,
            output_dir: DEFAULT_OUTPUT_DIR.to_string(),
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            chrome_executable: None,
            viewport: Viewport::default(),
            ai_element_detection: true,
            autonomous_planning: false,
            confidence_threshold: 0.6,
            max_retries: 2,
            model_name: "gpt-4o".to_string(),
            model_api_key: None,
            model_client_options: None,
            logger: None,
            verbose: Verbosity::default(),
        }
    }
}

impl PilotConfig {
    /// Construct a configuration by reading relevant environment variables,
    /// after loading a `.env` file if present.
    pub fn from_env() -> Result<Self, PilotConfigError> {
        let _ = dotenv();
        let mut config = PilotConfig::default();

        if let Some(value) = env_var("WEBPILOT_ENGINE") {
            config.engine = EngineKind::parse(&value)
                .ok_or_else(|| PilotConfigError::invalid_enum("WEBPILOT_ENGINE", value.clone()))?;
        }

        if let Some(value) = env_var("WEBPILOT_HEADLESS") {
            config.headless = parse_bool("WEBPILOT_HEADLESS", &value)?;
        }

        if let Some(value) = env_var("WEBPILOT_TIMEOUT_MS") {
            config.timeout_ms = parse_u64("WEBPILOT_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = env_var("WEBPILOT_USER_AGENT") {
            config.user_agent = Some(value);
        }

        if let Some(value) = env_var("WEBPILOT_OUTPUT_DIR") {
            config.output_dir = value;
        }

        if let Some(value) = env_var("WEBPILOT_WEBDRIVER_URL") {
            config.webdriver_url = value;
        }

        if let Some(value) = env_var("WEBPILOT_CHROME_EXECUTABLE") {
            config.chrome_executable = Some(value);
        }

        if let Some(value) = env_var("WEBPILOT_VIEWPORT") {
            config.viewport = parse_viewport("WEBPILOT_VIEWPORT", &value)?;
        }

        if let Some(value) = env_var("WEBPILOT_AI_DETECTION") {
            config.ai_element_detection = parse_bool("WEBPILOT_AI_DETECTION", &value)?;
        }

        if let Some(value) = env_var("WEBPILOT_AUTONOMOUS_PLANNING") {
            config.autonomous_planning = parse_bool("WEBPILOT_AUTONOMOUS_PLANNING", &value)?;
        }

        if let Some(value) = env_var("WEBPILOT_CONFIDENCE_THRESHOLD") {
            config.confidence_threshold = parse_f64("WEBPILOT_CONFIDENCE_THRESHOLD", &value)?;
        }

        if let Some(value) = env_var("WEBPILOT_MAX_RETRIES") {
            config.max_retries = parse_u64("WEBPILOT_MAX_RETRIES", &value)? as u32;
        }

        if let Some(value) = env_var("MODEL_NAME") {
            config.model_name = value;
        }

        if let Some(value) = env_var("MODEL_API_KEY") {
            config.model_api_key = Some(value);
        }

        if let Some(value) = env_var("WEBPILOT_MODEL_CLIENT_OPTIONS") {
            config.model_client_options =
                Some(parse_json_object("WEBPILOT_MODEL_CLIENT_OPTIONS", &value)?);
        }

        if let Some(value) = env_var("WEBPILOT_VERBOSE") {
            let parsed = parse_u8("WEBPILOT_VERBOSE", &value)?;
            config.verbose = Verbosity::from_u8(parsed).ok_or_else(|| {
                PilotConfigError::invalid_enum("WEBPILOT_VERBOSE", parsed.to_string())
            })?;
        }

        Ok(config)
    }

    /// Create a new configuration with explicit field overrides applied.
    pub fn with_overrides(&self, overrides: PilotConfigOverrides) -> PilotConfig {
        let mut next = self.clone();

        if let Some(value) = overrides.engine {
            next.engine = value;
        }
        if let Some(value) = overrides.headless {
            next.headless = value;
        }
        if let Some(value) = overrides.timeout_ms {
            next.timeout_ms = value;
        }
        if let Some(value) = overrides.user_agent {
            next.user_agent = value;
        }
        if let Some(value) = overrides.output_dir {
            next.output_dir = value;
        }
        if let Some(value) = overrides.webdriver_url {
            next.webdriver_url = value;
        }
        if let Some(value) = overrides.chrome_executable {
            next.chrome_executable = value;
        }
        if let Some(value) = overrides.viewport {
            next.viewport = value;
        }
        if let Some(value) = overrides.ai_element_detection {
            next.ai_element_detection = value;
        }
        if let Some(value) = overrides.autonomous_planning {
            next.autonomous_planning = value;
        }
        if let Some(value) = overrides.confidence_threshold {
            next.confidence_threshold = value;
        }
        if let Some(value) = overrides.max_retries {
            next.max_retries = value;
        }
        if let Some(value) = overrides.model_name {
            next.model_name = value;
        }
        if let Some(value) = overrides.model_api_key {
            next.model_api_key = value;
        }
        if let Some(value) = overrides.model_client_options {
            next.model_client_options = value;
        }
        if let Some(value) = overrides.logger {
            next.logger = value;
        }
        if let Some(value) = overrides.verbose {
            next.verbose = value;
        }

        next
    }
}

/// Field-level overrides for [`PilotConfig::with_overrides`].
#[derive(Default, Clone)]
pub struct PilotConfigOverrides {
    pub engine: Option<EngineKind>,
    pub headless: Option<bool>,
    pub timeout_ms: Option<u64>,
    pub user_agent: Option<Option<String>>,
    pub output_dir: Option<String>,
    pub webdriver_url: Option<String>,
    pub chrome_executable: Option<Option<String>>,
    pub viewport: Option<Viewport>,
    pub ai_element_detection: Option<bool>,
    pub autonomous_planning: Option<bool>,
    pub confidence_threshold: Option<f64>,
    pub max_retries: Option<u32>,
    pub model_name: Option<String>,
    pub model_api_key: Option<Option<String>>,
    pub model_client_options: Option<Option<JsonObject>>,
    pub logger: Option<Option<LoggerCallback>>,
    pub verbose: Option<Verbosity>,
}

impl PilotConfigOverrides {
    /// Builder-style helper to set the `engine` override.
    pub fn engine(mut self, engine: EngineKind) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Builder-style helper to set the `model_api_key` override.
    pub fn model_api_key<T: Into<Option<String>>>(mut self, key: T) -> Self {
        self.model_api_key = Some(key.into());
        self
    }
}

impl fmt::Debug for PilotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PilotConfig")
            .field("engine", &self.engine)
            .field("headless", &self.headless)
            .field("timeout_ms", &self.timeout_ms)
            .field("user_agent", &self.user_agent)
            .field("output_dir", &self.output_dir)
            .field("webdriver_url", &self.webdriver_url)
            .field("chrome_executable", &self.chrome_executable)
            .field("viewport", &self.viewport)
            .field("ai_element_detection", &self.ai_element_detection)
            .field("autonomous_planning", &self.autonomous_planning)
            .field("confidence_threshold", &self.confidence_threshold)
            .field("max_retries", &self.max_retries)
            .field("model_name", &self.model_name)
            .field("model_api_key_present", &self.model_api_key.is_some())
            .field("model_client_options", &self.model_client_options)
            .field("verbose", &self.verbose)
            .field("logger_present", &self.logger.is_some())
            .finish()
    }
}

impl fmt::Debug for PilotConfigOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PilotConfigOverrides")
            .field("engine", &self.engine)
            .field("headless", &self.headless)
            .field("timeout_ms", &self.timeout_ms)
            .field("user_agent", &self.user_agent)
            .field("output_dir", &self.output_dir)
            .field("webdriver_url", &self.webdriver_url)
            .field("chrome_executable", &self.chrome_executable)
            .field("viewport", &self.viewport)
            .field("ai_element_detection", &self.ai_element_detection)
            .field("autonomous_planning", &self.autonomous_planning)
            .field("confidence_threshold", &self.confidence_threshold)
            .field("max_retries", &self.max_retries)
            .field("model_name", &self.model_name)
            .field(
                "model_api_key",
                &self.model_api_key.as_ref().map(|inner| inner.is_some()),
            )
            .field("model_client_options", &self.model_client_options)
            .field("logger", &self.logger.as_ref().map(|inner| inner.is_some()))
            .field("verbose", &self.verbose)
            .finish()
    }
}

/// Errors that can arise while constructing a [`PilotConfig`].
#[derive(Debug, Error)]
pub enum PilotConfigError {
    #[error("invalid value '{value}' for {field}")]
    InvalidEnumVariant { field: &'static str, value: String },
    #[error("invalid boolean '{value}' for {field}")]
    InvalidBool { field: &'static str, value: String },
    #[error("invalid number '{value}' for {field}: {source}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("invalid decimal '{value}' for {field}: {source}")]
    InvalidDecimal {
        field: &'static str,
        value: String,
        #[source]
        source: ParseFloatError,
    },
    #[error("invalid viewport '{value}' for {field}; expected WIDTHxHEIGHT")]
    InvalidViewport { field: &'static str, value: String },
    #[error("{field} must be a JSON object")]
    InvalidJsonType { field: &'static str },
    #[error("invalid JSON for {field}: {source}")]
    InvalidJson {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl PilotConfigError {
    fn invalid_enum(field: &'static str, value: String) -> Self {
        PilotConfigError::InvalidEnumVariant { field, value }
    }
}

fn env_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, PilotConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(PilotConfigError::InvalidBool {
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_u8(field: &'static str, value: &str) -> Result<u8, PilotConfigError> {
    value
        .trim()
        .parse::<u8>()
        .map_err(|source| PilotConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, PilotConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|source| PilotConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_f64(field: &'static str, value: &str) -> Result<f64, PilotConfigError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|source| PilotConfigError::InvalidDecimal {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_viewport(field: &'static str, value: &str) -> Result<Viewport, PilotConfigError> {
    let invalid = || PilotConfigError::InvalidViewport {
        field,
        value: value.to_string(),
    };
    let (width, height) = value.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
    Ok(Viewport {
        width: width.trim().parse::<u32>().map_err(|_| invalid())?,
        height: height.trim().parse::<u32>().map_err(|_| invalid())?,
    })
}

fn parse_json_object(field: &'static str, value: &str) -> Result<JsonObject, PilotConfigError> {
    let parsed: JsonValue = serde_json::from_str(value)
        .map_err(|source| PilotConfigError::InvalidJson { field, source })?;
    match parsed {
        JsonValue::Object(map) => Ok(map),
        _ => Err(PilotConfigError::InvalidJsonType { field }),
    }
}
