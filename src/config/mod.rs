//! Configuration module for the voice assistant
//!
//! This module handles assistant configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `env`: Environment variable loading
//! - `yaml`: YAML configuration file loading and merging
//! - `tools`: Tool declarations and per-environment tool settings
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use voicelive_assistant::config::AssistantConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = AssistantConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("assistant.yaml");
//! let config = AssistantConfig::from_file(&config_path)?;
//!
//! println!("Connecting to {}", config.websocket_url()?);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::core::realtime::messages::{TurnDetection, Voice, VoiceConfig};

mod env;
pub mod tools;
mod validation;
mod yaml;

pub use tools::{EnvironmentInfo, EnvironmentSettings, ToolEntry, ToolsConfig};
pub use yaml::YamlConfig;

pub const DEFAULT_API_VERSION: &str = "2025-05-01-preview";
pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview";
pub const DEFAULT_VOICE: &str = "en-US-AvaNeural";
pub const DEFAULT_VOICE_TYPE: &str = "azure-standard";
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "gpt-4o-transcribe";
pub const DEFAULT_FUNCTION_CALL_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful call-center assistant. \
Answer billing questions with the get_user_information tool and product questions \
with the get_product_information tool. Keep answers short and conversational.";

/// Path of the Voice Live realtime endpoint on the resource host.
pub const REALTIME_PATH: &str = "/voice-live/realtime";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration value: {0}")]
    MissingValue(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Voice the assistant speaks with.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSettings {
    pub name: String,
    /// `None` sends the bare name, e.g. for OpenAI voices like "alloy"
    pub voice_type: Option<String>,
    pub temperature: Option<f32>,
}

impl VoiceSettings {
    pub fn to_voice(&self) -> Voice {
        match &self.voice_type {
            Some(voice_type) => Voice::Configured(VoiceConfig {
                name: self.name.clone(),
                voice_type: voice_type.clone(),
                temperature: self.temperature,
            }),
            None => Voice::Name(self.name.clone()),
        }
    }
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_VOICE.to_string(),
            voice_type: Some(DEFAULT_VOICE_TYPE.to_string()),
            temperature: None,
        }
    }
}

/// Server-side turn detection parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnDetectionSettings {
    /// `azure_semantic_vad` or `server_vad`
    pub mode: String,
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

impl TurnDetectionSettings {
    pub fn to_turn_detection(&self) -> TurnDetection {
        match self.mode.as_str() {
            "server_vad" => TurnDetection::ServerVad {
                threshold: Some(self.threshold),
                prefix_padding_ms: Some(self.prefix_padding_ms),
                silence_duration_ms: Some(self.silence_duration_ms),
            },
            _ => TurnDetection::AzureSemanticVad {
                threshold: Some(self.threshold),
                prefix_padding_ms: Some(self.prefix_padding_ms),
                silence_duration_ms: Some(self.silence_duration_ms),
                remove_filler_words: None,
            },
        }
    }
}

impl Default for TurnDetectionSettings {
    fn default() -> Self {
        Self {
            mode: "azure_semantic_vad".to_string(),
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
        }
    }
}

/// Azure AI Search connection used by the product information tool.
#[derive(Clone)]
pub struct SearchSettings {
    pub endpoint: String,
    pub index: String,
    pub api_key: Zeroizing<String>,
    pub api_version: Option<String>,
}

impl fmt::Debug for SearchSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchSettings")
            .field("endpoint", &self.endpoint)
            .field("index", &self.index)
            .field("api_key", &"<redacted>")
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// Assistant configuration
///
/// Contains everything needed to open a Voice Live session:
/// - Resource endpoint, API key and API version
/// - Model, voice and instructions
/// - Turn detection and input transcription
/// - Function call timeout and tool configuration path
/// - Knowledge search connection (optional)
#[derive(Clone)]
pub struct AssistantConfig {
    pub endpoint: String,
    pub api_key: Zeroizing<String>,
    pub api_version: String,
    pub model: String,
    pub voice: VoiceSettings,
    pub instructions: String,
    pub turn_detection: TurnDetectionSettings,
    /// `None` disables input transcription
    pub transcription_model: Option<String>,
    /// Bound on each wait of the function call protocol
    pub function_call_timeout: Duration,
    pub tools_config_path: Option<PathBuf>,
    pub search: Option<SearchSettings>,
}

impl fmt::Debug for AssistantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssistantConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("instructions", &self.instructions)
            .field("turn_detection", &self.turn_detection)
            .field("transcription_model", &self.transcription_model)
            .field("function_call_timeout", &self.function_call_timeout)
            .field("tools_config_path", &self.tools_config_path)
            .field("search", &self.search)
            .finish()
    }
}

impl AssistantConfig {
    /// Configuration with defaults for everything except the endpoint and key.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: Zeroizing::new(api_key.into()),
            api_version: DEFAULT_API_VERSION.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: VoiceSettings::default(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            turn_detection: TurnDetectionSettings::default(),
            transcription_model: Some(DEFAULT_TRANSCRIPTION_MODEL.to_string()),
            function_call_timeout: DEFAULT_FUNCTION_CALL_TIMEOUT,
            tools_config_path: None,
            search: None,
        }
    }

    /// Load configuration from environment variables
    ///
    /// `.env` is loaded by the binary before this is called.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = env::load_from_env()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file, on top of environment variables
    ///
    /// Values present in the YAML file win over environment variables.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml_config = YamlConfig::from_file(path)?;
        let mut config = env::load_from_env()?;
        yaml_config.apply(&mut config)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Check required values and the endpoint URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self)
    }

    /// WebSocket URL of the realtime endpoint
    ///
    /// `https` endpoints map to `wss`, `http` to `ws`; any path on the
    /// endpoint is replaced by the realtime path.
    pub fn websocket_url(&self) -> Result<url::Url, ConfigError> {
        let mut url = url::Url::parse(self.endpoint.trim())
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {e}", self.endpoint)))?;

        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(ConfigError::InvalidUrl(format!(
                    "unsupported scheme '{other}'"
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| ConfigError::InvalidUrl(format!("cannot use scheme {scheme}")))?;
        url.set_path(REALTIME_PATH);
        url.set_query(None);
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version)
            .append_pair("model", &self.model);
        Ok(url)
    }
}
