use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::Zeroizing;

use super::{AssistantConfig, ConfigError, SearchSettings, env};

/// Complete YAML configuration structure
///
/// This structure represents the full configuration that can be loaded from a YAML file.
/// All fields are optional to allow partial configuration. Values present here
/// override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// voicelive:
///   endpoint: "https://my-resource.cognitiveservices.azure.com"
///   api_key: "your-api-key"
///   api_version: "2025-05-01-preview"
///   model: "gpt-4o-realtime-preview"
///
/// voice:
///   name: "en-US-AvaNeural"
///   type: "azure-standard"
///
/// session:
///   instructions_file: "instructions.txt"
///   transcription_model: "gpt-4o-transcribe"
///   function_call_timeout_seconds: 10
///
/// turn_detection:
///   type: "azure_semantic_vad"
///   threshold: 0.5
///   prefix_padding_ms: 300
///   silence_duration_ms: 500
///
/// tools:
///   config_path: "tools_config.yaml"
///
/// search:
///   endpoint: "https://my-search.search.windows.net"
///   index: "products"
///   api_key: "your-search-key"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub voicelive: Option<VoiceLiveYaml>,
    pub voice: Option<VoiceYaml>,
    pub session: Option<SessionYaml>,
    pub turn_detection: Option<TurnDetectionYaml>,
    pub tools: Option<ToolsYaml>,
    pub search: Option<SearchYaml>,
}

/// Voice Live connection settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VoiceLiveYaml {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub api_version: Option<String>,
    pub model: Option<String>,
}

/// Voice settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VoiceYaml {
    pub name: Option<String>,
    /// Voice type; an empty string sends the bare voice name
    #[serde(rename = "type")]
    pub voice_type: Option<String>,
    pub temperature: Option<f32>,
}

/// Session behaviour from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub instructions: Option<String>,
    pub instructions_file: Option<String>,
    /// Empty string disables input transcription
    pub transcription_model: Option<String>,
    pub function_call_timeout_seconds: Option<u64>,
}

/// Turn detection settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TurnDetectionYaml {
    #[serde(rename = "type")]
    pub mode: Option<String>,
    pub threshold: Option<f32>,
    pub prefix_padding_ms: Option<u32>,
    pub silence_duration_ms: Option<u32>,
}

/// Tool configuration location from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ToolsYaml {
    pub config_path: Option<String>,
}

/// Knowledge search settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SearchYaml {
    pub endpoint: Option<String>,
    pub index: Option<String>,
    pub api_key: Option<String>,
    pub api_version: Option<String>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        // An empty file deserializes to unit, not to an empty mapping
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Overlay the values present in this file onto `config`.
    pub fn apply(self, config: &mut AssistantConfig) -> Result<(), ConfigError> {
        if let Some(voicelive) = self.voicelive {
            if let Some(endpoint) = voicelive.endpoint {
                config.endpoint = endpoint;
            }
            if let Some(api_key) = voicelive.api_key {
                config.api_key = Zeroizing::new(api_key);
            }
            if let Some(api_version) = voicelive.api_version {
                config.api_version = api_version;
            }
            if let Some(model) = voicelive.model {
                config.model = model;
            }
        }

        if let Some(voice) = self.voice {
            if let Some(name) = voice.name {
                config.voice.name = name;
            }
            if let Some(voice_type) = voice.voice_type {
                config.voice.voice_type = (!voice_type.is_empty()).then_some(voice_type);
            }
            if voice.temperature.is_some() {
                config.voice.temperature = voice.temperature;
            }
        }

        if let Some(session) = self.session {
            if let Some(instructions) = session.instructions {
                config.instructions = instructions;
            } else if let Some(path) = session.instructions_file {
                config.instructions = env::read_instructions_file(&path)?;
            }
            if let Some(model) = session.transcription_model {
                config.transcription_model = (!model.is_empty()).then_some(model);
            }
            if let Some(seconds) = session.function_call_timeout_seconds {
                config.function_call_timeout = Duration::from_secs(seconds);
            }
        }

        if let Some(turn) = self.turn_detection {
            if let Some(mode) = turn.mode {
                config.turn_detection.mode = mode;
            }
            if let Some(threshold) = turn.threshold {
                config.turn_detection.threshold = threshold;
            }
            if let Some(prefix) = turn.prefix_padding_ms {
                config.turn_detection.prefix_padding_ms = prefix;
            }
            if let Some(silence) = turn.silence_duration_ms {
                config.turn_detection.silence_duration_ms = silence;
            }
        }

        if let Some(path) = self.tools.and_then(|t| t.config_path) {
            config.tools_config_path = Some(PathBuf::from(path));
        }

        if let Some(search) = self.search {
            config.search = merge_search(config.search.take(), search);
        }

        Ok(())
    }
}

/// YAML search values over the environment's; all three of endpoint, index
/// and key must end up set.
fn merge_search(base: Option<SearchSettings>, yaml: SearchYaml) -> Option<SearchSettings> {
    let (endpoint, index, api_key, api_version) = match base {
        Some(base) => (
            Some(base.endpoint),
            Some(base.index),
            Some(base.api_key),
            base.api_version,
        ),
        None => (None, None, None, None),
    };

    Some(SearchSettings {
        endpoint: yaml.endpoint.or(endpoint)?,
        index: yaml.index.or(index)?,
        api_key: yaml.api_key.map(Zeroizing::new).or(api_key)?,
        api_version: yaml.api_version.or(api_version),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
voicelive:
  endpoint: "https://yaml.example.com"
  api_key: "yaml-key"
  model: "gpt-4o"

voice:
  name: "alloy"
  type: ""

session:
  instructions: "Be nice."
  transcription_model: ""
  function_call_timeout_seconds: 30

turn_detection:
  type: "server_vad"
  threshold: 0.7

tools:
  config_path: "tools.yaml"

search:
  endpoint: "https://search.example.com"
  index: "docs"
  api_key: "search-key"
"#;
        let parsed = YamlConfig::from_yaml_str(yaml).unwrap();
        let mut config = AssistantConfig::new("https://env.example.com", "env-key");
        parsed.apply(&mut config).unwrap();

        assert_eq!(config.endpoint, "https://yaml.example.com");
        assert_eq!(config.api_key.as_str(), "yaml-key");
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.voice.name, "alloy");
        assert_eq!(config.voice.voice_type, None);
        assert_eq!(config.instructions, "Be nice.");
        assert_eq!(config.transcription_model, None);
        assert_eq!(config.function_call_timeout, Duration::from_secs(30));
        assert_eq!(config.turn_detection.mode, "server_vad");
        assert_eq!(config.turn_detection.threshold, 0.7);
        assert_eq!(config.turn_detection.silence_duration_ms, 500);
        assert_eq!(config.tools_config_path, Some(PathBuf::from("tools.yaml")));
        assert_eq!(config.search.unwrap().index, "docs");
    }

    #[test]
    fn test_partial_yaml_keeps_existing_values() {
        let parsed = YamlConfig::from_yaml_str("voicelive:\n  model: \"gpt-4o-mini\"\n").unwrap();
        let mut config = AssistantConfig::new("https://env.example.com", "env-key");
        parsed.apply(&mut config).unwrap();

        assert_eq!(config.endpoint, "https://env.example.com");
        assert_eq!(config.api_key.as_str(), "env-key");
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.voice.name, "en-US-AvaNeural");
    }

    #[test]
    fn test_empty_yaml() {
        let parsed = YamlConfig::from_yaml_str("").unwrap();
        assert!(parsed.voicelive.is_none());
    }

    #[test]
    fn test_incomplete_search_section_is_dropped() {
        let parsed = YamlConfig::from_yaml_str("search:\n  index: \"docs\"\n").unwrap();
        let mut config = AssistantConfig::new("https://env.example.com", "k");
        parsed.apply(&mut config).unwrap();
        assert!(config.search.is_none());
    }

    #[test]
    fn test_invalid_yaml() {
        let result = YamlConfig::from_yaml_str("voicelive: [unclosed");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_from_file_and_instructions_file() {
        let temp_dir = TempDir::new().unwrap();
        let instructions = temp_dir.path().join("instructions.txt");
        fs::write(&instructions, "Answer billing questions.").unwrap();

        let config_path = temp_dir.path().join("assistant.yaml");
        fs::write(
            &config_path,
            format!("session:\n  instructions_file: \"{}\"\n", instructions.display()),
        )
        .unwrap();

        let parsed = YamlConfig::from_file(&config_path).unwrap();
        let mut config = AssistantConfig::new("https://env.example.com", "k");
        parsed.apply(&mut config).unwrap();
        assert_eq!(config.instructions, "Answer billing questions.");
    }

    #[test]
    fn test_missing_file() {
        let result = YamlConfig::from_file(Path::new("/nonexistent/assistant.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
