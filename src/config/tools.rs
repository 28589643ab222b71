//! Tool declarations and per-environment tool settings.
//!
//! # Example YAML
//! ```yaml
//! default_environment: development
//!
//! environments:
//!   development:
//!     enable_all_tools: true
//!     log_function_calls: true
//!     default_timeout_seconds: 15
//!     debug_mode: true
//!   production:
//!     default_timeout_seconds: 10
//!
//! tools:
//!   - name: get_user_information
//!     description: "Billing due date and invoice amount for the caller"
//!     parameters:
//!       type: object
//!       properties:
//!         query: { type: string }
//!       required: [query]
//!     timeout_seconds: 5
//!   - name: get_product_information
//!     enabled: true
//!     description: "Search the product knowledge base"
//!     parameters:
//!       type: object
//!       properties:
//!         query: { type: string }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::ConfigError;
use super::env::env_var;
use crate::core::realtime::ToolDef;

/// Environment used when neither `ENVIRONMENT` nor `default_environment` is set.
pub const DEFAULT_ENVIRONMENT: &str = "production";

const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 10;

/// Settings for one deployment environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSettings {
    /// `false` declares no tools at all
    pub enable_all_tools: bool,
    /// Log function arguments and results at info level
    pub log_function_calls: bool,
    pub default_timeout_seconds: u64,
    pub debug_mode: bool,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            enable_all_tools: true,
            log_function_calls: false,
            default_timeout_seconds: DEFAULT_TOOL_TIMEOUT_SECS,
            debug_mode: false,
        }
    }
}

/// One tool in the `tools` list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolEntry {
    pub name: String,
    #[serde(rename = "type", default = "default_tool_type")]
    pub tool_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Overrides the environment's default timeout when non-zero
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

fn default_tool_type() -> String {
    "function".to_string()
}

fn default_enabled() -> bool {
    true
}

impl ToolEntry {
    fn to_tool_def(&self) -> ToolDef {
        ToolDef {
            tool_type: self.tool_type.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: Some(
                self.parameters
                    .clone()
                    .unwrap_or_else(|| serde_json::json!({})),
            ),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ToolsFile {
    default_environment: Option<String>,
    environments: HashMap<String, EnvironmentSettings>,
    tools: Vec<ToolEntry>,
}

/// Summary of the active tool environment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvironmentInfo {
    pub environment: String,
    pub config_file: Option<String>,
    pub tools_enabled: bool,
    pub tool_count: usize,
    pub log_function_calls: bool,
    pub debug_mode: bool,
    pub default_timeout: u64,
}

/// Tool configuration loaded once at startup.
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    path: Option<PathBuf>,
    environment: String,
    file: ToolsFile,
}

impl Default for ToolsConfig {
    /// No tools, production settings.
    fn default() -> Self {
        Self {
            path: None,
            environment: DEFAULT_ENVIRONMENT.to_string(),
            file: ToolsFile::default(),
        }
    }
}

impl ToolsConfig {
    /// Load from a YAML file; the active environment comes from `ENVIRONMENT`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml_str(&contents, env_var("ENVIRONMENT").as_deref())?;
        config.path = Some(path.to_path_buf());
        info!("Loaded tool configuration from {}", path.display());
        Ok(config)
    }

    /// Parse YAML text. `environment` wins over the file's `default_environment`.
    pub fn from_yaml_str(contents: &str, environment: Option<&str>) -> Result<Self, ConfigError> {
        let file: ToolsFile = if contents.trim().is_empty() {
            ToolsFile::default()
        } else {
            serde_yaml::from_str(contents)?
        };

        let environment = environment
            .map(str::to_string)
            .or_else(|| file.default_environment.clone())
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());
        info!("Using tool environment: {}", environment);

        Ok(Self {
            path: None,
            environment,
            file,
        })
    }

    /// Re-read the file this configuration came from.
    pub fn reload(&mut self) -> Result<(), ConfigError> {
        let Some(path) = self.path.clone() else {
            debug!("Tool configuration has no backing file, nothing to reload");
            return Ok(());
        };
        *self = Self::from_file(&path)?;
        info!("Tool configuration reloaded");
        Ok(())
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Settings of the active environment, defaults when it is not listed.
    pub fn environment_settings(&self) -> EnvironmentSettings {
        self.file
            .environments
            .get(&self.environment)
            .cloned()
            .unwrap_or_default()
    }

    /// Declarations to send to the service: enabled tools, in file order.
    pub fn tool_definitions(&self) -> Vec<ToolDef> {
        if !self.environment_settings().enable_all_tools {
            info!("Tools disabled by environment configuration");
            return Vec::new();
        }

        let tools: Vec<ToolDef> = self
            .file
            .tools
            .iter()
            .filter(|tool| tool.enabled)
            .map(ToolEntry::to_tool_def)
            .collect();
        info!("Loaded {} tool definitions", tools.len());
        tools
    }

    fn tool_entry(&self, name: &str) -> Option<&ToolEntry> {
        self.file.tools.iter().find(|tool| tool.name == name)
    }

    /// Execution bound for `name`: its own timeout, else the environment default.
    pub fn tool_timeout(&self, name: &str) -> Duration {
        let seconds = self
            .tool_entry(name)
            .and_then(|tool| tool.timeout_seconds)
            .filter(|&secs| secs > 0)
            .unwrap_or_else(|| self.environment_settings().default_timeout_seconds);
        Duration::from_secs(seconds)
    }

    /// Unlisted tools count as enabled unless the environment disables all tools.
    pub fn is_tool_enabled(&self, name: &str) -> bool {
        if !self.environment_settings().enable_all_tools {
            return false;
        }
        self.tool_entry(name).is_none_or(|tool| tool.enabled)
    }

    pub fn should_log_function_calls(&self) -> bool {
        self.environment_settings().log_function_calls
    }

    pub fn is_debug_mode(&self) -> bool {
        self.environment_settings().debug_mode
    }

    pub fn environment_info(&self) -> EnvironmentInfo {
        let settings = self.environment_settings();
        EnvironmentInfo {
            environment: self.environment.clone(),
            config_file: self.path.as_ref().map(|p| p.display().to_string()),
            tools_enabled: settings.enable_all_tools,
            tool_count: self.tool_definitions().len(),
            log_function_calls: settings.log_function_calls,
            debug_mode: settings.debug_mode,
            default_timeout: settings.default_timeout_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOOLS_YAML: &str = r#"
default_environment: development

environments:
  development:
    log_function_calls: true
    default_timeout_seconds: 15
    debug_mode: true
  locked:
    enable_all_tools: false

tools:
  - name: get_user_information
    description: "Billing lookup"
    parameters:
      type: object
      properties:
        query: { type: string }
    timeout_seconds: 5
  - name: get_product_information
    description: "Product search"
  - name: retired_tool
    enabled: false
"#;

    #[test]
    fn test_default_environment_applies_without_override() {
        let config = ToolsConfig::from_yaml_str(TOOLS_YAML, None).unwrap();
        assert_eq!(config.environment(), "development");
        assert!(config.should_log_function_calls());
        assert!(config.is_debug_mode());
    }

    #[test]
    fn test_tool_definitions_skip_disabled() {
        let config = ToolsConfig::from_yaml_str(TOOLS_YAML, None).unwrap();
        let defs = config.tool_definitions();
        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["get_user_information", "get_product_information"]);
        assert_eq!(defs[0].tool_type, "function");
        assert_eq!(defs[1].parameters, Some(serde_json::json!({})));
        assert!(!config.is_tool_enabled("retired_tool"));
        assert!(config.is_tool_enabled("get_user_information"));
    }

    #[test]
    fn test_tool_timeouts() {
        let config = ToolsConfig::from_yaml_str(TOOLS_YAML, None).unwrap();
        assert_eq!(
            config.tool_timeout("get_user_information"),
            Duration::from_secs(5)
        );
        assert_eq!(
            config.tool_timeout("get_product_information"),
            Duration::from_secs(15)
        );

        let production = ToolsConfig::from_yaml_str(TOOLS_YAML, Some("production")).unwrap();
        assert_eq!(
            production.tool_timeout("get_product_information"),
            Duration::from_secs(10)
        );
        assert!(!production.should_log_function_calls());
    }

    #[test]
    fn test_environment_disabling_all_tools() {
        let config = ToolsConfig::from_yaml_str(TOOLS_YAML, Some("locked")).unwrap();
        assert!(config.tool_definitions().is_empty());
        assert!(!config.is_tool_enabled("get_user_information"));

        let info = config.environment_info();
        assert_eq!(info.environment, "locked");
        assert!(!info.tools_enabled);
        assert_eq!(info.tool_count, 0);
    }

    #[test]
    fn test_empty_config() {
        let config = ToolsConfig::from_yaml_str("", None).unwrap();
        assert_eq!(config.environment(), DEFAULT_ENVIRONMENT);
        assert!(config.tool_definitions().is_empty());
        assert_eq!(config.tool_timeout("anything"), Duration::from_secs(10));
        assert!(config.is_tool_enabled("anything"));

        let mut config = ToolsConfig::default();
        assert!(config.reload().is_ok());
    }

    #[test]
    fn test_environment_info_serializes() {
        let config = ToolsConfig::from_yaml_str(TOOLS_YAML, None).unwrap();
        let value = serde_json::to_value(config.environment_info()).unwrap();
        assert_eq!(value["environment"], "development");
        assert_eq!(value["tool_count"], 2);
        assert_eq!(value["default_timeout"], 15);
        assert_eq!(value["config_file"], serde_json::Value::Null);
    }
}
