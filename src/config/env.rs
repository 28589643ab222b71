use std::path::PathBuf;
use std::time::Duration;
use zeroize::Zeroizing;

use super::{AssistantConfig, ConfigError, SearchSettings};

/// Read a variable, treating empty values as unset.
pub(super) fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// First variable of `names` that is set.
fn env_var_any(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| env_var(name))
}

pub(super) fn read_instructions_file(path: &str) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: PathBuf::from(path),
        source,
    })
}

/// Build configuration from environment variables over defaults
///
/// Missing endpoint or key are left empty; validation reports them.
pub(super) fn load_from_env() -> Result<AssistantConfig, ConfigError> {
    let endpoint = env_var_any(&["VOICELIVE_ENDPOINT", "AZURE_VOICELIVE_ENDPOINT"]).unwrap_or_default();
    let api_key = env_var_any(&["VOICELIVE_API_KEY", "AZURE_VOICELIVE_API_KEY"]).unwrap_or_default();

    let mut config = AssistantConfig::new(endpoint, api_key);

    if let Some(model) = env_var("VOICELIVE_MODEL") {
        config.model = model;
    }
    if let Some(voice) = env_var("VOICELIVE_VOICE") {
        config.voice.name = voice;
    }
    if let Some(api_version) = env_var("VOICELIVE_API_VERSION") {
        config.api_version = api_version;
    }

    // Inline instructions win over an instructions file
    if let Some(instructions) = env_var("VOICELIVE_INSTRUCTIONS") {
        config.instructions = instructions;
    } else if let Some(path) = env_var("VOICELIVE_INSTRUCTIONS_FILE") {
        config.instructions = read_instructions_file(&path)?;
    }

    if let Some(path) = env_var("TOOLS_CONFIG_PATH") {
        config.tools_config_path = Some(PathBuf::from(path));
    }

    if let Some(raw) = env_var("FUNCTION_CALL_TIMEOUT_SECONDS") {
        let seconds: u64 = raw.parse().map_err(|_| {
            ConfigError::invalid(
                "FUNCTION_CALL_TIMEOUT_SECONDS",
                format!("'{raw}' is not a whole number of seconds"),
            )
        })?;
        config.function_call_timeout = Duration::from_secs(seconds);
    }

    config.search = search_from_env();

    Ok(config)
}

/// Search settings, present only when endpoint, index and key are all set.
fn search_from_env() -> Option<SearchSettings> {
    let endpoint = env_var("AZURE_SEARCH_ENDPOINT")?;
    let index = env_var("AZURE_SEARCH_INDEX")?;
    let api_key = env_var("AZURE_SEARCH_API_KEY")?;
    Some(SearchSettings {
        endpoint,
        index,
        api_key: Zeroizing::new(api_key),
        api_version: env_var("AZURE_SEARCH_API_VERSION"),
    })
}
