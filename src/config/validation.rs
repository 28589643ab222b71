use super::{AssistantConfig, ConfigError};

/// Validate a loaded configuration
///
/// Checks that the endpoint and API key are present, that the endpoint maps
/// to a WebSocket URL, and that the numeric session settings are usable.
pub(super) fn validate(config: &AssistantConfig) -> Result<(), ConfigError> {
    validate_endpoint(config)?;
    validate_api_key(config)?;
    validate_turn_detection(config)?;

    if config.function_call_timeout.is_zero() {
        return Err(ConfigError::invalid(
            "function_call_timeout",
            "must be greater than zero",
        ));
    }
    if config.model.trim().is_empty() {
        return Err(ConfigError::MissingValue("model".to_string()));
    }

    Ok(())
}

fn validate_endpoint(config: &AssistantConfig) -> Result<(), ConfigError> {
    if config.endpoint.trim().is_empty() {
        return Err(ConfigError::MissingValue(
            "endpoint (VOICELIVE_ENDPOINT or AZURE_VOICELIVE_ENDPOINT)".to_string(),
        ));
    }
    let url = config.websocket_url()?;
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "{} has no host",
            config.endpoint
        )));
    }
    Ok(())
}

fn validate_api_key(config: &AssistantConfig) -> Result<(), ConfigError> {
    if config.api_key.trim().is_empty() {
        return Err(ConfigError::MissingValue(
            "api key (VOICELIVE_API_KEY or AZURE_VOICELIVE_API_KEY)".to_string(),
        ));
    }
    Ok(())
}

fn validate_turn_detection(config: &AssistantConfig) -> Result<(), ConfigError> {
    let turn = &config.turn_detection;
    match turn.mode.as_str() {
        "azure_semantic_vad" | "server_vad" => {}
        other => {
            return Err(ConfigError::invalid(
                "turn_detection.type",
                format!("unsupported mode '{other}'"),
            ));
        }
    }
    if !(0.0..=1.0).contains(&turn.threshold) {
        return Err(ConfigError::invalid(
            "turn_detection.threshold",
            format!("{} is outside [0.0, 1.0]", turn.threshold),
        ));
    }
    Ok(())
}
