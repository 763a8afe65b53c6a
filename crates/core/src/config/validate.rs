use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Pipeline directory is set
/// - Signaling server is set when streaming is enabled
/// - Retry backoff never shrinks the delay
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.manager.pipeline_dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "manager.pipeline_dir cannot be empty".to_string(),
        ));
    }

    if config.engine.ffmpeg_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "engine.ffmpeg_path cannot be empty".to_string(),
        ));
    }

    let streaming = &config.streaming;
    if streaming.enabled && streaming.signaling_server.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "streaming.signaling_server is required when streaming is enabled".to_string(),
        ));
    }
    if streaming.retry.backoff_multiplier < 1.0 {
        return Err(ConfigError::ValidationError(
            "streaming.retry.backoff_multiplier must be >= 1.0".to_string(),
        ));
    }
    if streaming.cache_length == 0 {
        return Err(ConfigError::ValidationError(
            "streaming.cache_length must be at least 1".to_string(),
        ));
    }

    Ok(())
}
