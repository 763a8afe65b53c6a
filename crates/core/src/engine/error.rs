//! Error types for the engine module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a backend media engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine binary not found.
    #[error("FFmpeg not found at path: {path}")]
    FfmpegNotFound { path: PathBuf },

    /// The launch string could not be turned into a runnable pipeline.
    #[error("Invalid launch string: {reason}")]
    InvalidLaunch { reason: String },

    /// A placeholder in the launch string has no value in the request.
    #[error("Launch string references missing request value: {placeholder}")]
    MissingPlaceholder { placeholder: String },

    /// The engine failed to start processing.
    #[error("Engine failed to start: {reason}")]
    StartFailed { reason: String },

    /// The named element does not exist in the pipeline.
    #[error("Unknown element: {element}")]
    UnknownElement { element: String },

    /// The property does not exist or cannot be written.
    #[error("Property {property} is not writable on element {element}")]
    PropertyNotWritable { element: String, property: String },

    /// Constructing a shared resource failed.
    #[error("Failed to create shared resource {identity}: {reason}")]
    SharedResourceFailed { identity: String, reason: String },

    /// Plugins cannot be attached to this pipeline.
    #[error("Plugin attach failed: {reason}")]
    AttachFailed { reason: String },

    /// play() was called twice.
    #[error("Pipeline already started")]
    AlreadyStarted,

    /// I/O error talking to the engine.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Creates a new start failed error.
    pub fn start_failed(reason: impl Into<String>) -> Self {
        Self::StartFailed {
            reason: reason.into(),
        }
    }

    /// Creates a new invalid launch error.
    pub fn invalid_launch(reason: impl Into<String>) -> Self {
        Self::InvalidLaunch {
            reason: reason.into(),
        }
    }

    /// Creates a new shared resource error.
    pub fn shared_resource_failed(identity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SharedResourceFailed {
            identity: identity.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::SharedResourceFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = EngineError::MissingPlaceholder {
            placeholder: "source[uri]".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Launch string references missing request value: source[uri]"
        );

        let err = EngineError::start_failed("no such device");
        assert_eq!(err.to_string(), "Engine failed to start: no such device");
    }

    #[test]
    fn test_retryable() {
        let io = EngineError::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(io.is_retryable());
        assert!(!EngineError::AlreadyStarted.is_retryable());
        assert!(!EngineError::invalid_launch("empty").is_retryable());
    }
}
