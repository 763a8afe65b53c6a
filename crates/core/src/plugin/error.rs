//! Error types for the plugin module.

use thiserror::Error;

/// Errors raised while resolving or running a source/destination plugin.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PluginError {
    /// No plugin registered under this class name.
    #[error("No {kind} plugin registered as '{class}'")]
    UnknownClass { kind: &'static str, class: String },

    /// The plugin does not support the engine running the instance.
    #[error("{kind} plugin '{class}' does not support engine '{engine}'")]
    IncompatibleEngine {
        kind: &'static str,
        class: String,
        engine: String,
    },

    /// The section names no class.
    #[error("{kind} section has no 'class'")]
    MissingClass { kind: &'static str },

    /// Construction failed.
    #[error("Failed to construct {class}: {reason}")]
    Construction { class: String, reason: String },

    /// The consumer on the other end went away.
    #[error("Channel '{0}' is closed")]
    ChannelClosed(String),
}

impl PluginError {
    pub fn construction(class: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Construction {
            class: class.into(),
            reason: reason.into(),
        }
    }
}
