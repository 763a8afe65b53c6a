//! Error types for the pipeline manager.

use serde::Serialize;
use thiserror::Error;

use crate::engine::EngineError;
use crate::plugin::PluginError;
use crate::request::RequestError;

/// Who caused a control surface error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Client,
    Server,
}

/// Errors returned synchronously by manager operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Pipeline {name} version {version} not found")]
    UnknownTemplate { name: String, version: String },

    #[error("Instance {0} not found")]
    InstanceNotFound(String),

    /// The request failed validation. Names the offending section.
    #[error(transparent)]
    InvalidRequest(#[from] RequestError),

    #[error("Pipeline manager is shutting down")]
    ShuttingDown,
}

impl ManagerError {
    pub fn unknown_template(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::UnknownTemplate {
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ShuttingDown => ErrorKind::Server,
            _ => ErrorKind::Client,
        }
    }

    /// Whether the error refers to something that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UnknownTemplate { .. } | Self::InstanceNotFound(_))
    }
}

/// Failure while starting an admitted instance. Becomes the instance's
/// ERROR detail; never returned to the creator.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("No engine registered for type '{0}'")]
    UnknownEngine(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Unsupported source: {0}")]
    UnsupportedSource(PluginError),

    #[error("Unsupported destination: {0}")]
    UnsupportedDestination(PluginError),
}
