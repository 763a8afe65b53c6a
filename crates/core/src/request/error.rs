//! Error types for request validation.

use thiserror::Error;

/// Admission-time request errors, each naming the offending section.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("Request must be a JSON object")]
    NotAnObject,

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    #[error("Invalid tags: {0}")]
    InvalidTags(String),
}

impl RequestError {
    /// Request section the error refers to.
    pub fn section(&self) -> &'static str {
        match self {
            Self::NotAnObject => "request",
            Self::InvalidParameters(_) => "parameters",
            Self::InvalidSource(_) => "source",
            Self::InvalidDestination(_) => "destination",
            Self::InvalidTags(_) => "tags",
        }
    }
}
