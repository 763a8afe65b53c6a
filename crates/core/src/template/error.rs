//! Error types for the template module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop the registry from loading at all.
///
/// Problems with individual templates are reported as warnings instead.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The template root cannot be read.
    #[error("Pipeline directory {path} is not readable: {reason}")]
    DirectoryUnreadable { path: PathBuf, reason: String },
}
