//! Request model, defaulting and validation.
//!
//! # Example
//!
//! ```ignore
//! use pipeserve_core::request::{prepare_request, PipelineRequest};
//!
//! let request = PipelineRequest::from_value(json!({
//!     "source": {"type": "uri", "uri": "file:///a.mp4"}
//! }))?;
//! let prepared = prepare_request(&template, &request)?;
//! ```

mod defaults;
mod error;
mod schema;
mod types;
mod validate;

pub use defaults::apply_defaults;
pub use error::RequestError;
pub use schema::validate as validate_schema;
pub use types::PipelineRequest;
pub use validate::{prepare_request, validate_request};
