//! Pipeline templates.
//!
//! A template is a named, versioned launch string plus JSON-schema-like
//! descriptions of the request sections it accepts. Templates are loaded
//! once at startup and are read-only afterwards.
//!
//! # Example
//!
//! ```ignore
//! use pipeserve_core::template::TemplateRegistry;
//!
//! let report = TemplateRegistry::load(Path::new("/opt/pipelines"), &["FFmpeg"])?;
//! for warning in &report.warnings {
//!     eprintln!("skipped: {}", warning);
//! }
//! let detect = report.registry.get("detect", "1").expect("template");
//! println!("{}", detect.launch);
//! ```

mod error;
mod registry;
mod schemas;
mod types;

pub use error::TemplateError;
pub use registry::{LoadReport, TemplateRegistry};
pub use schemas::{
    default_destination_schema, default_parameters_schema, default_source_schema,
    default_tags_schema,
};
pub use types::{BindingSection, ElementBinding, SectionBinding, Template, TemplateSummary};
