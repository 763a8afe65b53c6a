//! Pipeline manager.
//!
//! This module provides the `PipelineManager` which coordinates:
//! - Admission: FIFO run queue under a configurable ceiling
//! - Engine start: launch rendering, shared resources, property binding, plugins
//! - Lifecycle: engine events applied to each instance's state machine
//! - Teardown: engine, plugins and shared resources released on the terminal state
//!
//! # Example
//!
//! ```ignore
//! use pipeserve_core::manager::{ManagerConfig, PipelineManager};
//! use pipeserve_core::plugin::PluginRegistry;
//!
//! let manager = PipelineManager::new(
//!     ManagerConfig::default().with_max_running(2),
//!     templates,
//!     vec![Arc::new(FfmpegEngine::with_defaults())],
//!     Arc::new(PluginRegistry::with_builtins()),
//!     None,
//! );
//!
//! let id = manager.create_instance("detect", "1", request).await?;
//! let status = manager.get_status(&id).await?;
//! println!("{}: {}", id, status.state);
//!
//! manager.stop(&id).await?;
//! ```

mod binding;
mod config;
mod error;
mod manager;
mod types;

pub use binding::{
    apply_properties, resolve_bindings, shared_identities, PropertyWrite,
    SHARED_IDENTITY_PROPERTY,
};
pub use config::ManagerConfig;
pub use error::{ErrorKind, ManagerError, StartError};
pub use manager::PipelineManager;
pub use types::PoolStatus;
