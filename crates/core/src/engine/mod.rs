//! Backend media engine contract.
//!
//! The manager never touches media itself. It renders a launch string,
//! hands it to a [`MediaEngine`], writes request-derived properties through
//! [`ElementProperties`] and then only observes [`EngineEvent`]s.
//!
//! # Example
//!
//! ```ignore
//! use pipeserve_core::engine::{FfmpegEngine, MediaEngine, LaunchSpec, EngineEventSink};
//!
//! let engine = FfmpegEngine::with_defaults();
//! engine.validate().await?;
//!
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let handle = engine.launch(spec, EngineEventSink::new("job-1", tx)).await?;
//! handle.set_property("scale", "w", &json!(1280))?;
//! handle.play().await?;
//!
//! while let Some((id, event)) = rx.recv().await {
//!     println!("{}: {:?}", id, event);
//! }
//! ```

mod config;
mod error;
mod ffmpeg;
mod launch;
mod traits;
mod types;

pub use config::FfmpegConfig;
pub use error::EngineError;
pub use ffmpeg::{FfmpegEngine, FfmpegHandle};
pub use launch::{render_launch, render_launch_args, split_args};
pub use traits::{ElementProperties, EngineHandle, MediaEngine};
pub use types::{
    EngineEvent, EngineEventSink, Frame, FrameInput, LaunchSpec, OpaqueResource, SharedHandle,
    SharedResource, SourceItem,
};
