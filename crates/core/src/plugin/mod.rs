//! Application source and destination plugins.
//!
//! Requests name plugins by class: `source.class` for an `application`
//! source and `destination.<kind>.class` for an `application` destination.
//! A `webrtc` frame destination resolves to [`WebRtcDestination`] without
//! naming a class.
//!
//! # Example
//!
//! ```ignore
//! use pipeserve_core::plugin::PluginRegistry;
//!
//! let plugins = PluginRegistry::with_builtins();
//! let input = plugins.hub().open_input("camera-1");
//! let output = plugins.hub().open_output("detections");
//! ```
//!
//! [`WebRtcDestination`]: crate::streaming::WebRtcDestination

mod channel;
mod error;
mod registry;
mod traits;

pub use channel::{
    ChannelDestination, ChannelHub, ChannelSource, OutputItem, CHANNEL_DESTINATION,
    CHANNEL_SOURCE,
};
pub use error::PluginError;
pub use registry::PluginRegistry;
pub use traits::{
    AppDestination, AppSource, DestinationConstructor, PluginContext, SourceConstructor,
};
