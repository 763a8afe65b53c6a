//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the engine and streaming
//! traits, allowing the manager to be exercised end to end without ffmpeg
//! or a signaling server.
//!
//! # Example
//!
//! ```rust,ignore
//! use pipeserve_core::testing::{fixtures, MockEngine};
//!
//! let engine = Arc::new(fixtures::detect_engine());
//! let manager = PipelineManager::new(
//!     ManagerConfig::default(),
//!     fixtures::registry(vec![fixtures::detect_template()]),
//!     vec![engine.clone()],
//!     Arc::new(PluginRegistry::with_builtins()),
//!     None,
//! );
//!
//! let id = manager.create_instance("detect", "1", fixtures::uri_request("file:///a.mp4")).await?;
//! engine.complete(&id);
//! ```

mod mock_engine;
mod mock_streaming;

pub use mock_engine::{MockEngine, MockHandle};
pub use mock_streaming::{
    EventLog, MockSignalingConnector, MockStreamPipelineFactory, PipelineEvent,
};

/// Test fixtures and helper functions.
pub mod fixtures {
    use serde_json::{json, Value};
    use std::sync::Arc;

    use super::MockEngine;
    use crate::request::PipelineRequest;
    use crate::template::{Template, TemplateRegistry};

    /// Engine type used by every fixture template.
    pub const MOCK_ENGINE: &str = "mock";

    /// Detection template whose `model` parameter names a shared model instance.
    pub fn detect_template() -> Template {
        Template::new(
            "detect",
            "1",
            MOCK_ENGINE,
            "{source[uri]} ! detect name=detect threshold={parameters[threshold]} ! sink",
        )
        .with_description("Object detection")
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "model": {
                    "type": "string",
                    "default": "person",
                    "element": {"name": "detect", "property": "model-instance-id"}
                },
                "threshold": {
                    "type": "number",
                    "minimum": 0,
                    "maximum": 1,
                    "default": 0.5,
                    "element": "detect"
                },
                "labels": {
                    "type": "array",
                    "items": {"type": "string"},
                    "element": {"name": "detect", "format": "json"}
                }
            }
        }))
    }

    /// Template with no parameters and no shared resources.
    pub fn passthrough_template() -> Template {
        Template::new("passthrough", "1", MOCK_ENGINE, "passthrough")
            .with_description("Frames in, frames out")
    }

    /// Mock engine exposing the elements of [`detect_template`].
    pub fn detect_engine() -> MockEngine {
        MockEngine::new().with_element("detect", &["model-instance-id", "threshold", "labels"])
    }

    pub fn registry(templates: Vec<Template>) -> Arc<TemplateRegistry> {
        let mut registry = TemplateRegistry::new();
        for template in templates {
            registry.insert(template);
        }
        Arc::new(registry)
    }

    pub fn uri_request(uri: &str) -> PipelineRequest {
        PipelineRequest::new().with_source(json!({"type": "uri", "uri": uri}))
    }

    /// Request reading from the hub input `input` and writing to the hub output `output`.
    pub fn channel_request(input: &str, output: &str) -> PipelineRequest {
        PipelineRequest::new()
            .with_source(json!({"type": "application", "class": "ChannelSource", "input": input}))
            .with_destination(json!({
                "metadata": {"type": "application", "class": "ChannelDestination", "output": output}
            }))
    }

    /// Request streaming frames to `peer`.
    pub fn webrtc_request(uri: &str, peer: &str) -> PipelineRequest {
        uri_request(uri).with_destination(json!({
            "frame": {"type": "webrtc", "peer-id": peer}
        }))
    }

    pub fn with_model(request: PipelineRequest, model: &str) -> PipelineRequest {
        request.with_parameter("model", Value::from(model))
    }
}
