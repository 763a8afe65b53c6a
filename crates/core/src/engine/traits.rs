//! Trait definitions for the engine module.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::error::EngineError;
use super::types::{EngineEventSink, FrameInput, LaunchSpec, OpaqueResource, SharedHandle};
use crate::plugin::{AppDestination, AppSource};
use crate::streaming::StreamPipelineFactory;

/// Property access on the named elements of a constructed pipeline.
pub trait ElementProperties: Send + Sync {
    /// Writable property names of `element`, or `None` if there is no such element.
    fn list_writable_properties(&self, element: &str) -> Option<Vec<String>>;

    /// Sets a property on an element.
    fn set_property(&self, element: &str, property: &str, value: &Value)
        -> Result<(), EngineError>;

    /// Reads a property from an element.
    fn get_property(&self, element: &str, property: &str) -> Option<Value>;
}

/// A constructed pipeline owned by exactly one instance.
///
/// Lifecycle changes are reported through the [`EngineEventSink`] passed to
/// [`MediaEngine::launch`], never through return values.
#[async_trait]
pub trait EngineHandle: ElementProperties {
    /// Command or description of the constructed pipeline.
    fn launch_command(&self) -> String;

    /// Input of the pipeline's application source, if it has one.
    fn app_source_input(&self) -> Option<FrameInput> {
        None
    }

    /// Whether the pipeline ends in an application sink.
    fn has_app_sink(&self) -> bool {
        false
    }

    /// Wires plugins into the pipeline. Called once, before [`EngineHandle::play`].
    fn attach_plugins(
        &self,
        source: Option<Arc<dyn AppSource>>,
        destinations: Vec<Arc<dyn AppDestination>>,
    ) -> Result<(), EngineError>;

    /// Starts processing. `Running` is emitted once frames actually flow.
    async fn play(&self) -> Result<(), EngineError>;

    /// Requests shutdown. `Aborted` is emitted when the engine honors it.
    async fn stop(&self);
}

/// A backend media engine able to construct pipelines from launch strings.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Engine type name, matched against a template's `type`.
    fn name(&self) -> &str;

    /// Constructs a pipeline without starting it.
    async fn launch(
        &self,
        spec: LaunchSpec,
        events: EngineEventSink,
    ) -> Result<Arc<dyn EngineHandle>, EngineError>;

    /// Constructs a resource shared by every instance using `identity`.
    async fn create_shared_resource(&self, identity: &str) -> Result<SharedHandle, EngineError> {
        Ok(Arc::new(OpaqueResource::new(identity)))
    }

    /// Checks that the engine is usable.
    async fn validate(&self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Builder for per-peer streaming pipelines, if the engine supports them.
    fn stream_pipeline_factory(&self) -> Option<Arc<dyn StreamPipelineFactory>> {
        None
    }
}
