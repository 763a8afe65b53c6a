//! Mock media engine for testing.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

use crate::engine::{
    ElementProperties, EngineError, EngineEvent, EngineEventSink, EngineHandle, Frame,
    FrameInput, LaunchSpec, MediaEngine, OpaqueResource, SharedHandle, SourceItem,
};
use crate::plugin::{AppDestination, AppSource};
use crate::streaming::StreamPipelineFactory;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock implementation of the MediaEngine trait.
///
/// Provides controllable behavior for testing:
/// - Record launches, property writes and stop requests
/// - Drive lifecycle events per instance (`complete`, `fail`, `emit`)
/// - Simulate launch and shared resource failures
/// - Push frames through attached destinations
///
/// By default `play` reports `Running` right away and `stop` is acknowledged
/// with `Aborted`.
///
/// # Example
///
/// ```rust,ignore
/// use pipeserve_core::testing::MockEngine;
///
/// let engine = Arc::new(MockEngine::new().with_element("detect", &["model-instance-id"]));
/// let id = manager.create_instance("detect", "1", request).await?;
///
/// engine.complete(&id);
/// assert_eq!(engine.launch_count(), 1);
/// ```
pub struct MockEngine {
    name: String,
    auto_start: AtomicBool,
    ack_stop: AtomicBool,
    app_source: AtomicBool,
    app_sink: AtomicBool,
    elements: Mutex<HashMap<String, Vec<String>>>,
    launches: Mutex<Vec<LaunchSpec>>,
    handles: Mutex<HashMap<String, Arc<MockHandle>>>,
    next_error: Mutex<Option<EngineError>>,
    shared_created: Mutex<Vec<String>>,
    failing_identities: Mutex<Vec<String>>,
    stream_factory: Mutex<Option<Arc<dyn StreamPipelineFactory>>>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Create a new mock engine named "mock".
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            auto_start: AtomicBool::new(true),
            ack_stop: AtomicBool::new(true),
            app_source: AtomicBool::new(false),
            app_sink: AtomicBool::new(false),
            elements: Mutex::new(HashMap::new()),
            launches: Mutex::new(Vec::new()),
            handles: Mutex::new(HashMap::new()),
            next_error: Mutex::new(None),
            shared_created: Mutex::new(Vec::new()),
            failing_identities: Mutex::new(Vec::new()),
            stream_factory: Mutex::new(None),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Declares an element and its writable properties on every pipeline.
    pub fn with_element(self, element: &str, properties: &[&str]) -> Self {
        lock(&self.elements).insert(
            element.to_string(),
            properties.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    /// Pipelines expose an application source input.
    pub fn with_app_source(self) -> Self {
        self.app_source.store(true, Ordering::SeqCst);
        self
    }

    /// Pipelines end in an application sink.
    pub fn with_app_sink(self) -> Self {
        self.app_sink.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_stream_factory(self, factory: Arc<dyn StreamPipelineFactory>) -> Self {
        *lock(&self.stream_factory) = Some(factory);
        self
    }

    /// Whether `play` reports `Running` immediately.
    pub fn set_auto_start(&self, enabled: bool) {
        self.auto_start.store(enabled, Ordering::SeqCst);
    }

    /// Whether `stop` is acknowledged with `Aborted`.
    pub fn set_stop_ack(&self, enabled: bool) {
        self.ack_stop.store(enabled, Ordering::SeqCst);
    }

    /// The next launch fails with `error`.
    pub fn set_next_error(&self, error: EngineError) {
        *lock(&self.next_error) = Some(error);
    }

    /// Creating the shared resource `identity` fails.
    pub fn fail_shared_resource(&self, identity: impl Into<String>) {
        lock(&self.failing_identities).push(identity.into());
    }

    pub fn launches(&self) -> Vec<LaunchSpec> {
        lock(&self.launches).clone()
    }

    pub fn launch_count(&self) -> usize {
        lock(&self.launches).len()
    }

    /// Launched instance ids in launch order.
    pub fn launched_ids(&self) -> Vec<String> {
        lock(&self.launches)
            .iter()
            .map(|spec| spec.instance_id.clone())
            .collect()
    }

    /// Identities passed to `create_shared_resource` that succeeded.
    pub fn shared_resources_created(&self) -> Vec<String> {
        lock(&self.shared_created).clone()
    }

    pub fn handle(&self, instance_id: &str) -> Option<Arc<MockHandle>> {
        lock(&self.handles).get(instance_id).cloned()
    }

    /// Emits an arbitrary event for `instance_id`.
    pub fn emit(&self, instance_id: &str, event: EngineEvent) -> bool {
        match self.handle(instance_id) {
            Some(handle) => {
                handle.events.emit(event);
                true
            }
            None => false,
        }
    }

    /// Reports `Running`.
    pub fn start(&self, instance_id: &str) -> bool {
        self.emit(instance_id, EngineEvent::Running)
    }

    /// Reports natural end of stream.
    pub fn complete(&self, instance_id: &str) -> bool {
        self.emit(instance_id, EngineEvent::Completed)
    }

    /// Reports an engine fault.
    pub fn fail(&self, instance_id: &str, detail: impl Into<String>) -> bool {
        self.emit(
            instance_id,
            EngineEvent::Error {
                detail: detail.into(),
            },
        )
    }

    /// Acknowledges a pending stop request.
    pub fn acknowledge_stop(&self, instance_id: &str) -> bool {
        self.emit(instance_id, EngineEvent::Aborted)
    }

    pub fn stop_count(&self, instance_id: &str) -> usize {
        self.handle(instance_id)
            .map(|handle| handle.stop_count())
            .unwrap_or(0)
    }

    /// Hands `frames` to every destination attached to `instance_id`.
    pub fn push_frames(&self, instance_id: &str, frames: Vec<Frame>) -> bool {
        let Some(handle) = self.handle(instance_id) else {
            return false;
        };
        let destinations = lock(&handle.destinations).clone();
        for frame in &frames {
            for destination in &destinations {
                let _ = destination.process_frame(frame);
            }
        }
        handle.events.emit(EngineEvent::Progress {
            frames: handle.frames_pushed.fetch_add(frames.len(), Ordering::SeqCst) as u64
                + frames.len() as u64,
        });
        true
    }
}

#[async_trait]
impl MediaEngine for MockEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn launch(
        &self,
        spec: LaunchSpec,
        events: EngineEventSink,
    ) -> Result<Arc<dyn EngineHandle>, EngineError> {
        if let Some(error) = lock(&self.next_error).take() {
            return Err(error);
        }
        lock(&self.launches).push(spec.clone());

        let (input, input_rx) = if self.app_source.load(Ordering::SeqCst) {
            let (input, rx) = FrameInput::channel();
            (Some(input), Some(rx))
        } else {
            (None, None)
        };
        let handle = Arc::new(MockHandle {
            launch: spec.launch.clone(),
            events,
            auto_start: self.auto_start.load(Ordering::SeqCst),
            ack_stop: self.ack_stop.load(Ordering::SeqCst),
            app_sink: self.app_sink.load(Ordering::SeqCst),
            elements: lock(&self.elements).clone(),
            properties: Mutex::new(HashMap::new()),
            input,
            input_rx: Mutex::new(input_rx),
            source: Mutex::new(None),
            destinations: Mutex::new(Vec::new()),
            played: AtomicBool::new(false),
            stops: AtomicUsize::new(0),
            frames_pushed: AtomicUsize::new(0),
        });
        lock(&self.handles).insert(spec.instance_id.clone(), Arc::clone(&handle));
        Ok(handle)
    }

    async fn create_shared_resource(&self, identity: &str) -> Result<SharedHandle, EngineError> {
        if lock(&self.failing_identities).iter().any(|id| id == identity) {
            return Err(EngineError::shared_resource_failed(identity, "mock failure"));
        }
        lock(&self.shared_created).push(identity.to_string());
        Ok(Arc::new(OpaqueResource::new(identity)))
    }

    fn stream_pipeline_factory(&self) -> Option<Arc<dyn StreamPipelineFactory>> {
        lock(&self.stream_factory).clone()
    }
}

/// Pipeline handle created by [`MockEngine`].
pub struct MockHandle {
    launch: String,
    events: EngineEventSink,
    auto_start: bool,
    ack_stop: bool,
    app_sink: bool,
    elements: HashMap<String, Vec<String>>,
    properties: Mutex<HashMap<(String, String), Value>>,
    input: Option<FrameInput>,
    input_rx: Mutex<Option<mpsc::UnboundedReceiver<SourceItem>>>,
    source: Mutex<Option<Arc<dyn AppSource>>>,
    destinations: Mutex<Vec<Arc<dyn AppDestination>>>,
    played: AtomicBool,
    stops: AtomicUsize,
    frames_pushed: AtomicUsize,
}

impl MockHandle {
    pub fn played(&self) -> bool {
        self.played.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn destination_names(&self) -> Vec<String> {
        lock(&self.destinations)
            .iter()
            .map(|d| d.name().to_string())
            .collect()
    }

    pub fn source_name(&self) -> Option<String> {
        lock(&self.source).as_ref().map(|s| s.name().to_string())
    }

    /// Asks the attached source for frames.
    pub fn request_frames(&self) {
        if let Some(source) = lock(&self.source).as_ref() {
            source.start_frames();
        }
    }

    /// Tells the attached source to hold frames back.
    pub fn pause_frames(&self) {
        if let Some(source) = lock(&self.source).as_ref() {
            source.pause_frames();
        }
    }

    /// Receiver of items the source pushed into the pipeline. Taken once.
    pub fn take_source_items(&self) -> Option<mpsc::UnboundedReceiver<SourceItem>> {
        lock(&self.input_rx).take()
    }
}

impl ElementProperties for MockHandle {
    fn list_writable_properties(&self, element: &str) -> Option<Vec<String>> {
        self.elements.get(element).cloned()
    }

    fn set_property(&self, element: &str, property: &str, value: &Value) -> Result<(), EngineError> {
        let writable = self
            .elements
            .get(element)
            .ok_or_else(|| EngineError::UnknownElement {
                element: element.to_string(),
            })?;
        if !writable.iter().any(|p| p == property) {
            return Err(EngineError::PropertyNotWritable {
                element: element.to_string(),
                property: property.to_string(),
            });
        }
        lock(&self.properties).insert((element.to_string(), property.to_string()), value.clone());
        Ok(())
    }

    fn get_property(&self, element: &str, property: &str) -> Option<Value> {
        lock(&self.properties)
            .get(&(element.to_string(), property.to_string()))
            .cloned()
    }
}

#[async_trait]
impl EngineHandle for MockHandle {
    fn launch_command(&self) -> String {
        self.launch.clone()
    }

    fn app_source_input(&self) -> Option<FrameInput> {
        self.input.clone()
    }

    fn has_app_sink(&self) -> bool {
        self.app_sink
    }

    fn attach_plugins(
        &self,
        source: Option<Arc<dyn AppSource>>,
        destinations: Vec<Arc<dyn AppDestination>>,
    ) -> Result<(), EngineError> {
        *lock(&self.source) = source;
        *lock(&self.destinations) = destinations;
        Ok(())
    }

    async fn play(&self) -> Result<(), EngineError> {
        if self.played.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyStarted);
        }
        if self.auto_start {
            self.events.emit(EngineEvent::Running);
        }
        Ok(())
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.ack_stop {
            self.events.emit(EngineEvent::Aborted);
        }
    }
}
