//! Pipeline manager: admission, lifecycle and teardown of instances.

use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use super::binding::{apply_properties, resolve_bindings, shared_identities};
use super::config::ManagerConfig;
use super::error::{ManagerError, StartError};
use super::types::PoolStatus;
use crate::cache::SharedResourceCache;
use crate::engine::{
    render_launch, render_launch_args, EngineEvent, EngineEventSink, EngineHandle, LaunchSpec,
    MediaEngine, SharedHandle,
};
use crate::job::{JobParameters, JobState, JobStateMachine, JobStatus, Transition, TransitionOutcome};
use crate::metrics;
use crate::plugin::{AppDestination, AppSource, PluginContext, PluginError, PluginRegistry};
use crate::request::{prepare_request, PipelineRequest};
use crate::streaming::{StreamingSessionManager, WEBRTC_DESTINATION};
use crate::template::{Template, TemplateRegistry, TemplateSummary};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

type Plugins = (Option<Arc<dyn AppSource>>, Vec<Arc<dyn AppDestination>>);

/// Everything an instance holds while it runs. Released once, on the
/// terminal transition.
#[derive(Default)]
struct Runtime {
    engine: Option<Arc<dyn EngineHandle>>,
    source: Option<Arc<dyn AppSource>>,
    destinations: Vec<Arc<dyn AppDestination>>,
    identities: Vec<String>,
    /// The engine constructed a pipeline using the identities.
    launched: bool,
    stop_requested: bool,
    launch_command: Option<String>,
    torn_down: bool,
}

struct JobInstance {
    id: String,
    seq: u64,
    template: Arc<Template>,
    /// Private copy, defaulted and validated at admission.
    request: PipelineRequest,
    machine: Mutex<JobStateMachine>,
    /// Holds a run slot.
    admitted: AtomicBool,
    runtime: tokio::sync::Mutex<Runtime>,
}

impl JobInstance {
    fn status(&self) -> JobStatus {
        lock(&self.machine).status(&self.id, Utc::now())
    }

    fn state(&self) -> JobState {
        lock(&self.machine).state()
    }
}

#[derive(Default)]
struct Admission {
    queue: VecDeque<Arc<JobInstance>>,
    running: usize,
}

/// Owns every pipeline instance.
///
/// Admission is FIFO under a ceiling. Engine lifecycle events are applied
/// by a single consumer task; the terminal transition releases the
/// instance's engine, plugins and shared resources and frees its run slot.
pub struct PipelineManager {
    config: ManagerConfig,
    templates: Arc<TemplateRegistry>,
    engines: HashMap<String, Arc<dyn MediaEngine>>,
    plugins: Arc<PluginRegistry>,
    streaming: Option<Arc<StreamingSessionManager>>,
    cache: SharedResourceCache<SharedHandle>,
    instances: RwLock<HashMap<String, Arc<JobInstance>>>,
    admission: Mutex<Admission>,
    events: mpsc::UnboundedSender<(String, EngineEvent)>,
    next_seq: AtomicU64,
    shutting_down: AtomicBool,
    me: Weak<PipelineManager>,
}

impl PipelineManager {
    /// Creates the manager and its event consumer. Must be called within a
    /// Tokio runtime.
    pub fn new(
        config: ManagerConfig,
        templates: Arc<TemplateRegistry>,
        engines: Vec<Arc<dyn MediaEngine>>,
        plugins: Arc<PluginRegistry>,
        streaming: Option<Arc<StreamingSessionManager>>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let engines = engines
            .into_iter()
            .map(|engine| (engine.name().to_string(), engine))
            .collect();

        let manager = Arc::new_cyclic(|me| Self {
            config,
            templates,
            engines,
            plugins,
            streaming,
            cache: SharedResourceCache::new(),
            instances: RwLock::new(HashMap::new()),
            admission: Mutex::new(Admission::default()),
            events: tx,
            next_seq: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
            me: me.clone(),
        });
        tokio::spawn(consume_events(Arc::downgrade(&manager), rx));
        manager
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Engine type names available to templates.
    pub fn engine_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn list_templates(&self) -> Vec<TemplateSummary> {
        self.templates.summaries()
    }

    pub fn get_template(&self, name: &str, version: &str) -> Result<TemplateSummary, ManagerError> {
        self.templates
            .get(name, version)
            .map(|t| t.summary())
            .ok_or_else(|| ManagerError::unknown_template(name, version))
    }

    // =========================================================================
    // Control surface
    // =========================================================================

    /// Validates the request and queues a new instance. Returns its id
    /// without waiting for it to start.
    pub async fn create_instance(
        &self,
        name: &str,
        version: &str,
        request: PipelineRequest,
    ) -> Result<String, ManagerError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(ManagerError::ShuttingDown);
        }
        let template = self
            .templates
            .get(name, version)
            .ok_or_else(|| ManagerError::unknown_template(name, version))?;
        let request = prepare_request(&template, &request)?;

        let id = uuid::Uuid::new_v4().simple().to_string();
        let instance = Arc::new(JobInstance {
            id: id.clone(),
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            template: Arc::clone(&template),
            request,
            machine: Mutex::new(JobStateMachine::new(Utc::now())),
            admitted: AtomicBool::new(false),
            runtime: tokio::sync::Mutex::new(Runtime::default()),
        });

        self.instances
            .write()
            .await
            .insert(id.clone(), Arc::clone(&instance));
        {
            let mut admission = lock(&self.admission);
            admission.queue.push_back(instance);
            metrics::JOBS_QUEUED.set(admission.queue.len() as i64);
        }
        metrics::JOBS_CREATED.with_label_values(&[name]).inc();
        info!("Created instance {} of {} version {}", id, name, version);

        self.admit();
        Ok(id)
    }

    pub async fn get_status(&self, id: &str) -> Result<JobStatus, ManagerError> {
        Ok(self.instance(id).await?.status())
    }

    pub async fn get_parameters(&self, id: &str) -> Result<JobParameters, ManagerError> {
        let instance = self.instance(id).await?;
        let launch_command = instance.runtime.lock().await.launch_command.clone();
        Ok(JobParameters {
            id: instance.id.clone(),
            name: instance.template.name.clone(),
            version: instance.template.version.clone(),
            engine_type: instance.template.engine_type.clone(),
            request: instance.request.to_value(),
            launch_command,
        })
    }

    /// Status of every instance in creation order.
    pub async fn list_all(&self) -> Vec<JobStatus> {
        let mut instances: Vec<Arc<JobInstance>> =
            self.instances.read().await.values().cloned().collect();
        instances.sort_by_key(|i| i.seq);
        instances.iter().map(|i| i.status()).collect()
    }

    /// Stops an instance.
    ///
    /// A queued instance is aborted on the spot. A started one gets a stop
    /// request and is aborted once its engine acknowledges. Repeated calls
    /// are no-ops.
    pub async fn stop(&self, id: &str) -> Result<JobStatus, ManagerError> {
        let instance = self.instance(id).await?;
        if instance.state().stopped() {
            return Ok(instance.status());
        }

        let dequeued = {
            let mut admission = lock(&self.admission);
            let position = admission.queue.iter().position(|queued| queued.id == id);
            let dequeued = position.and_then(|p| admission.queue.remove(p));
            metrics::JOBS_QUEUED.set(admission.queue.len() as i64);
            dequeued
        };
        if dequeued.is_some() {
            let outcome = lock(&instance.machine).apply(Transition::Aborted, Utc::now());
            info!("Instance {} aborted before start", id);
            if let Some(state) = outcome.terminal() {
                self.teardown(&instance, state).await;
            }
            return Ok(instance.status());
        }

        self.request_stop(&instance).await;
        Ok(instance.status())
    }

    /// Asks the engine of a started instance to stop. If the engine is not
    /// up yet the request is delivered as soon as it is.
    async fn request_stop(&self, instance: &JobInstance) {
        let handle = {
            let mut runtime = instance.runtime.lock().await;
            if runtime.stop_requested || runtime.torn_down {
                return;
            }
            runtime.stop_requested = true;
            runtime.engine.clone()
        };
        info!("Stop requested for instance {}", instance.id);
        if let Some(handle) = handle {
            tokio::spawn(async move { handle.stop().await });
        }
    }

    pub async fn pool_status(&self) -> PoolStatus {
        let instances = self.instances.read().await.len();
        let admission = lock(&self.admission);
        PoolStatus {
            max_running: self.config.max_running(),
            running: admission.running,
            queued: admission.queue.len(),
            instances,
        }
    }

    /// Rejects new instances, stops every live one and waits up to `grace`
    /// for their engines to acknowledge. Streaming sessions are closed last.
    pub async fn shutdown(&self, grace: Duration) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let ids: Vec<String> = self.instances.read().await.keys().cloned().collect();
        info!("Shutting down pipeline manager ({} instances)", ids.len());
        for id in &ids {
            let _ = self.stop(id).await;
        }

        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let live = self
                .instances
                .read()
                .await
                .values()
                .filter(|i| !i.state().stopped())
                .count();
            if live == 0 {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!("{} instances did not acknowledge stop", live);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        if let Some(streaming) = &self.streaming {
            streaming.shutdown().await;
        }
    }

    async fn instance(&self, id: &str) -> Result<Arc<JobInstance>, ManagerError> {
        self.instances
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ManagerError::InstanceNotFound(id.to_string()))
    }

    // =========================================================================
    // Admission
    // =========================================================================

    /// Starts queued instances while run slots are free.
    fn admit(&self) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        let Some(manager) = self.me.upgrade() else {
            return;
        };
        let ceiling = self.config.max_running();
        loop {
            let instance = {
                let mut admission = lock(&self.admission);
                if ceiling.is_some_and(|max| admission.running >= max) {
                    break;
                }
                let Some(instance) = admission.queue.pop_front() else {
                    break;
                };
                admission.running += 1;
                instance.admitted.store(true, Ordering::SeqCst);
                metrics::JOBS_RUNNING.set(admission.running as i64);
                metrics::JOBS_QUEUED.set(admission.queue.len() as i64);
                instance
            };
            debug!("Admitted instance {}", instance.id);
            tokio::spawn(Arc::clone(&manager).start_instance(instance));
        }
    }

    fn release_slot(&self) {
        let mut admission = lock(&self.admission);
        admission.running = admission.running.saturating_sub(1);
        metrics::JOBS_RUNNING.set(admission.running as i64);
    }

    // =========================================================================
    // Engine start
    // =========================================================================

    async fn start_instance(self: Arc<Self>, instance: Arc<JobInstance>) {
        if let Err(e) = self.launch_instance(&instance).await {
            warn!("Instance {} failed to start: {}", instance.id, e);
            let _ = self.events.send((
                instance.id.clone(),
                EngineEvent::Error {
                    detail: e.to_string(),
                },
            ));
        }
    }

    async fn launch_instance(&self, instance: &Arc<JobInstance>) -> Result<(), StartError> {
        let template = &instance.template;
        let engine = self
            .engines
            .get(&template.engine_type)
            .cloned()
            .ok_or_else(|| StartError::UnknownEngine(template.engine_type.clone()))?;

        let request = instance.request.to_value();
        let launch = render_launch(&template.launch, &request)?;
        let args = render_launch_args(&template.launch, &request)?;
        let writes = resolve_bindings(template, &instance.request);

        let mut shared = Vec::new();
        for identity in shared_identities(&writes) {
            let handle = self
                .cache
                .acquire(&identity, &instance.id, || engine.create_shared_resource(&identity))
                .await?;
            instance.runtime.lock().await.identities.push(identity);
            shared.push(handle);
        }

        let spec = LaunchSpec {
            instance_id: instance.id.clone(),
            template: template.name.clone(),
            version: template.version.clone(),
            launch,
            args,
            shared,
        };
        let handle = engine
            .launch(spec, EngineEventSink::new(instance.id.clone(), self.events.clone()))
            .await?;
        apply_properties(handle.as_ref(), &writes, &instance.id);

        {
            let mut runtime = instance.runtime.lock().await;
            runtime.engine = Some(Arc::clone(&handle));
            runtime.launched = true;
            runtime.launch_command = Some(handle.launch_command());
            if runtime.stop_requested {
                // Stop arrived before there was an engine to deliver it to.
                drop(runtime);
                handle.stop().await;
                return Ok(());
            }
        }

        let (source, destinations) = self.build_plugins(instance, handle.as_ref())?;
        {
            let mut runtime = instance.runtime.lock().await;
            if runtime.torn_down {
                finish_plugins(source.as_ref(), &destinations);
                return Ok(());
            }
            runtime.source = source.clone();
            runtime.destinations = destinations.clone();
        }

        handle.attach_plugins(source, destinations)?;
        if instance.runtime.lock().await.stop_requested {
            return Ok(());
        }
        handle.play().await?;
        debug!("Engine playing for instance {}", instance.id);
        Ok(())
    }

    /// Constructs the application plugins the request names.
    fn build_plugins(
        &self,
        instance: &JobInstance,
        handle: &dyn EngineHandle,
    ) -> Result<Plugins, StartError> {
        let request = &instance.request;
        let engine_type = instance.template.engine_type.as_str();
        let hub = self.plugins.hub();
        let streaming = self.streaming.as_ref();

        let mut source = None;
        if let Some(section) = request.source() {
            if section_type(section) == Some("application") {
                let class = section
                    .get("class")
                    .and_then(Value::as_str)
                    .ok_or(StartError::UnsupportedSource(PluginError::MissingClass {
                        kind: "source",
                    }))?;
                let input = handle.app_source_input().ok_or_else(|| {
                    StartError::UnsupportedSource(PluginError::IncompatibleEngine {
                        kind: "source",
                        class: class.to_string(),
                        engine: engine_type.to_string(),
                    })
                })?;
                let ctx = PluginContext {
                    instance_id: &instance.id,
                    engine_type,
                    request,
                    section,
                    input: Some(input),
                    hub,
                    streaming,
                };
                source = Some(
                    self.plugins
                        .create_source(class, &ctx)
                        .map_err(StartError::UnsupportedSource)?,
                );
            }
        }

        let mut destinations: Vec<Arc<dyn AppDestination>> = Vec::new();
        let sections = request
            .destination()
            .and_then(Value::as_object)
            .map(|subs| subs.iter().collect::<Vec<_>>())
            .unwrap_or_default();
        for (_kind, section) in sections {
            let built = self.build_destination(instance, handle, section);
            match built {
                Ok(Some(destination)) => destinations.push(destination),
                Ok(None) => {}
                Err(e) => {
                    finish_plugins(source.as_ref(), &destinations);
                    return Err(e);
                }
            }
        }

        Ok((source, destinations))
    }

    fn build_destination(
        &self,
        instance: &JobInstance,
        handle: &dyn EngineHandle,
        section: &Value,
    ) -> Result<Option<Arc<dyn AppDestination>>, StartError> {
        let engine_type = instance.template.engine_type.as_str();
        let class = match section_type(section) {
            Some("application") => section.get("class").and_then(Value::as_str).ok_or(
                StartError::UnsupportedDestination(PluginError::MissingClass {
                    kind: "destination",
                }),
            )?,
            Some("webrtc") => WEBRTC_DESTINATION,
            // Handled by the engine through bindings.
            _ => return Ok(None),
        };
        if !handle.has_app_sink() {
            return Err(StartError::UnsupportedDestination(
                PluginError::IncompatibleEngine {
                    kind: "destination",
                    class: class.to_string(),
                    engine: engine_type.to_string(),
                },
            ));
        }
        let ctx = PluginContext {
            instance_id: &instance.id,
            engine_type,
            request: &instance.request,
            section,
            input: None,
            hub: self.plugins.hub(),
            streaming: self.streaming.as_ref(),
        };
        self.plugins
            .create_destination(class, &ctx)
            .map(Some)
            .map_err(StartError::UnsupportedDestination)
    }

    // =========================================================================
    // Lifecycle events
    // =========================================================================

    async fn handle_event(&self, id: &str, event: EngineEvent) {
        let Ok(instance) = self.instance(id).await else {
            debug!("Event for unknown instance {}: {:?}", id, event);
            return;
        };

        let outcome = {
            let mut machine = lock(&instance.machine);
            let now = Utc::now();
            match event {
                EngineEvent::Running => machine.apply(Transition::Started, now),
                EngineEvent::Progress { frames } => {
                    machine.record_frames(frames);
                    TransitionOutcome::Ignored
                }
                EngineEvent::Latency(latency) => {
                    machine.record_latency(latency);
                    TransitionOutcome::Ignored
                }
                EngineEvent::Completed => machine.apply(Transition::Completed, now),
                EngineEvent::Error { detail } => machine.apply(Transition::Failed(detail), now),
                EngineEvent::Aborted => machine.apply(Transition::Aborted, now),
            }
        };

        if let TransitionOutcome::Changed(from, to) = outcome {
            info!("Instance {} {} -> {}", id, from, to);
            if to.stopped() {
                self.teardown(&instance, to).await;
            }
        }
    }

    /// Releases everything the instance holds. Runs once per instance.
    async fn teardown(&self, instance: &Arc<JobInstance>, state: JobState) {
        let (engine, source, destinations, identities, launched) = {
            let mut runtime = instance.runtime.lock().await;
            if runtime.torn_down {
                return;
            }
            runtime.torn_down = true;
            (
                runtime.engine.take(),
                runtime.source.take(),
                std::mem::take(&mut runtime.destinations),
                std::mem::take(&mut runtime.identities),
                runtime.launched,
            )
        };
        drop(engine);
        finish_plugins(source.as_ref(), &destinations);

        if state == JobState::Error && launched {
            for identity in &identities {
                let others = self.cache.invalidate(identity, &instance.id).await;
                for other in others {
                    warn!(
                        "Stopping instance {}: shared resource {} faulted in {}",
                        other, identity, instance.id
                    );
                    metrics::CASCADE_ABORTS.inc();
                    if let Ok(other) = self.instance(&other).await {
                        self.request_stop(&other).await;
                    }
                }
            }
        } else {
            for identity in &identities {
                self.cache.release(identity, &instance.id).await;
            }
        }

        let status = instance.status();
        metrics::JOBS_FINISHED.with_label_values(&[state.as_str()]).inc();
        if let Some(elapsed) = status.elapsed_time {
            metrics::JOB_DURATION
                .with_label_values(&[state.as_str()])
                .observe(elapsed);
        }

        if instance.admitted.swap(false, Ordering::SeqCst) {
            self.release_slot();
        }
        self.admit();
    }
}

fn section_type(section: &Value) -> Option<&str> {
    section.get("type").and_then(Value::as_str)
}

fn finish_plugins(source: Option<&Arc<dyn AppSource>>, destinations: &[Arc<dyn AppDestination>]) {
    if let Some(source) = source {
        source.finish();
    }
    for destination in destinations {
        destination.finish();
    }
}

/// Applies engine events in arrival order until the manager is dropped.
async fn consume_events(
    manager: Weak<PipelineManager>,
    mut rx: mpsc::UnboundedReceiver<(String, EngineEvent)>,
) {
    while let Some((id, event)) = rx.recv().await {
        let Some(manager) = manager.upgrade() else {
            break;
        };
        manager.handle_event(&id, event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ElementProperties;
    use crate::request::RequestError;
    use crate::testing::{fixtures, MockEngine};
    use serde_json::json;

    async fn wait_for_state(manager: &PipelineManager, id: &str, state: JobState) -> JobStatus {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let status = manager.get_status(id).await.unwrap();
                if status.state == state {
                    return status;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("state not reached")
    }

    fn manager_with(engine: Arc<MockEngine>, max_running: i64) -> Arc<PipelineManager> {
        PipelineManager::new(
            ManagerConfig::default().with_max_running(max_running),
            fixtures::registry(vec![fixtures::detect_template(), fixtures::passthrough_template()]),
            vec![engine as Arc<dyn MediaEngine>],
            Arc::new(PluginRegistry::with_builtins()),
            None,
        )
    }

    #[tokio::test]
    async fn test_unknown_template() {
        let manager = manager_with(Arc::new(fixtures::detect_engine()), 1);
        let err = manager
            .create_instance("nope", "1", PipelineRequest::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::UnknownTemplate { .. }));
        assert!(manager.list_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_request_names_section() {
        let manager = manager_with(Arc::new(fixtures::detect_engine()), 1);
        let request = fixtures::uri_request("file:///a.mp4").with_parameter("threshold", json!(7));
        let err = manager.create_instance("detect", "1", request).await.unwrap_err();
        match err {
            ManagerError::InvalidRequest(RequestError::InvalidParameters(_)) => {}
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(manager.list_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_running_requires_engine_confirmation() {
        let engine = Arc::new(fixtures::detect_engine());
        engine.set_auto_start(false);
        let manager = manager_with(engine.clone(), 1);

        let id = manager
            .create_instance("detect", "1", fixtures::uri_request("file:///a.mp4"))
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while engine.handle(&id).map(|h| h.played()) != Some(true) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(manager.get_status(&id).await.unwrap().state, JobState::Queued);

        engine.start(&id);
        wait_for_state(&manager, &id, JobState::Running).await;
        engine.complete(&id);
        wait_for_state(&manager, &id, JobState::Completed).await;
    }

    #[tokio::test]
    async fn test_launch_rendered_and_properties_bound() {
        let engine = Arc::new(fixtures::detect_engine());
        let manager = manager_with(engine.clone(), 1);
        let request = fixtures::uri_request("file:///a.mp4")
            .with_parameter("labels", json!(["car", "bus"]));
        let id = manager.create_instance("detect", "1", request).await.unwrap();
        wait_for_state(&manager, &id, JobState::Running).await;

        let launches = engine.launches();
        assert_eq!(launches[0].launch, "file:///a.mp4 ! detect name=detect threshold=0.5 ! sink");
        assert_eq!(launches[0].shared.len(), 1);
        assert_eq!(launches[0].shared[0].identity(), "detect_person");

        let handle = engine.handle(&id).unwrap();
        assert_eq!(handle.get_property("detect", "threshold"), Some(json!(0.5)));
        assert_eq!(
            handle.get_property("detect", "labels"),
            Some(json!("[\"car\",\"bus\"]"))
        );

        let parameters = manager.get_parameters(&id).await.unwrap();
        assert_eq!(parameters.name, "detect");
        assert_eq!(parameters.request["parameters"]["model"], json!("person"));
        assert!(parameters.launch_command.is_some());
    }

    #[tokio::test]
    async fn test_request_values_fill_whole_arguments() {
        let engine = Arc::new(fixtures::detect_engine());
        let manager = manager_with(engine.clone(), 1);
        let uri = "file:///my clip.mp4 -y /tmp/other.mp4";
        let id = manager
            .create_instance("detect", "1", fixtures::uri_request(uri))
            .await
            .unwrap();
        wait_for_state(&manager, &id, JobState::Running).await;

        let launches = engine.launches();
        assert_eq!(launches[0].args[0], uri);
        assert_eq!(launches[0].args[1], "!");
        assert!(!launches[0].args.iter().any(|a| a == "-y"));
    }

    #[tokio::test]
    async fn test_start_error_surfaces_as_error_state() {
        let engine = Arc::new(fixtures::detect_engine());
        engine.set_next_error(crate::engine::EngineError::start_failed("no device"));
        let manager = manager_with(engine.clone(), 1);

        let first = manager
            .create_instance("passthrough", "1", PipelineRequest::new())
            .await
            .unwrap();
        let second = manager
            .create_instance("passthrough", "1", PipelineRequest::new())
            .await
            .unwrap();

        let status = wait_for_state(&manager, &first, JobState::Error).await;
        assert!(status.message.unwrap().contains("no device"));
        // The failed start frees its slot for the next instance.
        wait_for_state(&manager, &second, JobState::Running).await;
    }

    #[tokio::test]
    async fn test_unknown_plugin_class_is_start_error() {
        let engine = Arc::new(fixtures::detect_engine().with_app_sink());
        let manager = manager_with(engine, 1);
        let request = PipelineRequest::new().with_destination(json!({
            "metadata": {"type": "application", "class": "Missing"}
        }));
        let id = manager.create_instance("passthrough", "1", request).await.unwrap();
        let status = wait_for_state(&manager, &id, JobState::Error).await;
        assert!(status.message.unwrap().starts_with("Unsupported destination"));
    }

    #[tokio::test]
    async fn test_application_source_needs_engine_input() {
        let engine = Arc::new(fixtures::detect_engine());
        let manager = manager_with(engine, 1);
        let request = PipelineRequest::new()
            .with_source(json!({"type": "application", "class": "ChannelSource"}));
        let id = manager.create_instance("passthrough", "1", request).await.unwrap();
        let status = wait_for_state(&manager, &id, JobState::Error).await;
        assert!(status.message.unwrap().starts_with("Unsupported source"));
    }

    #[tokio::test]
    async fn test_stop_never_acknowledged_stays_running() {
        let engine = Arc::new(fixtures::detect_engine());
        engine.set_stop_ack(false);
        let manager = manager_with(engine.clone(), 1);

        let id = manager
            .create_instance("passthrough", "1", PipelineRequest::new())
            .await
            .unwrap();
        wait_for_state(&manager, &id, JobState::Running).await;

        let status = manager.stop(&id).await.unwrap();
        assert_eq!(status.state, JobState::Running);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.get_status(&id).await.unwrap().state, JobState::Running);
        assert_eq!(engine.stop_count(&id), 1);

        engine.acknowledge_stop(&id);
        wait_for_state(&manager, &id, JobState::Aborted).await;
    }

    #[tokio::test]
    async fn test_terminal_state_is_absorbing() {
        let engine = Arc::new(fixtures::detect_engine());
        let manager = manager_with(engine.clone(), 1);
        let id = manager
            .create_instance("passthrough", "1", PipelineRequest::new())
            .await
            .unwrap();
        wait_for_state(&manager, &id, JobState::Running).await;

        engine.complete(&id);
        engine.fail(&id, "late fault");
        engine.acknowledge_stop(&id);
        wait_for_state(&manager, &id, JobState::Completed).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let status = manager.get_status(&id).await.unwrap();
        assert_eq!(status.state, JobState::Completed);
        assert!(status.message.is_none());
    }

    #[tokio::test]
    async fn test_progress_updates_fps() {
        let engine = Arc::new(fixtures::detect_engine());
        let manager = manager_with(engine.clone(), 1);
        let id = manager
            .create_instance("passthrough", "1", PipelineRequest::new())
            .await
            .unwrap();
        wait_for_state(&manager, &id, JobState::Running).await;
        assert_eq!(manager.get_status(&id).await.unwrap().avg_fps, 0.0);

        tokio::time::sleep(Duration::from_millis(20)).await;
        engine.emit(&id, EngineEvent::Progress { frames: 10 });
        engine.emit(&id, EngineEvent::Latency(Duration::from_millis(40)));
        tokio::time::timeout(Duration::from_secs(5), async {
            while manager.get_status(&id).await.unwrap().avg_pipeline_latency.is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        let status = manager.get_status(&id).await.unwrap();
        assert!(status.avg_fps > 0.0);
        assert_eq!(status.avg_pipeline_latency, Some(0.04));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_instances() {
        let engine = Arc::new(fixtures::detect_engine());
        let manager = manager_with(engine, 1);
        let running = manager
            .create_instance("passthrough", "1", PipelineRequest::new())
            .await
            .unwrap();
        let queued = manager
            .create_instance("passthrough", "1", PipelineRequest::new())
            .await
            .unwrap();
        wait_for_state(&manager, &running, JobState::Running).await;

        manager.shutdown(Duration::from_secs(5)).await;
        assert_eq!(manager.get_status(&running).await.unwrap().state, JobState::Aborted);
        assert_eq!(manager.get_status(&queued).await.unwrap().state, JobState::Aborted);
        assert!(matches!(
            manager
                .create_instance("passthrough", "1", PipelineRequest::new())
                .await,
            Err(ManagerError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn test_pool_status() {
        let engine = Arc::new(fixtures::detect_engine());
        engine.set_auto_start(false);
        let manager = manager_with(engine, 1);
        for _ in 0..3 {
            manager
                .create_instance("passthrough", "1", PipelineRequest::new())
                .await
                .unwrap();
        }
        let pool = manager.pool_status().await;
        assert_eq!(pool.max_running, Some(1));
        assert_eq!(pool.running, 1);
        assert_eq!(pool.queued, 2);
        assert_eq!(pool.instances, 3);
    }

    #[tokio::test]
    async fn test_pool_status_waits_for_writer() {
        let engine = Arc::new(fixtures::detect_engine());
        let manager = manager_with(engine, 1);
        manager
            .create_instance("passthrough", "1", PipelineRequest::new())
            .await
            .unwrap();

        let writer = manager.instances.write().await;
        let reader = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.pool_status().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reader.is_finished());
        drop(writer);

        let pool = reader.await.unwrap();
        assert_eq!(pool.instances, 1);
    }
}
