//! FFmpeg-based engine implementation.
//!
//! A launch string is an ffmpeg argument list. Filters in the `-vf` chain are
//! exposed as elements, their options as properties. `-i pipe:0` makes the
//! pipeline accept frames from an application source and a `pipe:1` output
//! delivers chunks to application destinations.

use async_trait::async_trait;
use regex_lite::Regex;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::config::FfmpegConfig;
use super::error::EngineError;
use super::traits::{ElementProperties, EngineHandle, MediaEngine};
use super::types::{EngineEvent, EngineEventSink, Frame, FrameInput, LaunchSpec, SourceItem};
use crate::plugin::{AppDestination, AppSource};

const FILTER_FLAGS: [&str; 3] = ["-vf", "-filter:v", "-filter_complex"];
const PIPE_IN: [&str; 2] = ["pipe:0", "-"];
const PIPE_OUT: [&str; 2] = ["pipe:1", "-"];

/// FFmpeg-based engine implementation.
pub struct FfmpegEngine {
    config: FfmpegConfig,
}

impl FfmpegEngine {
    /// Creates a new FFmpeg engine with the given configuration.
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }

    /// Creates an engine with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(FfmpegConfig::default())
    }

    /// Global arguments placed before the launch string.
    fn global_args(&self) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-nostats".to_string(),
            "-loglevel".to_string(),
            self.config.log_level.clone(),
            // Progress output for parsing
            "-progress".to_string(),
            "pipe:2".to_string(),
        ];
        args.extend(self.config.extra_args.iter().cloned());
        args
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    fn name(&self) -> &str {
        "FFmpeg"
    }

    async fn launch(
        &self,
        spec: LaunchSpec,
        events: EngineEventSink,
    ) -> Result<Arc<dyn EngineHandle>, EngineError> {
        let args = spec.args.clone();
        if args.is_empty() {
            return Err(EngineError::invalid_launch("empty launch string"));
        }

        let filter_index = args
            .iter()
            .position(|a| FILTER_FLAGS.contains(&a.as_str()))
            .map(|i| i + 1)
            .filter(|&i| i < args.len());
        let filters = filter_index
            .map(|i| FilterChain::parse(&args[i]))
            .unwrap_or_default();

        let app_source = args
            .windows(2)
            .any(|w| w[0] == "-i" && PIPE_IN.contains(&w[1].as_str()));
        let app_sink = args
            .last()
            .map(|a| PIPE_OUT.contains(&a.as_str()))
            .unwrap_or(false);

        let (input, source_rx) = if app_source {
            let (input, rx) = FrameInput::channel();
            (Some(input), Some(rx))
        } else {
            (None, None)
        };

        debug!(
            "Constructed ffmpeg pipeline for {} ({} filters, app source: {}, app sink: {})",
            spec.instance_id,
            filters.filters.len(),
            app_source,
            app_sink
        );

        let (stop_tx, _) = watch::channel(false);
        Ok(Arc::new(FfmpegHandle {
            program: self.config.ffmpeg_path.clone(),
            global_args: self.global_args(),
            args,
            filter_index,
            filters: Mutex::new(filters),
            input,
            source_rx: Mutex::new(source_rx),
            app_sink,
            chunk_size: self.config.sink_chunk_size.max(1),
            plugins: Mutex::new(AttachedPlugins::default()),
            events,
            started: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            stop_tx,
        }))
    }

    async fn validate(&self) -> Result<(), EngineError> {
        let output = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::FfmpegNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    EngineError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(EngineError::start_failed("ffmpeg -version failed"));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        if let Some(line) = version.lines().next() {
            info!("FFmpeg available: {}", line);
        }
        Ok(())
    }
}

// =============================================================================
// Filter chain
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
struct Filter {
    name: String,
    options: Vec<(String, String)>,
}

/// A parsed `-vf` chain: `scale=w=640:h=480,fps=30`.
#[derive(Debug, Clone, Default, PartialEq)]
struct FilterChain {
    filters: Vec<Filter>,
}

impl FilterChain {
    fn parse(chain: &str) -> Self {
        let filters = chain
            .split(',')
            .filter(|f| !f.trim().is_empty())
            .map(|f| {
                let (name, params) = match f.split_once('=') {
                    Some((name, params)) => (name.trim(), params),
                    None => (f.trim(), ""),
                };
                let options = params
                    .split(':')
                    .filter(|p| !p.is_empty())
                    .enumerate()
                    .map(|(i, p)| match p.split_once('=') {
                        Some((k, v)) => (k.to_string(), v.to_string()),
                        None => (i.to_string(), p.to_string()),
                    })
                    .collect();
                Filter {
                    name: name.to_string(),
                    options,
                }
            })
            .collect();
        Self { filters }
    }

    fn render(&self) -> String {
        self.filters
            .iter()
            .map(|f| {
                if f.options.is_empty() {
                    return f.name.clone();
                }
                let params = f
                    .options
                    .iter()
                    .map(|(k, v)| {
                        if k.parse::<usize>().is_ok() {
                            v.clone()
                        } else {
                            format!("{}={}", k, v)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(":");
                format!("{}={}", f.name, params)
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    fn find(&self, element: &str) -> Option<&Filter> {
        self.filters.iter().find(|f| f.name == element)
    }

    fn find_mut(&mut self, element: &str) -> Option<&mut Filter> {
        self.filters.iter_mut().find(|f| f.name == element)
    }
}

fn value_to_option(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// =============================================================================
// Handle
// =============================================================================

#[derive(Default)]
struct AttachedPlugins {
    source: Option<Arc<dyn AppSource>>,
    destinations: Vec<Arc<dyn AppDestination>>,
}

/// One ffmpeg process, constructed but possibly not yet spawned.
pub struct FfmpegHandle {
    program: PathBuf,
    global_args: Vec<String>,
    args: Vec<String>,
    filter_index: Option<usize>,
    filters: Mutex<FilterChain>,
    input: Option<FrameInput>,
    source_rx: Mutex<Option<mpsc::UnboundedReceiver<SourceItem>>>,
    app_sink: bool,
    chunk_size: usize,
    plugins: Mutex<AttachedPlugins>,
    events: EngineEventSink,
    started: AtomicBool,
    stop_requested: AtomicBool,
    stop_tx: watch::Sender<bool>,
}

impl FfmpegHandle {
    fn final_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        if let Some(index) = self.filter_index {
            if let Ok(filters) = self.filters.lock() {
                args[index] = filters.render();
            }
        }
        let mut all = self.global_args.clone();
        all.extend(args);
        all
    }
}

impl ElementProperties for FfmpegHandle {
    fn list_writable_properties(&self, element: &str) -> Option<Vec<String>> {
        let filters = self.filters.lock().ok()?;
        filters
            .find(element)
            .map(|f| f.options.iter().map(|(k, _)| k.clone()).collect())
    }

    fn set_property(
        &self,
        element: &str,
        property: &str,
        value: &Value,
    ) -> Result<(), EngineError> {
        let mut filters = self
            .filters
            .lock()
            .map_err(|_| EngineError::start_failed("filter chain lock poisoned"))?;
        let filter = filters
            .find_mut(element)
            .ok_or_else(|| EngineError::UnknownElement {
                element: element.to_string(),
            })?;
        let option = filter
            .options
            .iter_mut()
            .find(|(k, _)| k == property)
            .ok_or_else(|| EngineError::PropertyNotWritable {
                element: element.to_string(),
                property: property.to_string(),
            })?;
        option.1 = value_to_option(value);
        Ok(())
    }

    fn get_property(&self, element: &str, property: &str) -> Option<Value> {
        let filters = self.filters.lock().ok()?;
        filters
            .find(element)?
            .options
            .iter()
            .find(|(k, _)| k == property)
            .map(|(_, v)| Value::String(v.clone()))
    }
}

#[async_trait]
impl EngineHandle for FfmpegHandle {
    fn launch_command(&self) -> String {
        let mut parts = vec![quote_arg(&self.program.to_string_lossy())];
        parts.extend(self.final_args().iter().map(|a| quote_arg(a)));
        parts.join(" ")
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
        if source.is_some() && self.input.is_none() {
            return Err(EngineError::AttachFailed {
                reason: "pipeline has no pipe:0 input".to_string(),
            });
        }
        if !destinations.is_empty() && !self.app_sink {
            return Err(EngineError::AttachFailed {
                reason: "pipeline has no pipe:1 output".to_string(),
            });
        }
        let mut plugins = self
            .plugins
            .lock()
            .map_err(|_| EngineError::start_failed("plugin lock poisoned"))?;
        plugins.source = source;
        plugins.destinations = destinations;
        Ok(())
    }

    async fn play(&self) -> Result<(), EngineError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyStarted);
        }

        let args = self.final_args();
        debug!("Running ffmpeg for {}: {:?}", self.events.instance_id(), args);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(if self.input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(if self.app_sink {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::FfmpegNotFound {
                        path: self.program.clone(),
                    }
                } else {
                    EngineError::Io(e)
                }
            })?;

        let (source, destinations) = {
            let plugins = self
                .plugins
                .lock()
                .map_err(|_| EngineError::start_failed("plugin lock poisoned"))?;
            (plugins.source.clone(), plugins.destinations.clone())
        };

        let confirmed = Arc::new(AtomicBool::new(false));
        let last_error = Arc::new(Mutex::new(String::new()));

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::start_failed("stderr not captured"))?;
        let stderr_task = tokio::spawn(read_progress(
            stderr,
            self.events.clone(),
            Arc::clone(&confirmed),
            Arc::clone(&last_error),
        ));

        if let (Some(stdin), Some(source)) = (child.stdin.take(), source) {
            let rx = self.source_rx.lock().ok().and_then(|mut rx| rx.take());
            if let Some(rx) = rx {
                tokio::spawn(feed_source(stdin, rx, source));
            }
        }

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(drain_sink(stdout, destinations, self.chunk_size));
        }

        let events = self.events.clone();
        let mut stop_rx = self.stop_tx.subscribe();
        if self.stop_requested.load(Ordering::SeqCst) {
            let _ = self.stop_tx.send(true);
        }

        tokio::spawn(async move {
            let stop_signal = async {
                if stop_rx.wait_for(|stop| *stop).await.is_err() {
                    // Handle dropped without a stop request; run to completion.
                    std::future::pending::<()>().await;
                }
            };
            let status = tokio::select! {
                status = child.wait() => status,
                _ = stop_signal => {
                    let _ = child.kill().await;
                    let _ = stderr_task.await;
                    info!("ffmpeg for {} stopped on request", events.instance_id());
                    events.emit(EngineEvent::Aborted);
                    return;
                }
            };
            let _ = stderr_task.await;

            match status {
                Ok(status) if status.success() => {
                    if !confirmed.swap(true, Ordering::SeqCst) {
                        events.emit(EngineEvent::Running);
                    }
                    events.emit(EngineEvent::Completed);
                }
                Ok(status) => {
                    let stderr = last_error.lock().map(|s| s.clone()).unwrap_or_default();
                    let detail = if stderr.is_empty() {
                        format!("FFmpeg exited with code: {:?}", status.code())
                    } else {
                        format!("FFmpeg exited with code: {:?}: {}", status.code(), stderr)
                    };
                    events.emit(EngineEvent::Error { detail });
                }
                Err(e) => events.emit(EngineEvent::Error {
                    detail: format!("failed waiting for ffmpeg: {}", e),
                }),
            }
        });

        Ok(())
    }

    async fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        if self.started.load(Ordering::SeqCst) {
            let _ = self.stop_tx.send(true);
        } else {
            // Never spawned, nothing to wait for.
            self.events.emit(EngineEvent::Aborted);
        }
    }
}

/// Shell-style quoting for display.
fn quote_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains(|c: char| c.is_whitespace() || c == '\'' || c == '"') {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', "'\\''"))
}

async fn read_progress(
    stderr: ChildStderr,
    events: EngineEventSink,
    confirmed: Arc<AtomicBool>,
    last_error: Arc<Mutex<String>>,
) {
    let mut reader = BufReader::new(stderr).lines();
    let frame_regex = Regex::new(r"^frame=\s*(\d+)").ok();

    while let Ok(Some(line)) = reader.next_line().await {
        if let Some(ref re) = frame_regex {
            if let Some(frames) = re
                .captures(&line)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u64>().ok())
            {
                if !confirmed.swap(true, Ordering::SeqCst) {
                    events.emit(EngineEvent::Running);
                }
                events.emit(EngineEvent::Progress { frames });
                continue;
            }
        }

        // Remaining -progress keys (fps=, out_time_us=, progress=...)
        if line.contains('=') {
            continue;
        }

        if !line.trim().is_empty() {
            if let Ok(mut last) = last_error.lock() {
                *last = line;
            }
        }
    }
}

/// Writes source frames to ffmpeg's stdin, asking for the next frame after
/// each one is consumed.
async fn feed_source<W: AsyncWrite + Unpin>(
    mut stdin: W,
    mut rx: mpsc::UnboundedReceiver<SourceItem>,
    source: Arc<dyn AppSource>,
) {
    source.start_frames();
    while let Some(item) = rx.recv().await {
        match item {
            SourceItem::Frame(frame) => {
                if let Err(e) = stdin.write_all(&frame.data).await {
                    warn!("ffmpeg stopped accepting input: {}", e);
                    source.pause_frames();
                    break;
                }
                source.start_frames();
            }
            SourceItem::EndOfStream => break,
        }
    }
    let _ = stdin.shutdown().await;
}

async fn drain_sink(
    mut stdout: ChildStdout,
    destinations: Vec<Arc<dyn AppDestination>>,
    chunk_size: usize,
) {
    let mut buf = vec![0u8; chunk_size];
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let frame = Frame::new(buf[..n].to_vec());
                for destination in &destinations {
                    if let Err(e) = destination.process_frame(&frame) {
                        warn!("Destination {} rejected frame: {}", destination.name(), e);
                    }
                }
            }
            Err(e) => {
                warn!("Failed reading ffmpeg output: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{render_launch_args, split_args};
    use crate::plugin::{ChannelHub, ChannelSource, PluginContext, CHANNEL_SOURCE};
    use crate::request::PipelineRequest;
    use serde_json::json;
    use std::time::Duration;

    fn spec(launch: &str) -> LaunchSpec {
        LaunchSpec {
            instance_id: "job-1".to_string(),
            template: "transcode".to_string(),
            version: "1".to_string(),
            launch: launch.to_string(),
            args: split_args(launch).unwrap(),
            shared: Vec::new(),
        }
    }

    fn sink() -> (EngineEventSink, mpsc::UnboundedReceiver<(String, EngineEvent)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EngineEventSink::new("job-1", tx), rx)
    }

    #[test]
    fn test_filter_chain_parse_and_render() {
        let chain = FilterChain::parse("scale=w=640:h=480,fps=30,hflip");
        assert_eq!(chain.filters.len(), 3);
        assert_eq!(chain.filters[0].name, "scale");
        assert_eq!(
            chain.filters[0].options,
            vec![
                ("w".to_string(), "640".to_string()),
                ("h".to_string(), "480".to_string())
            ]
        );
        assert_eq!(chain.filters[1].options, vec![("0".to_string(), "30".to_string())]);
        assert!(chain.filters[2].options.is_empty());
        assert_eq!(chain.render(), "scale=w=640:h=480,fps=30,hflip");
    }

    #[tokio::test]
    async fn test_launch_exposes_filters_as_elements() {
        let engine = FfmpegEngine::with_defaults();
        let (events, _rx) = sink();
        let handle = engine
            .launch(spec("-i in.mp4 -vf scale=w=640:h=480 out.mp4"), events)
            .await
            .unwrap();

        assert_eq!(
            handle.list_writable_properties("scale"),
            Some(vec!["w".to_string(), "h".to_string()])
        );
        assert!(handle.list_writable_properties("crop").is_none());

        handle.set_property("scale", "w", &json!(1280)).unwrap();
        assert_eq!(handle.get_property("scale", "w"), Some(json!("1280")));
        assert!(handle.launch_command().contains("scale=w=1280:h=480"));
    }

    #[tokio::test]
    async fn test_set_unknown_property_fails() {
        let engine = FfmpegEngine::with_defaults();
        let (events, _rx) = sink();
        let handle = engine
            .launch(spec("-i in.mp4 -vf scale=w=640 out.mp4"), events)
            .await
            .unwrap();

        assert!(matches!(
            handle.set_property("scale", "flags", &json!("bicubic")),
            Err(EngineError::PropertyNotWritable { .. })
        ));
        assert!(matches!(
            handle.set_property("crop", "w", &json!(1)),
            Err(EngineError::UnknownElement { .. })
        ));
    }

    #[tokio::test]
    async fn test_launch_detects_app_pipes() {
        let engine = FfmpegEngine::with_defaults();
        let (events, _rx) = sink();
        let handle = engine
            .launch(spec("-f rawvideo -i pipe:0 -f mjpeg pipe:1"), events)
            .await
            .unwrap();
        assert!(handle.app_source_input().is_some());
        assert!(handle.has_app_sink());

        let (events, _rx) = sink();
        let handle = engine
            .launch(spec("-i in.mp4 out.mp4"), events)
            .await
            .unwrap();
        assert!(handle.app_source_input().is_none());
        assert!(!handle.has_app_sink());
    }

    #[tokio::test]
    async fn test_empty_launch_rejected() {
        let engine = FfmpegEngine::with_defaults();
        let (events, _rx) = sink();
        assert!(matches!(
            engine.launch(spec("   "), events).await,
            Err(EngineError::InvalidLaunch { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_fails_play() {
        let engine = FfmpegEngine::new(
            FfmpegConfig::default().with_ffmpeg_path("/nonexistent/path/to/ffmpeg"),
        );
        let (events, _rx) = sink();
        let handle = engine
            .launch(spec("-i in.mp4 out.mp4"), events)
            .await
            .unwrap();
        assert!(matches!(
            handle.play().await,
            Err(EngineError::FfmpegNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_stop_before_play_reports_aborted() {
        let engine = FfmpegEngine::with_defaults();
        let (events, mut rx) = sink();
        let handle = engine
            .launch(spec("-i in.mp4 out.mp4"), events)
            .await
            .unwrap();
        handle.stop().await;
        assert_eq!(
            rx.recv().await,
            Some(("job-1".to_string(), EngineEvent::Aborted))
        );
    }

    #[tokio::test]
    async fn test_request_value_stays_one_argument() {
        let engine = FfmpegEngine::with_defaults();
        let (events, _rx) = sink();
        let request = json!({"source": {"uri": "file:///my clip.mp4 -y /tmp/other.mp4"}});
        let template = "-i {source[uri]} -f null -";
        let mut launch = spec(template);
        launch.args = render_launch_args(template, &request).unwrap();

        let handle = engine.launch(launch, events).await.unwrap();
        let command = handle.launch_command();
        assert!(command.ends_with("-i 'file:///my clip.mp4 -y /tmp/other.mp4' -f null -"));
    }

    #[test]
    fn test_quote_arg() {
        assert_eq!(quote_arg("scale=w=640"), "scale=w=640");
        assert_eq!(quote_arg("my clip.mp4"), "'my clip.mp4'");
        assert_eq!(quote_arg(""), "''");
        assert_eq!(quote_arg("it's"), "'it'\\''s'");
    }

    #[tokio::test]
    async fn test_pull_source_feeds_every_frame() {
        let hub = Arc::new(ChannelHub::new());
        let request = PipelineRequest::new();
        let section = json!({"type": "application", "class": CHANNEL_SOURCE, "mode": "pull"});
        let (engine_input, engine_rx) = FrameInput::channel();
        let source = ChannelSource::construct(&PluginContext {
            instance_id: "job-1",
            engine_type: "ffmpeg",
            request: &request,
            section: &section,
            input: Some(engine_input),
            hub: &hub,
            streaming: None,
        })
        .unwrap();

        let (stdin, mut stdout) = tokio::io::duplex(64);
        let feeder = tokio::spawn(feed_source(stdin, engine_rx, source));

        // The client starts writing only after the engine asked for data.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let client = hub.open_input("job-1");
        client.push(Frame::new(vec![1, 2]));
        client.push(Frame::new(vec![3]));
        client.push(Frame::new(vec![4, 5]));
        client.end_of_stream();

        let mut written = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), stdout.read_to_end(&mut written))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(written, vec![1, 2, 3, 4, 5]);
        feeder.await.unwrap();
    }
}
