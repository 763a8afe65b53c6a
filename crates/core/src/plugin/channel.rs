//! In-process channel source and destination.
//!
//! Library users exchange frames with running instances through named
//! channels in a [`ChannelHub`]. Either side may open a channel first.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::error::PluginError;
use super::traits::{AppDestination, AppSource, PluginContext};
use crate::engine::{Frame, FrameInput, SourceItem};

pub const CHANNEL_SOURCE: &str = "ChannelSource";
pub const CHANNEL_DESTINATION: &str = "ChannelDestination";

/// Item delivered to the reader of an output channel.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputItem {
    Frame(Frame),
    /// Metadata messages of one frame.
    Messages(Vec<Value>),
    /// The instance finished.
    End,
}

struct InputSlot {
    sender: FrameInput,
    receiver: Option<mpsc::UnboundedReceiver<SourceItem>>,
}

struct OutputSlot {
    sender: mpsc::UnboundedSender<OutputItem>,
    receiver: Option<mpsc::UnboundedReceiver<OutputItem>>,
}

/// Named channels between library users and application plugins.
#[derive(Default)]
pub struct ChannelHub {
    inputs: Mutex<HashMap<String, InputSlot>>,
    outputs: Mutex<HashMap<String, OutputSlot>>,
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer for the input channel `name`.
    pub fn open_input(&self, name: &str) -> FrameInput {
        let mut inputs = lock(&self.inputs);
        inputs
            .entry(name.to_string())
            .or_insert_with(new_input_slot)
            .sender
            .clone()
    }

    /// Reader for the output channel `name`. Only the first caller gets it.
    pub fn open_output(&self, name: &str) -> Option<mpsc::UnboundedReceiver<OutputItem>> {
        let mut outputs = lock(&self.outputs);
        outputs
            .entry(name.to_string())
            .or_insert_with(new_output_slot)
            .receiver
            .take()
    }

    fn take_input(&self, name: &str) -> Option<mpsc::UnboundedReceiver<SourceItem>> {
        let mut inputs = lock(&self.inputs);
        inputs
            .entry(name.to_string())
            .or_insert_with(new_input_slot)
            .receiver
            .take()
    }

    fn output_sender(&self, name: &str) -> mpsc::UnboundedSender<OutputItem> {
        let mut outputs = lock(&self.outputs);
        outputs
            .entry(name.to_string())
            .or_insert_with(new_output_slot)
            .sender
            .clone()
    }

    /// Forgets the input channel `name`. Writers see it closed once the
    /// source holding the reader is gone.
    pub fn close_input(&self, name: &str) {
        lock(&self.inputs).remove(name);
    }

    /// Forgets the output channel `name`.
    pub fn close_output(&self, name: &str) {
        lock(&self.outputs).remove(name);
    }

    pub fn has_input(&self, name: &str) -> bool {
        lock(&self.inputs).contains_key(name)
    }

    pub fn has_output(&self, name: &str) -> bool {
        lock(&self.outputs).contains_key(name)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn new_input_slot() -> InputSlot {
    let (sender, receiver) = FrameInput::channel();
    InputSlot {
        sender,
        receiver: Some(receiver),
    }
}

fn new_output_slot() -> OutputSlot {
    let (sender, receiver) = mpsc::unbounded_channel();
    OutputSlot {
        sender,
        receiver: Some(receiver),
    }
}

// =============================================================================
// Source
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Paused,
    Flowing,
    Finished,
}

/// Forwards frames from a hub input channel into the engine.
///
/// In `push` mode frames flow whenever the engine asked for data; in `pull`
/// mode each `start_frames` forwards exactly one frame, waiting for the
/// client to write one if none is queued.
pub struct ChannelSource {
    hub: Arc<ChannelHub>,
    channel: String,
    pull: bool,
    flow: watch::Sender<Flow>,
    engine_input: FrameInput,
    pending: Arc<Mutex<Option<mpsc::UnboundedReceiver<SourceItem>>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelSource {
    pub fn construct(ctx: &PluginContext<'_>) -> Result<Arc<dyn AppSource>, PluginError> {
        let engine_input = ctx.input.clone().ok_or_else(|| {
            PluginError::construction(CHANNEL_SOURCE, "engine has no application input")
        })?;
        let channel = ctx
            .section_str("input")
            .unwrap_or(ctx.instance_id)
            .to_string();
        let pull = ctx.section_str("mode") == Some("pull");
        let receiver = ctx.hub.take_input(&channel).ok_or_else(|| {
            PluginError::construction(CHANNEL_SOURCE, format!("input '{}' already in use", channel))
        })?;

        let (flow, flow_rx) = watch::channel(Flow::Paused);
        let source = ChannelSource {
            hub: Arc::clone(ctx.hub),
            channel,
            pull,
            flow,
            engine_input: engine_input.clone(),
            pending: Arc::new(Mutex::new(None)),
            task: Mutex::new(None),
        };

        if pull {
            *lock(&source.pending) = Some(receiver);
        } else {
            let task = tokio::spawn(forward(receiver, flow_rx, engine_input));
            *lock(&source.task) = Some(task);
        }

        debug!(
            "Channel source on '{}' ({} mode)",
            source.channel,
            if pull { "pull" } else { "push" }
        );
        Ok(Arc::new(source))
    }
}

async fn forward(
    mut receiver: mpsc::UnboundedReceiver<SourceItem>,
    mut flow: watch::Receiver<Flow>,
    input: FrameInput,
) {
    loop {
        if flow.wait_for(|f| *f != Flow::Paused).await.is_err() {
            break;
        }
        if *flow.borrow() == Flow::Finished {
            break;
        }
        tokio::select! {
            item = receiver.recv() => match item {
                Some(SourceItem::Frame(frame)) => {
                    if !input.push(frame) {
                        break;
                    }
                }
                Some(SourceItem::EndOfStream) | None => {
                    input.end_of_stream();
                    break;
                }
            },
            _ = flow.changed() => {}
        }
    }
}

async fn pull_one(
    mut receiver: mpsc::UnboundedReceiver<SourceItem>,
    pending: Arc<Mutex<Option<mpsc::UnboundedReceiver<SourceItem>>>>,
    input: FrameInput,
) {
    match receiver.recv().await {
        Some(SourceItem::Frame(frame)) => {
            // The receiver goes back before the frame is visible, so the next
            // request always finds it.
            *lock(&pending) = Some(receiver);
            input.push(frame);
        }
        Some(SourceItem::EndOfStream) | None => {
            input.end_of_stream();
        }
    }
}

impl AppSource for ChannelSource {
    fn name(&self) -> &str {
        CHANNEL_SOURCE
    }

    fn start_frames(&self) {
        if self.pull {
            let mut pending = lock(&self.pending);
            let Some(receiver) = pending.as_mut() else {
                return;
            };
            match receiver.try_recv() {
                Ok(SourceItem::Frame(frame)) => {
                    self.engine_input.push(frame);
                }
                Ok(SourceItem::EndOfStream) | Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.engine_input.end_of_stream();
                    *pending = None;
                }
                Err(mpsc::error::TryRecvError::Empty) => {
                    // Hold the demand until the client writes.
                    let Some(receiver) = pending.take() else {
                        return;
                    };
                    drop(pending);
                    let task = tokio::spawn(pull_one(
                        receiver,
                        Arc::clone(&self.pending),
                        self.engine_input.clone(),
                    ));
                    *lock(&self.task) = Some(task);
                }
            }
        } else {
            self.flow.send_if_modified(|flow| {
                let changed = *flow == Flow::Paused;
                if changed {
                    *flow = Flow::Flowing;
                }
                changed
            });
        }
    }

    fn pause_frames(&self) {
        self.flow.send_if_modified(|flow| {
            let changed = *flow == Flow::Flowing;
            if changed {
                *flow = Flow::Paused;
            }
            changed
        });
    }

    fn finish(&self) {
        let _ = self.flow.send(Flow::Finished);
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
        lock(&self.pending).take();
        self.hub.close_input(&self.channel);
        debug!("Channel source on '{}' finished", self.channel);
    }
}

// =============================================================================
// Destination
// =============================================================================

/// Writes processed frames, or only their metadata, to a hub output channel.
pub struct ChannelDestination {
    hub: Arc<ChannelHub>,
    channel: String,
    messages_only: bool,
    sender: mpsc::UnboundedSender<OutputItem>,
}

impl ChannelDestination {
    pub fn construct(ctx: &PluginContext<'_>) -> Result<Arc<dyn AppDestination>, PluginError> {
        let channel = ctx
            .section_str("output")
            .unwrap_or(ctx.instance_id)
            .to_string();
        let messages_only = ctx.section_str("mode") == Some("messages");
        let sender = ctx.hub.output_sender(&channel);
        Ok(Arc::new(ChannelDestination {
            hub: Arc::clone(ctx.hub),
            channel,
            messages_only,
            sender,
        }))
    }
}

impl AppDestination for ChannelDestination {
    fn name(&self) -> &str {
        CHANNEL_DESTINATION
    }

    fn process_frame(&self, frame: &Frame) -> Result<(), PluginError> {
        let item = if self.messages_only {
            if frame.messages.is_empty() {
                return Ok(());
            }
            OutputItem::Messages(frame.messages.clone())
        } else {
            OutputItem::Frame(frame.clone())
        };
        self.sender
            .send(item)
            .map_err(|_| PluginError::ChannelClosed(self.channel.clone()))
    }

    fn finish(&self) {
        if self.sender.send(OutputItem::End).is_err() {
            warn!("Output '{}' closed before end of stream", self.channel);
        }
        self.hub.close_output(&self.channel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::PipelineRequest;
    use serde_json::json;
    use std::time::Duration;

    fn context<'a>(
        hub: &'a Arc<ChannelHub>,
        request: &'a PipelineRequest,
        section: &'a Value,
        input: Option<FrameInput>,
    ) -> PluginContext<'a> {
        PluginContext {
            instance_id: "job-1",
            engine_type: "mock",
            request,
            section,
            input,
            hub,
            streaming: None,
        }
    }

    #[tokio::test]
    async fn test_push_source_respects_flow() {
        let hub = Arc::new(ChannelHub::new());
        let request = PipelineRequest::new();
        let section = json!({"type": "application", "class": CHANNEL_SOURCE, "input": "cam"});
        let (engine_input, mut engine_rx) = FrameInput::channel();

        let client = hub.open_input("cam");
        let source =
            ChannelSource::construct(&context(&hub, &request, &section, Some(engine_input)))
                .unwrap();

        client.push(Frame::new(vec![1]));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(engine_rx.try_recv().is_err(), "paused source must not forward");

        source.start_frames();
        source.start_frames();
        let item = tokio::time::timeout(Duration::from_secs(1), engine_rx.recv())
            .await
            .unwrap();
        assert_eq!(item, Some(SourceItem::Frame(Frame::new(vec![1]))));

        client.end_of_stream();
        let item = tokio::time::timeout(Duration::from_secs(1), engine_rx.recv())
            .await
            .unwrap();
        assert_eq!(item, Some(SourceItem::EndOfStream));

        source.pause_frames();
        source.finish();
        assert!(!hub.has_input("cam"));
    }

    #[tokio::test]
    async fn test_pull_source_forwards_one_per_request() {
        let hub = Arc::new(ChannelHub::new());
        let request = PipelineRequest::new();
        let section = json!({"type": "application", "class": CHANNEL_SOURCE, "mode": "pull"});
        let (engine_input, mut engine_rx) = FrameInput::channel();

        let source =
            ChannelSource::construct(&context(&hub, &request, &section, Some(engine_input)))
                .unwrap();
        let client = hub.open_input("job-1");
        client.push(Frame::new(vec![1]));
        client.push(Frame::new(vec![2]));

        source.pause_frames();
        source.start_frames();
        assert_eq!(
            engine_rx.try_recv().ok(),
            Some(SourceItem::Frame(Frame::new(vec![1])))
        );
        assert!(engine_rx.try_recv().is_err());

        source.start_frames();
        assert_eq!(
            engine_rx.try_recv().ok(),
            Some(SourceItem::Frame(Frame::new(vec![2])))
        );

        // Nothing queued: the request waits for the next client frame.
        source.start_frames();
        assert!(engine_rx.try_recv().is_err());
        client.push(Frame::new(vec![3]));
        let item = tokio::time::timeout(Duration::from_secs(1), engine_rx.recv())
            .await
            .unwrap();
        assert_eq!(item, Some(SourceItem::Frame(Frame::new(vec![3]))));

        // Without a new request the next frame stays queued.
        client.push(Frame::new(vec![4]));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(engine_rx.try_recv().is_err());
        source.start_frames();
        assert_eq!(
            engine_rx.try_recv().ok(),
            Some(SourceItem::Frame(Frame::new(vec![4])))
        );
        source.finish();
    }

    #[test]
    fn test_source_requires_engine_input() {
        let hub = Arc::new(ChannelHub::new());
        let request = PipelineRequest::new();
        let section = json!({"type": "application", "class": CHANNEL_SOURCE});
        assert!(matches!(
            ChannelSource::construct(&context(&hub, &request, &section, None)),
            Err(PluginError::Construction { .. })
        ));
    }

    #[tokio::test]
    async fn test_input_claimed_once() {
        let hub = Arc::new(ChannelHub::new());
        let request = PipelineRequest::new();
        let section = json!({"type": "application", "class": CHANNEL_SOURCE, "input": "cam"});

        let (input_a, _rx_a) = FrameInput::channel();
        let (input_b, _rx_b) = FrameInput::channel();
        assert!(ChannelSource::construct(&context(&hub, &request, &section, Some(input_a))).is_ok());
        assert!(ChannelSource::construct(&context(&hub, &request, &section, Some(input_b))).is_err());
    }

    #[tokio::test]
    async fn test_destination_modes() {
        let hub = Arc::new(ChannelHub::new());
        let request = PipelineRequest::new();
        let frames_section = json!({"type": "application", "class": CHANNEL_DESTINATION, "output": "all"});
        let messages_section = json!({
            "type": "application", "class": CHANNEL_DESTINATION, "output": "meta", "mode": "messages"
        });

        let mut all = hub.open_output("all").unwrap();
        let mut meta = hub.open_output("meta").unwrap();
        assert!(hub.open_output("meta").is_none());

        let frames = ChannelDestination::construct(&context(&hub, &request, &frames_section, None)).unwrap();
        let messages =
            ChannelDestination::construct(&context(&hub, &request, &messages_section, None)).unwrap();

        let plain = Frame::new(vec![9]);
        let tagged = Frame::new(vec![8]).with_message(json!({"label": "person"}));
        for frame in [&plain, &tagged] {
            frames.process_frame(frame).unwrap();
            messages.process_frame(frame).unwrap();
        }
        frames.finish();
        messages.finish();
        assert!(!hub.has_output("all"));

        assert_eq!(all.recv().await, Some(OutputItem::Frame(plain)));
        assert_eq!(all.recv().await, Some(OutputItem::Frame(tagged)));
        assert_eq!(all.recv().await, Some(OutputItem::End));

        assert_eq!(
            meta.recv().await,
            Some(OutputItem::Messages(vec![json!({"label": "person"})]))
        );
        assert_eq!(meta.recv().await, Some(OutputItem::End));
    }

    #[tokio::test]
    async fn test_destination_reports_closed_channel() {
        let hub = Arc::new(ChannelHub::new());
        let request = PipelineRequest::new();
        let section = json!({"type": "application", "class": CHANNEL_DESTINATION});
        let reader = hub.open_output("job-1").unwrap();
        let destination = ChannelDestination::construct(&context(&hub, &request, &section, None)).unwrap();
        drop(reader);
        assert_eq!(
            destination.process_frame(&Frame::new(vec![1])),
            Err(PluginError::ChannelClosed("job-1".to_string()))
        );
    }
}
