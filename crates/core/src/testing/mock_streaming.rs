//! Mock signaling transport and stream pipelines for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::engine::Frame;
use crate::streaming::{
    SignalMessage, SignalingChannel, SignalingConnector, StreamPipeline, StreamPipelineFactory,
    StreamPipelineRequest, StreamingError,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Teardown step observed by the mocks, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    ChannelClosed,
    Released,
}

pub type EventLog = Arc<Mutex<Vec<PipelineEvent>>>;

/// Mock implementation of the SignalingConnector trait.
///
/// A scripted connector hands out a fresh channel on every connect that
/// replays the script and then stays silent. An unreachable connector fails
/// every connect.
pub struct MockSignalingConnector {
    script: Option<Vec<String>>,
    connects: AtomicUsize,
    sent: Arc<Mutex<Vec<String>>>,
    events: Option<EventLog>,
}

impl MockSignalingConnector {
    pub fn scripted(script: Vec<&str>) -> Self {
        Self {
            script: Some(script.into_iter().map(str::to_string).collect()),
            connects: AtomicUsize::new(0),
            sent: Arc::new(Mutex::new(Vec::new())),
            events: None,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            script: None,
            connects: AtomicUsize::new(0),
            sent: Arc::new(Mutex::new(Vec::new())),
            events: None,
        }
    }

    /// Records channel closes into `log`.
    pub fn with_event_log(mut self, log: EventLog) -> Self {
        self.events = Some(log);
        self
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Every text sent on any channel.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl SignalingConnector for MockSignalingConnector {
    async fn connect(&self, server: &str) -> Result<Box<dyn SignalingChannel>, StreamingError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let Some(script) = &self.script else {
            return Err(StreamingError::connect(server, "connection refused"));
        };
        Ok(Box::new(MockChannel {
            incoming: script.iter().cloned().collect(),
            sent: Arc::clone(&self.sent),
            events: self.events.clone(),
            closed: false,
        }))
    }
}

struct MockChannel {
    incoming: VecDeque<String>,
    sent: Arc<Mutex<Vec<String>>>,
    events: Option<EventLog>,
    closed: bool,
}

#[async_trait]
impl SignalingChannel for MockChannel {
    async fn send(&mut self, text: String) -> Result<(), StreamingError> {
        if self.closed {
            return Err(StreamingError::Closed);
        }
        lock(&self.sent).push(text);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>, StreamingError> {
        match self.incoming.pop_front() {
            Some(text) => Ok(Some(text)),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        self.closed = true;
        if let Some(events) = &self.events {
            lock(events).push(PipelineEvent::ChannelClosed);
        }
    }
}

/// Mock implementation of the StreamPipelineFactory trait.
///
/// Each pipeline sends an SDP offer as soon as it is built and records the
/// signals it receives.
pub struct MockStreamPipelineFactory {
    created: AtomicUsize,
    fail: AtomicBool,
    last_caps: Mutex<Option<String>>,
    signals: Arc<Mutex<Vec<SignalMessage>>>,
    events: EventLog,
    frames: Mutex<Vec<broadcast::Receiver<Frame>>>,
}

impl Default for MockStreamPipelineFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStreamPipelineFactory {
    pub fn new() -> Self {
        Self {
            created: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            last_caps: Mutex::new(None),
            signals: Arc::new(Mutex::new(Vec::new())),
            events: Arc::new(Mutex::new(Vec::new())),
            frames: Mutex::new(Vec::new()),
        }
    }

    /// Pipeline construction fails while set.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn last_caps(&self) -> Option<String> {
        lock(&self.last_caps).clone()
    }

    pub fn signals(&self) -> Vec<SignalMessage> {
        lock(&self.signals).clone()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        lock(&self.events).clone()
    }

    /// Log shared with a connector so teardown order can be checked.
    pub fn event_log(&self) -> EventLog {
        Arc::clone(&self.events)
    }

    /// Frames buffered for the most recent pipeline.
    pub fn drain_frames(&self) -> Vec<Frame> {
        let mut receivers = lock(&self.frames);
        let mut frames = Vec::new();
        if let Some(rx) = receivers.last_mut() {
            while let Ok(frame) = rx.try_recv() {
                frames.push(frame);
            }
        }
        frames
    }
}

impl StreamPipelineFactory for MockStreamPipelineFactory {
    fn create(
        &self,
        request: StreamPipelineRequest,
    ) -> Result<Box<dyn StreamPipeline>, StreamingError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StreamingError::Pipeline("mock failure".to_string()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_caps) = Some(request.caps.clone());
        lock(&self.frames).push(request.frames);
        let _ = request.outbound.send(SignalMessage::offer("v=0 mock"));
        Ok(Box::new(MockStreamPipeline {
            signals: Arc::clone(&self.signals),
            events: Arc::clone(&self.events),
        }))
    }
}

struct MockStreamPipeline {
    signals: Arc<Mutex<Vec<SignalMessage>>>,
    events: EventLog,
}

impl StreamPipeline for MockStreamPipeline {
    fn handle_signal(&mut self, message: SignalMessage) -> Result<(), StreamingError> {
        lock(&self.signals).push(message);
        Ok(())
    }

    fn release(self: Box<Self>) {
        lock(&self.events).push(PipelineEvent::Released);
    }
}
