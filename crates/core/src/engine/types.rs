//! Types shared between the manager and engine implementations.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// One unit of media moving through an application source or sink.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    /// Raw payload.
    pub data: Vec<u8>,
    /// Media caps describing the payload, if known.
    pub caps: Option<String>,
    /// Presentation timestamp in nanoseconds.
    pub pts: Option<u64>,
    /// Metadata messages attached by the engine (inference results etc).
    pub messages: Vec<Value>,
}

impl Frame {
    /// Creates a frame holding only a payload.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    /// Attaches caps.
    pub fn with_caps(mut self, caps: impl Into<String>) -> Self {
        self.caps = Some(caps.into());
        self
    }

    /// Attaches a metadata message.
    pub fn with_message(mut self, message: Value) -> Self {
        self.messages.push(message);
        self
    }
}

/// Item pushed by an application source into the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceItem {
    Frame(Frame),
    EndOfStream,
}

/// Write end of an engine's application source input.
#[derive(Debug, Clone)]
pub struct FrameInput {
    tx: mpsc::UnboundedSender<SourceItem>,
}

impl FrameInput {
    /// Creates an input and the receiver the engine drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SourceItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Pushes a frame. Returns false once the engine stopped accepting input.
    pub fn push(&self, frame: Frame) -> bool {
        self.tx.send(SourceItem::Frame(frame)).is_ok()
    }

    /// Signals the end of the source stream.
    pub fn end_of_stream(&self) -> bool {
        self.tx.send(SourceItem::EndOfStream).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Lifecycle signal reported by an engine for one pipeline instance.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Processing actually began.
    Running,
    /// Cumulative number of frames processed.
    Progress { frames: u64 },
    /// One end-to-end latency sample.
    Latency(Duration),
    /// Natural end of stream.
    Completed,
    /// Engine fault.
    Error { detail: String },
    /// The engine honored a stop request.
    Aborted,
}

impl EngineEvent {
    /// Whether the event ends the pipeline.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error { .. } | Self::Aborted)
    }
}

/// Sending half of the engine event queue, bound to one instance.
///
/// Engines call [`EngineEventSink::emit`] from whatever task or thread
/// observes the change; the manager applies events from a single consumer.
#[derive(Debug, Clone)]
pub struct EngineEventSink {
    instance_id: String,
    tx: mpsc::UnboundedSender<(String, EngineEvent)>,
}

impl EngineEventSink {
    pub fn new(
        instance_id: impl Into<String>,
        tx: mpsc::UnboundedSender<(String, EngineEvent)>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            tx,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Enqueues an event. Events sent after the manager shut down are dropped.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send((self.instance_id.clone(), event));
    }
}

/// Everything an engine needs to construct one pipeline.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Owning instance id.
    pub instance_id: String,
    /// Template name and version.
    pub template: String,
    pub version: String,
    /// Launch string with request values already substituted.
    pub launch: String,
    /// The same launch as arguments, each rendered on its own.
    pub args: Vec<String>,
    /// Shared resources acquired for this instance.
    pub shared: Vec<SharedHandle>,
}

/// An expensive backend object reused across instances.
pub trait SharedResource: Send + Sync + fmt::Debug {
    /// Identity the resource was created for.
    fn identity(&self) -> &str;
}

pub type SharedHandle = Arc<dyn SharedResource>;

/// Shared resource carrying only its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueResource {
    identity: String,
}

impl OpaqueResource {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
        }
    }
}

impl SharedResource for OpaqueResource {
    fn identity(&self) -> &str {
        &self.identity
    }
}
