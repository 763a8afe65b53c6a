pub mod cache;
pub mod config;
pub mod engine;
pub mod job;
pub mod manager;
pub mod metrics;
pub mod plugin;
pub mod request;
pub mod streaming;
pub mod template;
pub mod testing;

pub use cache::SharedResourceCache;
pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use engine::{EngineError, EngineEvent, FfmpegEngine, Frame, MediaEngine};
pub use job::{JobParameters, JobState, JobStatus};
pub use manager::{ErrorKind, ManagerConfig, ManagerError, PipelineManager, PoolStatus};
pub use plugin::{PluginError, PluginRegistry};
pub use request::{PipelineRequest, RequestError};
pub use streaming::{StreamingConfig, StreamingSessionManager, WebSocketConnector};
pub use template::{Template, TemplateError, TemplateRegistry, TemplateSummary};
