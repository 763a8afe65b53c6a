//! Configuration for outbound streaming sessions.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Streaming session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Whether webrtc destinations are available.
    #[serde(default)]
    pub enabled: bool,

    /// WebSocket URL of the signaling server.
    #[serde(default = "default_signaling_server")]
    pub signaling_server: String,

    /// Reconnect policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Receive wait before polling the session again, in milliseconds.
    #[serde(default = "default_recv_timeout")]
    pub recv_timeout_ms: u64,

    /// Default number of frames buffered per peer.
    #[serde(default = "default_cache_length")]
    pub cache_length: usize,
}

/// Reconnect policy for a streaming session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier. 1.0 gives a fixed delay.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_signaling_server() -> String {
    "ws://localhost:8443".to_string()
}

fn default_recv_timeout() -> u64 {
    10_000
}

fn default_cache_length() -> usize {
    30
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    5_000
}

fn default_max_delay() -> u64 {
    60_000
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            signaling_server: default_signaling_server(),
            retry: RetryConfig::default(),
            recv_timeout_ms: default_recv_timeout(),
            cache_length: default_cache_length(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_retries(),
            initial_delay_ms: default_retry_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl StreamingConfig {
    /// Enables streaming against the given signaling server.
    pub fn with_signaling_server(mut self, server: impl Into<String>) -> Self {
        self.enabled = true;
        self.signaling_server = server.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_cache_length(mut self, frames: usize) -> Self {
        self.cache_length = frames;
        self
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Delay before retry number `retry` (1-based), capped at `max_delay_ms`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let millis = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(millis.min(self.max_delay_ms as f64) as u64)
    }
}
