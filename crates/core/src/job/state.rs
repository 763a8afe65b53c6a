//! Instance states and the transitions between them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::status::JobStatus;

/// State of a pipeline instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Error,
    Aborted,
}

impl JobState {
    /// True for the three terminal states.
    pub fn stopped(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
            Self::Aborted => "ABORTED",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The engine confirmed processing began.
    Started,
    /// Natural end of stream.
    Completed,
    /// Engine fault, engine start fault or shared resource fault.
    Failed(String),
    /// Stop honored, or stop while still queued.
    Aborted,
}

/// Outcome of applying a [`Transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// State changed from the first to the second value.
    Changed(JobState, JobState),
    /// The instance is already terminal, or the transition does not apply.
    Ignored,
}

impl TransitionOutcome {
    /// The new state if this transition made the instance terminal.
    pub fn terminal(&self) -> Option<JobState> {
        match self {
            Self::Changed(_, to) if to.stopped() => Some(*to),
            _ => None,
        }
    }
}

/// Guarded fields of one instance. Terminal states are absorbing.
#[derive(Debug, Clone)]
pub struct JobStateMachine {
    state: JobState,
    created_at: DateTime<Utc>,
    start_time: Option<DateTime<Utc>>,
    stop_time: Option<DateTime<Utc>>,
    frames: u64,
    latency_total: Duration,
    latency_samples: u64,
    detail: Option<String>,
}

impl Default for JobStateMachine {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl JobStateMachine {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            state: JobState::Queued,
            created_at,
            start_time: None,
            stop_time: None,
            frames: 0,
            latency_total: Duration::ZERO,
            latency_samples: 0,
            detail: None,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Applies a transition at time `now`.
    ///
    /// `Completed` is only legal from `RUNNING`; an engine reporting end of
    /// stream before confirming its start is recorded as an error.
    pub fn apply(&mut self, transition: Transition, now: DateTime<Utc>) -> TransitionOutcome {
        if self.state.stopped() {
            return TransitionOutcome::Ignored;
        }

        let from = self.state;
        let to = match (from, transition) {
            (JobState::Queued, Transition::Started) => {
                self.start_time = Some(now);
                JobState::Running
            }
            (JobState::Running, Transition::Started) => return TransitionOutcome::Ignored,
            (JobState::Running, Transition::Completed) => JobState::Completed,
            (JobState::Queued, Transition::Completed) => {
                self.detail = Some("engine reported end of stream before starting".to_string());
                JobState::Error
            }
            (_, Transition::Failed(detail)) => {
                self.detail = Some(detail);
                JobState::Error
            }
            (_, Transition::Aborted) => JobState::Aborted,
            (_, _) => return TransitionOutcome::Ignored,
        };

        self.state = to;
        if to.stopped() {
            self.stop_time = Some(now);
        }
        TransitionOutcome::Changed(from, to)
    }

    /// Records the cumulative processed frame count. Ignored once stopped.
    pub fn record_frames(&mut self, frames: u64) {
        if !self.state.stopped() {
            self.frames = self.frames.max(frames);
        }
    }

    pub fn record_latency(&mut self, latency: Duration) {
        if !self.state.stopped() {
            self.latency_total += latency;
            self.latency_samples += 1;
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Seconds between start and stop (or `now` while running), never negative.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> Option<f64> {
        let start = self.start_time?;
        let end = if self.state.stopped() {
            self.stop_time.unwrap_or(now)
        } else {
            now
        };
        Some((end - start).num_milliseconds().max(0) as f64 / 1000.0)
    }

    /// Frames per second over the elapsed time; 0 before any frame.
    pub fn avg_fps(&self, now: DateTime<Utc>) -> f64 {
        match self.elapsed_secs(now) {
            Some(elapsed) if self.frames > 0 && elapsed > 0.0 => self.frames as f64 / elapsed,
            _ => 0.0,
        }
    }

    /// Mean latency in seconds, if any samples were recorded.
    pub fn avg_latency_secs(&self) -> Option<f64> {
        if self.latency_samples == 0 {
            return None;
        }
        Some(self.latency_total.as_secs_f64() / self.latency_samples as f64)
    }

    pub fn status(&self, id: &str, now: DateTime<Utc>) -> JobStatus {
        JobStatus {
            id: id.to_string(),
            state: self.state,
            avg_fps: self.avg_fps(now),
            start_time: self.start_time,
            elapsed_time: self.elapsed_secs(now),
            avg_pipeline_latency: self.avg_latency_secs(),
            message: self.detail.clone(),
        }
    }
}
