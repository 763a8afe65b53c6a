//! Types reported by the pipeline manager.

use serde::Serialize;

/// Admission bookkeeping snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// Configured ceiling; `None` means unbounded.
    pub max_running: Option<usize>,
    /// Instances holding a run slot.
    pub running: usize,
    /// Instances waiting for a slot.
    pub queued: usize,
    /// Instances known to the manager, live or finished.
    pub instances: usize,
}
