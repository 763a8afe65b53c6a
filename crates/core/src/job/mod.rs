//! Instance state machine and status derivation.

mod state;
mod status;

pub use state::{JobState, JobStateMachine, Transition, TransitionOutcome};
pub use status::{JobParameters, JobStatus};
