//! State module for tracking run progress
//!
//! # Components
//!
//! - `RunState`: atomic per-run counters and the stop reason
//! - `HostState`: per-host token bucket used for politeness
//! - `RunSummary`: final statistics exposed once a run ends

mod host_state;
mod run_state;

pub use host_state::HostState;
pub use run_state::{RunState, RunSummary, StopReason};
