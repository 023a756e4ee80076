//! Output module: sinks for the document stream and run summaries
//!
//! This module handles:
//! - The `DocumentSink` trait consumed by `ScrapeRun::drain_into`
//! - In-memory and JSON Lines sinks
//! - Printing the final run summary

mod jsonl;
mod memory;
pub mod stats;
mod traits;

pub use jsonl::JsonLinesSink;
pub use memory::MemorySink;
pub use stats::print_summary;
pub use traits::{DocumentSink, SinkError, SinkResult};
