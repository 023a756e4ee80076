//! Run statistics display
//!
//! The summary goes to stderr; stdout is reserved for the document stream.

use crate::state::{RunSummary, StopReason};
use std::fmt::Write;

/// Renders a run summary as human-readable text
pub fn format_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let attempted = summary.pages_fetched + summary.pages_failed;
    let success_rate = if attempted > 0 {
        (summary.pages_fetched as f64 / attempted as f64) * 100.0
    } else {
        0.0
    };
    let secs = summary.duration.as_secs_f64();
    let rate = if secs > 0.0 {
        summary.pages_fetched as f64 / secs
    } else {
        0.0
    };

    let _ = writeln!(out, "=== Run Summary ===\n");
    let _ = writeln!(out, "Run: {}", summary.run_id);
    let _ = writeln!(out, "Stopped: {}", summary.stopped_reason);
    let _ = writeln!(out, "Duration: {:.2}s ({:.2} pages/sec)", secs, rate);
    let _ = writeln!(out);
    let _ = writeln!(out, "Pages:");
    let _ = writeln!(out, "  Fetched: {}", summary.pages_fetched);
    let _ = writeln!(out, "  Failed: {}", summary.pages_failed);
    let _ = writeln!(out, "  Extraction failures: {}", summary.extract_failures);
    let _ = writeln!(out, "  Documents emitted: {}", summary.documents_emitted);
    let _ = writeln!(out);
    let _ = write!(
        out,
        "Success Rate: {:.1}% ({} / {} pages fetched)",
        success_rate, summary.pages_fetched, attempted
    );

    if summary.stopped_reason == StopReason::Cancelled {
        let _ = write!(out, "\nThe run was cancelled; the document stream is incomplete.");
    }

    out
}

/// Prints a run summary to stderr
pub fn print_summary(summary: &RunSummary) {
    eprintln!("{}", format_summary(summary));
}
