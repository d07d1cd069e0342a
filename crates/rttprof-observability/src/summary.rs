//! One-line report of a finished session.

use rttprof_stream::{StreamReport, Termination};
use tracing::{info, warn};

/// Log the outcome and counters of `report`.
pub fn log_session_summary(report: &StreamReport) {
    let stats = &report.stats;
    let outcome = outcome(&report.termination);
    if stats.bytes_dropped > 0 {
        warn!(
            "Session {}: {} events from {} bytes in {} reads, {} timestamp overflows, {} bytes dropped",
            outcome,
            stats.events_decoded,
            stats.bytes_read,
            stats.channel_reads,
            stats.timestamp_overflows,
            stats.bytes_dropped
        );
    } else {
        info!(
            "Session {}: {} events from {} bytes in {} reads, {} timestamp overflows",
            outcome,
            stats.events_decoded,
            stats.bytes_read,
            stats.channel_reads,
            stats.timestamp_overflows
        );
    }
}

fn outcome(termination: &Termination) -> String {
    match termination {
        Termination::Completed => "completed".to_string(),
        Termination::Cancelled => "cancelled".to_string(),
        Termination::TransportFailure { reason } => format!("ended by transport failure ({reason})"),
    }
}
