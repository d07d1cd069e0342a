//! # rttprof-observability
//!
//! Logging for the RTT profiler host.
//!
//! ## Structured logging
//! Human-readable text by default, JSON lines for log collectors.
//! Levels are configurable per component (`rttprof_stream=debug` shows every
//! chunk pulled off the probe and every state transition).
//!
//! ## Session summary
//! [`log_session_summary`] emits one line with the counters of a finished
//! session.

pub mod summary;
pub mod tracing_setup;

pub use summary::log_session_summary;
pub use tracing_setup::{init_tracing, LogConfig};
