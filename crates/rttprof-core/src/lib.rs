//! # rttprof-core
//!
//! Protocol model shared by the RTT profiler host crates: the field kinds
//! a device may declare, the event schemas it announces during negotiation,
//! decoded events, and the wrap-around correction for the device clock.
//!
//! Nothing in this crate performs I/O. The async engine that pulls bytes off
//! the debug transport lives in `rttprof-stream`.

pub mod config;
pub mod encoder;
pub mod error;
pub mod event;
pub mod schema;
pub mod timestamp;
pub mod types;

pub use config::{ByteOrder, ChannelNames, ProfilerConfig};
pub use encoder::EventEncoder;
pub use error::{DecodeError, Interrupt, RegistryError, StreamError, TransportError};
pub use event::{Event, EventLog};
pub use schema::{parse_description, Description, EventType, EventTypeRegistry};
pub use timestamp::{TimestampState, TimestampTracker};
pub use types::{Channel, Command, FieldKind, FieldValue};
