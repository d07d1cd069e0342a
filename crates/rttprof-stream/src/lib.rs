//! # rttprof-stream
//!
//! Async engine that talks to the profiler firmware over RTT.
//!
//! Asks the device for its event descriptions, switches it to logging, and
//! turns the raw data stream into timestamped events until the logging period
//! ends, the user stops it, or the probe goes away.
//!
//! ## Architecture
//! ```text
//! ByteChannel (probe transport: info / data / command)
//!       │
//!       ▼
//! BufferedReader (chunk queue, exact-size reads, polling cadence)
//!       │
//!       ├──▶ read_descriptions ──▶ EventTypeRegistry
//!       │
//!       ▼
//! EventDecoder (schema lookup + TimestampTracker)
//!       │
//!       ▼
//! StreamController ──▶ EventLog ──▶ EventLogWriter
//!       │
//!       ▼
//! mpsc::Sender<StreamMessage>   ← optional live consumer
//! ```

pub mod channel;
pub mod consumer;
pub mod controller;
pub mod decoder;
pub mod negotiation;
pub mod persist;
pub mod reader;
pub mod signal;

pub use channel::{ByteChannel, MemoryChannel};
pub use consumer::{consumer_channel, ConsumerHandle, StreamMessage};
pub use controller::{StreamController, StreamReport, StreamState, StreamStats, Termination};
pub use decoder::EventDecoder;
pub use negotiation::read_descriptions;
pub use persist::{EventLogWriter, JsonFileWriter};
pub use reader::{BufferedReader, RawByteQueue, ReaderConfig, ReaderStats};
pub use signal::StopSignal;
