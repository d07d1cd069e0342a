//! `StreamController`: drives one profiling session from INFO to shutdown.
//!
//! ```text
//! INIT ──INFO──▶ NEGOTIATING ──START──▶ LOGGING ──STOP──▶ DRAINING ──▶ TERMINATED
//! ```
//!
//! Every way out of LOGGING (period elapsed, stop signal, transport failure)
//! goes through the same shutdown: STOP, one last flush of the data channel,
//! close the transport, decode what is buffered, persist, end the consumer
//! stream.

use rttprof_core::{
    Channel, Command, Event, EventLog, EventTypeRegistry, Interrupt, ProfilerConfig, StreamError,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::channel::ByteChannel;
use crate::consumer::ConsumerHandle;
use crate::decoder::EventDecoder;
use crate::negotiation::read_descriptions;
use crate::persist::EventLogWriter;
use crate::reader::{BufferedReader, ReaderConfig};
use crate::signal::StopSignal;

/// Protocol state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Init,
    Negotiating,
    Logging,
    Draining,
    Terminated,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Negotiating => write!(f, "negotiating"),
            Self::Logging => write!(f, "logging"),
            Self::Draining => write!(f, "draining"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Why the session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The logging period elapsed.
    Completed,
    /// The stop signal fired.
    Cancelled,
    /// The transport failed; everything buffered was still decoded.
    TransportFailure { reason: String },
}

impl From<Interrupt> for Termination {
    fn from(interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::Cancelled => Termination::Cancelled,
            Interrupt::DeadlineElapsed => Termination::Completed,
            Interrupt::Transport(e) => Termination::TransportFailure {
                reason: e.to_string(),
            },
        }
    }
}

/// Counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub events_decoded: u64,
    pub bytes_read: u64,
    pub channel_reads: u64,
    pub timestamp_overflows: u64,
    /// Buffered bytes thrown away because they could not form an event
    pub bytes_dropped: u64,
}

/// Final result of a session that ended in a controlled way.
#[derive(Debug)]
pub struct StreamReport {
    pub termination: Termination,
    pub log: EventLog,
    pub stats: StreamStats,
}

pub struct StreamController<C> {
    reader: BufferedReader<C>,
    config: ProfilerConfig,
    stop: StopSignal,
    state: StreamState,
    log: EventLog,
    consumer: ConsumerHandle,
    writer: Option<Box<dyn EventLogWriter>>,
    disconnected: bool,
    stats: StreamStats,
}

impl<C: ByteChannel> StreamController<C> {
    /// Take ownership of an open transport.
    pub fn new(channel: C, config: ProfilerConfig) -> Self {
        let stop = StopSignal::new();
        let reader = BufferedReader::new(channel, ReaderConfig::from(&config), stop.clone());
        Self {
            reader,
            config,
            stop,
            state: StreamState::Init,
            log: EventLog::default(),
            consumer: ConsumerHandle::detached(),
            writer: None,
            disconnected: false,
            stats: StreamStats::default(),
        }
    }

    /// Forward the registry, every event and the end marker to `consumer`.
    pub fn with_consumer(mut self, consumer: ConsumerHandle) -> Self {
        self.consumer = consumer;
        self
    }

    /// Persist the log through `writer` at termination.
    pub fn with_writer(mut self, writer: impl EventLogWriter + 'static) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    /// A handle that stops the session when triggered.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    fn transition(&mut self, next: StreamState) {
        debug!("Stream state {} -> {}", self.state, next);
        self.state = next;
    }

    /// Run the whole session.
    ///
    /// `duration` bounds the logging phase; `None` logs until the stop signal
    /// fires or the transport fails. Protocol errors (malformed description,
    /// unknown event id, truncated drain) still shut down, persist and end
    /// the consumer stream before they are returned.
    pub async fn run(mut self, duration: Option<Duration>) -> Result<StreamReport, StreamError> {
        let registry = match self.negotiate().await {
            Ok(registry) => registry,
            Err(StreamError::Interrupted(interrupt)) => {
                return self.shutdown(None, interrupt.into()).await;
            }
            Err(e) => {
                error!("Negotiation failed: {e}");
                self.abort(None).await;
                return Err(e);
            }
        };

        let mut decoder = EventDecoder::new(registry, &self.config);
        match self.log_events(&mut decoder, duration).await {
            Ok(termination) => self.shutdown(Some(&mut decoder), termination).await,
            Err(e) => {
                error!("Protocol desync while logging: {e}");
                self.abort(Some(&decoder)).await;
                Err(e)
            }
        }
    }

    /// INIT → NEGOTIATING: request and parse the event descriptions.
    pub async fn negotiate(&mut self) -> Result<Arc<EventTypeRegistry>, StreamError> {
        self.transition(StreamState::Negotiating);
        self.send_command(Command::Info).await;

        let registry = Arc::new(read_descriptions(&mut self.reader).await?);
        self.log.set_registry(Arc::clone(&registry));
        self.consumer.send_registry(Arc::clone(&registry)).await;

        info!("Received {} event descriptions", registry.len());
        info!("Ready to start logging events");
        Ok(registry)
    }

    async fn log_events(
        &mut self,
        decoder: &mut EventDecoder,
        duration: Option<Duration>,
    ) -> Result<Termination, StreamError> {
        info!("Start logging events data");
        self.transition(StreamState::Logging);
        self.send_command(Command::Start).await;

        let deadline = duration.map(|d| Instant::now() + d);
        self.reader.set_deadline(deadline);

        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(Termination::Completed);
            }
            if self.stop.is_triggered() {
                info!("Stop requested");
                return Ok(Termination::Cancelled);
            }
            match decoder.decode_one(&mut self.reader).await {
                Ok(event) => self.record(event).await,
                Err(StreamError::Interrupted(interrupt)) => return Ok(interrupt.into()),
                Err(e) => return Err(e),
            }
        }
    }

    async fn record(&mut self, event: Event) {
        if self.log.push(event.clone()) {
            self.stats.events_decoded += 1;
            self.consumer.send_event(event).await;
        }
    }

    /// Send STOP, flush what the device still has pending and close the
    /// transport. Safe to call more than once; failures are only logged.
    pub async fn disconnect(&mut self) {
        if self.disconnected {
            debug!("Already disconnected from {}", self.reader.channel_mut().name());
            return;
        }
        self.disconnected = true;

        self.send_command(Command::Stop).await;
        let flushed = self.reader.flush_channel().await;
        if flushed > 0 {
            debug!("Flushed {flushed} trailing bytes from the data channel");
        }

        match self.reader.channel_mut().close().await {
            Ok(()) => info!("Disconnected from device"),
            Err(e) => error!("Closing the transport failed ({e}), keeping collected data"),
        }
    }

    async fn send_command(&mut self, command: Command) {
        if self.disconnected {
            return;
        }
        let byte = [command.as_byte()];
        match self.reader.channel_mut().write(Channel::Command, &byte).await {
            Ok(()) => debug!("Sent {command} command"),
            Err(e) => error!("Problem with writing RTT data ({command}): {e}"),
        }
    }

    /// LOGGING → DRAINING → TERMINATED along the controlled path.
    async fn shutdown(
        mut self,
        decoder: Option<&mut EventDecoder>,
        termination: Termination,
    ) -> Result<StreamReport, StreamError> {
        match &termination {
            Termination::Completed => info!("Real time transmission closed"),
            Termination::Cancelled => info!("Real time transmission cancelled"),
            Termination::TransportFailure { reason } => {
                error!("Transport failed ({reason}), saving collected data")
            }
        }

        self.disconnect().await;
        self.transition(StreamState::Draining);
        self.reader.start_draining();

        let mut drained = Ok(());
        if let Some(decoder) = decoder {
            drained = self.drain(decoder).await;
            self.stats.timestamp_overflows = decoder.tracker().overflow_count();
        }

        let persisted = self.finish().await;
        drained?;
        persisted?;
        Ok(StreamReport {
            termination,
            stats: self.stats,
            log: self.log,
        })
    }

    /// Decode strictly from buffered bytes until none are left.
    async fn drain(&mut self, decoder: &mut EventDecoder) -> Result<(), StreamError> {
        while self.reader.buffered() > 0 {
            match decoder.decode_one(&mut self.reader).await {
                Ok(event) => self.record(event).await,
                Err(e) => {
                    let remaining = self.reader.buffered();
                    error!("Dropping {remaining} buffered bytes: {e}");
                    self.stats.bytes_dropped = remaining as u64;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Shutdown after a protocol desync: nothing buffered can be trusted.
    ///
    /// A failed save is only logged here; the caller reports the desync.
    async fn abort(&mut self, decoder: Option<&EventDecoder>) {
        self.disconnect().await;
        self.transition(StreamState::Draining);
        self.reader.start_draining();

        let remaining = self.reader.buffered();
        if remaining > 0 {
            error!("Dropping {remaining} buffered bytes after protocol desync");
        }
        self.stats.bytes_dropped = remaining as u64;
        if let Some(decoder) = decoder {
            self.stats.timestamp_overflows = decoder.tracker().overflow_count();
        }
        let _ = self.finish().await;
    }

    /// Freeze the log, persist it and end the consumer stream.
    async fn finish(&mut self) -> Result<(), StreamError> {
        let reader_stats = self.reader.stats();
        self.stats.bytes_read = reader_stats.bytes_read;
        self.stats.channel_reads = reader_stats.channel_reads;

        self.log.terminate();
        self.transition(StreamState::Terminated);

        let persisted = match &self.writer {
            Some(writer) => match writer.write(&self.log) {
                Ok(()) => {
                    info!("Events data saved ({} events)", self.log.len());
                    Ok(())
                }
                Err(e) => {
                    error!("Saving events data failed: {e}");
                    Err(e)
                }
            },
            None => Ok(()),
        };

        if self.log.is_empty() {
            warn!("Session ended without any events");
        }
        self.consumer.end().await;
        persisted
    }
}
