//! `ByteChannel` trait: abstraction over the debug-probe RTT transport.
//!
//! Opening the probe, finding the RTT control block and resolving channel
//! names to indices happen before the engine sees the transport. From then on
//! the engine owns it exclusively and only ever has one read in flight.

use async_trait::async_trait;
use bytes::Bytes;
use rttprof_core::{Channel, Command, TransportError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Duplex, packet-chunked byte transport with named logical channels.
#[async_trait]
pub trait ByteChannel: Send {
    /// Read whatever is pending on an up channel, at most `max_len` bytes.
    /// An empty result means nothing is pending right now.
    async fn read(&mut self, channel: Channel, max_len: usize) -> Result<Bytes, TransportError>;

    /// Write to a down channel.
    async fn write(&mut self, channel: Channel, data: &[u8]) -> Result<(), TransportError>;

    /// Stop RTT and release the probe.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Identifier used in log lines.
    fn name(&self) -> &str {
        "rtt"
    }
}

#[derive(Default)]
struct Inner {
    info: VecDeque<Bytes>,
    data: VecDeque<Bytes>,
    gated: bool,
    info_released: bool,
    data_released: bool,
    commands: Vec<Command>,
    info_reads: usize,
    data_reads: usize,
    fail_read_at: Option<(Channel, usize)>,
    closed: bool,
    close_calls: usize,
}

impl Inner {
    fn queue(&mut self, channel: Channel) -> Option<&mut VecDeque<Bytes>> {
        match channel {
            Channel::Info if !self.gated || self.info_released => Some(&mut self.info),
            Channel::Data if !self.gated || self.data_released => Some(&mut self.data),
            _ => None,
        }
    }

    fn reads_mut(&mut self, channel: Channel) -> Option<&mut usize> {
        match channel {
            Channel::Info => Some(&mut self.info_reads),
            Channel::Data => Some(&mut self.data_reads),
            Channel::Command => None,
        }
    }
}

/// In-memory transport scripted with chunks per channel.
///
/// By default it behaves like the profiler firmware: the info stream is only
/// released after an INFO command and the data stream after START. Cloning
/// gives another handle to the same device, so a test can keep feeding or
/// inspecting it while the engine owns the transport.
#[derive(Clone)]
pub struct MemoryChannel {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                gated: true,
                ..Inner::default()
            })),
        }
    }

    /// Make every queued chunk readable without waiting for commands.
    pub fn ungated(self) -> Self {
        self.lock().gated = false;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means a test thread panicked mid-update.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue one chunk on the info channel.
    pub fn push_info(&self, chunk: impl Into<Bytes>) {
        let chunk = chunk.into();
        if !chunk.is_empty() {
            self.lock().info.push_back(chunk);
        }
    }

    /// Queue one chunk on the data channel.
    pub fn push_data(&self, chunk: impl Into<Bytes>) {
        let chunk = chunk.into();
        if !chunk.is_empty() {
            self.lock().data.push_back(chunk);
        }
    }

    /// Queue `bytes` on the data channel split into chunks of `chunk_size`.
    pub fn push_data_chunked(&self, bytes: &[u8], chunk_size: usize) {
        for chunk in bytes.chunks(chunk_size.max(1)) {
            self.push_data(Bytes::copy_from_slice(chunk));
        }
    }

    /// Make the read on `channel` after `reads` successful ones fail.
    pub fn fail_read_after(&self, channel: Channel, reads: usize) {
        self.lock().fail_read_at = Some((channel, reads));
    }

    /// Commands written so far, in order.
    pub fn commands(&self) -> Vec<Command> {
        self.lock().commands.clone()
    }

    pub fn pending_data(&self) -> usize {
        self.lock().data.iter().map(Bytes::len).sum()
    }

    pub fn data_reads(&self) -> usize {
        self.lock().data_reads
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn close_calls(&self) -> usize {
        self.lock().close_calls
    }
}

#[async_trait]
impl ByteChannel for MemoryChannel {
    async fn read(&mut self, channel: Channel, max_len: usize) -> Result<Bytes, TransportError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(TransportError::Closed);
        }
        if channel == Channel::Command {
            return Err(TransportError::Read {
                channel,
                reason: "command channel is write-only".into(),
            });
        }
        let done = inner.reads_mut(channel).map_or(0, |reads| *reads);
        if inner.fail_read_at == Some((channel, done)) {
            inner.fail_read_at = None;
            return Err(TransportError::Read {
                channel,
                reason: "target stopped responding".into(),
            });
        }
        if let Some(reads) = inner.reads_mut(channel) {
            *reads += 1;
        }

        let Some(queue) = inner.queue(channel) else {
            return Ok(Bytes::new());
        };
        let Some(mut chunk) = queue.pop_front() else {
            return Ok(Bytes::new());
        };
        if chunk.len() > max_len {
            let rest = chunk.split_off(max_len);
            queue.push_front(rest);
        }
        Ok(chunk)
    }

    async fn write(&mut self, channel: Channel, data: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(TransportError::Closed);
        }
        if channel != Channel::Command {
            return Err(TransportError::Write {
                channel,
                reason: "only the command channel accepts writes".into(),
            });
        }
        for &byte in data {
            let command = Command::from_byte(byte).ok_or_else(|| TransportError::Write {
                channel,
                reason: format!("unknown command byte {byte}"),
            })?;
            match command {
                Command::Info => inner.info_released = true,
                Command::Start => inner.data_released = true,
                Command::Stop => {}
            }
            inner.commands.push(command);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.close_calls += 1;
        if inner.closed {
            return Err(TransportError::Closed);
        }
        inner.closed = true;
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn data_is_held_until_start() {
        let mut ch = MemoryChannel::new();
        ch.push_data(vec![1u8, 2, 3]);
        assert!(ch.read(Channel::Data, 16).await.unwrap().is_empty());

        ch.write(Channel::Command, &[Command::Start.as_byte()]).await.unwrap();
        assert_eq!(ch.read(Channel::Data, 16).await.unwrap().as_ref(), &[1, 2, 3]);
        assert_eq!(ch.commands(), vec![Command::Start]);
    }

    #[tokio::test]
    async fn reads_are_capped_at_max_len() {
        let mut ch = MemoryChannel::new().ungated();
        ch.push_data(vec![1u8, 2, 3, 4, 5]);
        assert_eq!(ch.read(Channel::Data, 2).await.unwrap().as_ref(), &[1, 2]);
        assert_eq!(ch.pending_data(), 3);
        assert_eq!(ch.read(Channel::Data, 8).await.unwrap().as_ref(), &[3, 4, 5]);
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let mut ch = MemoryChannel::new().ungated();
        ch.fail_read_after(Channel::Data, 1);
        assert!(ch.read(Channel::Data, 8).await.is_ok());
        assert!(ch.read(Channel::Data, 8).await.is_err());
        assert!(ch.read(Channel::Data, 8).await.is_ok());
    }

    #[tokio::test]
    async fn injected_failure_only_hits_its_channel() {
        let mut ch = MemoryChannel::new().ungated();
        ch.push_info(&b"evtA,0\n"[..]);
        ch.fail_read_after(Channel::Info, 0);
        assert!(ch.read(Channel::Data, 8).await.is_ok());
        assert!(matches!(
            ch.read(Channel::Info, 8).await,
            Err(TransportError::Read {
                channel: Channel::Info,
                ..
            })
        ));
        assert_eq!(ch.read(Channel::Info, 8).await.unwrap().as_ref(), b"evtA,0\n");
    }

    #[tokio::test]
    async fn close_is_reported_twice() {
        let mut ch = MemoryChannel::new();
        let device = ch.clone();
        ch.close().await.unwrap();
        assert!(matches!(ch.close().await, Err(TransportError::Closed)));
        assert!(device.is_closed());
        assert_eq!(device.close_calls(), 2);
        assert!(ch.write(Channel::Command, &[1]).await.is_err());
    }

    #[tokio::test]
    async fn unknown_command_bytes_are_rejected() {
        let mut ch = MemoryChannel::new();
        assert!(ch.write(Channel::Command, &[9]).await.is_err());
        assert!(ch.write(Channel::Data, &[1]).await.is_err());
    }
}
