//! `BufferedReader`: exact-size reads on top of a bursty chunked transport.
//!
//! The device pushes data in bursts of arbitrary size. The reader keeps every
//! pulled chunk in a [`RawByteQueue`] and hands out exactly the number of
//! bytes the decoder asks for, splitting a chunk when a request ends inside it.

use bytes::{Bytes, BytesMut};
use rttprof_core::{Channel, Interrupt, ProfilerConfig, RegistryError, StreamError};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info};

use crate::channel::ByteChannel;
use crate::signal::StopSignal;

/// Ordered byte chunks with a running total. Consumption only removes from
/// the front.
#[derive(Debug, Default)]
pub struct RawByteQueue {
    chunks: VecDeque<Bytes>,
    len: usize,
}

impl RawByteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Return bytes to the front of the queue, ahead of everything buffered.
    pub fn push_front(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.chunks.push_front(chunk);
    }

    /// Remove exactly `n` bytes from the front, or nothing if fewer are queued.
    pub fn pop_exact(&mut self, n: usize) -> Option<Bytes> {
        if n > self.len {
            return None;
        }
        if n == 0 {
            return Some(Bytes::new());
        }

        if let Some(front) = self.chunks.front_mut() {
            if front.len() >= n {
                let out = front.split_to(n);
                if front.is_empty() {
                    self.chunks.pop_front();
                }
                self.len -= n;
                return Some(out);
            }
        }

        let mut out = BytesMut::with_capacity(n);
        while out.len() < n {
            let Some(mut front) = self.chunks.pop_front() else {
                break;
            };
            let want = n - out.len();
            if front.len() > want {
                out.extend_from_slice(&front.split_to(want));
                self.chunks.push_front(front);
            } else {
                out.extend_from_slice(&front);
            }
        }
        self.len -= n;
        Some(out.freeze())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Read-loop tuning taken from [`ProfilerConfig`].
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub chunk_size: usize,
    pub additional_read_threshold: usize,
    pub read_period: Duration,
    pub idle_sleep: Duration,
    pub info_poll: Duration,
}

impl From<&ProfilerConfig> for ReaderConfig {
    fn from(cfg: &ProfilerConfig) -> Self {
        Self {
            chunk_size: cfg.read_chunk_size.max(1),
            additional_read_threshold: cfg.additional_read_threshold,
            read_period: cfg.read_period(),
            idle_sleep: cfg.idle_sleep(),
            info_poll: cfg.info_poll(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Pull from the transport whenever the buffer runs short.
    Live,
    /// Serve only what is already buffered.
    Draining,
}

/// Running totals kept by the reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub bytes_read: u64,
    pub channel_reads: u64,
}

/// Exact-size blocking reads over a [`ByteChannel`].
pub struct BufferedReader<C> {
    channel: C,
    config: ReaderConfig,
    stop: StopSignal,
    queue: RawByteQueue,
    /// Info-channel bytes not yet split into lines
    text: Vec<u8>,
    mode: Mode,
    last_pull: Option<Instant>,
    deadline: Option<Instant>,
    /// Bytes handed out since `begin_record`, kept so an interrupted record
    /// can be put back
    journal: Option<Vec<Bytes>>,
    stats: ReaderStats,
}

impl<C: ByteChannel> BufferedReader<C> {
    pub fn new(channel: C, config: ReaderConfig, stop: StopSignal) -> Self {
        Self {
            channel,
            config,
            stop,
            queue: RawByteQueue::new(),
            text: Vec::new(),
            mode: Mode::Live,
            last_pull: None,
            deadline: None,
            journal: None,
            stats: ReaderStats::default(),
        }
    }

    /// Block until exactly `n` bytes are buffered, then take them.
    ///
    /// While live, this polls the transport until satisfied, the stop signal
    /// fires, the deadline passes, or a transport read fails. While draining
    /// it never touches the transport and reports a short buffer as
    /// [`StreamError::Truncated`].
    pub async fn read_exact(&mut self, n: usize) -> Result<Bytes, StreamError> {
        if self.mode == Mode::Live {
            self.fill(n).await?;
        }
        let out = self.queue.pop_exact(n).ok_or(StreamError::Truncated {
            remaining: self.queue.len(),
        })?;
        if let Some(journal) = self.journal.as_mut() {
            journal.push(out.clone());
        }
        Ok(out)
    }

    async fn fill(&mut self, n: usize) -> Result<(), Interrupt> {
        loop {
            let now = Instant::now();
            let pulled_recently = self
                .last_pull
                .is_some_and(|at| now.duration_since(at) < self.config.read_period);
            if pulled_recently && self.queue.len() >= n {
                return Ok(());
            }

            let pulled = self.pull(Channel::Data).await?;
            // Still bursting: drain the backlog before anything else.
            if pulled > self.config.additional_read_threshold {
                continue;
            }
            self.last_pull = Some(now);

            if self.queue.len() >= n {
                return Ok(());
            }
            self.check_interrupt()?;
            sleep(self.config.idle_sleep).await;
        }
    }

    async fn pull(&mut self, channel: Channel) -> Result<usize, Interrupt> {
        let chunk = match self.channel.read(channel, self.config.chunk_size).await {
            Ok(chunk) => chunk,
            Err(e) => {
                error!("Problem with reading RTT data: {e}");
                return Err(Interrupt::Transport(e));
            }
        };
        let len = chunk.len();
        self.stats.channel_reads += 1;
        self.stats.bytes_read += len as u64;
        if len > 0 {
            debug!("Pulled {len} bytes from {channel} channel");
        }
        match channel {
            Channel::Info => self.text.extend_from_slice(&chunk),
            _ => self.queue.push(chunk),
        }
        Ok(len)
    }

    fn check_interrupt(&self) -> Result<(), Interrupt> {
        if self.stop.is_triggered() {
            info!("Stop requested, leaving read loop");
            return Err(Interrupt::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            info!("Logging period elapsed, leaving read loop");
            return Err(Interrupt::DeadlineElapsed);
        }
        Ok(())
    }

    /// Read one newline-terminated record from the info channel, without the
    /// newline.
    pub async fn read_line(&mut self) -> Result<String, StreamError> {
        loop {
            if let Some(pos) = self.text.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = self.text.drain(..=pos).collect();
                line.pop();
                return String::from_utf8(line).map_err(|_| RegistryError::InvalidUtf8.into());
            }
            self.check_interrupt()?;
            if self.pull(Channel::Info).await? == 0 {
                sleep(self.config.info_poll).await;
            }
        }
    }

    /// Pull from the data channel until it comes back empty or fails.
    /// Returns the number of bytes added to the buffer.
    pub async fn flush_channel(&mut self) -> usize {
        let mut total = 0;
        loop {
            match self.pull(Channel::Data).await {
                Ok(0) => break,
                Ok(n) => total += n,
                // Already logged by `pull`; keep what we have.
                Err(_) => break,
            }
        }
        total
    }

    /// Stop pulling from the transport; later reads are served from the buffer only.
    pub fn start_draining(&mut self) {
        self.mode = Mode::Draining;
    }

    /// Give up waiting for data once `deadline` has passed.
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    /// Start journaling consumed bytes for the record about to be decoded.
    pub fn begin_record(&mut self) {
        self.journal = Some(Vec::new());
    }

    /// The record decoded completely; forget its bytes.
    pub fn commit_record(&mut self) {
        self.journal = None;
    }

    /// The record was cut short; put its bytes back at the front of the buffer.
    pub fn rollback_record(&mut self) {
        if let Some(journal) = self.journal.take() {
            for chunk in journal.into_iter().rev() {
                self.queue.push_front(chunk);
            }
        }
    }

    /// Bytes buffered and not yet handed out.
    pub fn buffered(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;

    fn config() -> ReaderConfig {
        ReaderConfig {
            chunk_size: 64,
            additional_read_threshold: 32,
            read_period: Duration::from_millis(50),
            idle_sleep: Duration::from_millis(50),
            info_poll: Duration::from_millis(100),
        }
    }

    fn reader(ch: &MemoryChannel) -> BufferedReader<MemoryChannel> {
        BufferedReader::new(ch.clone(), config(), StopSignal::new())
    }

    #[test]
    fn queue_splits_front_chunk() {
        let mut q = RawByteQueue::new();
        q.push(Bytes::from_static(&[1, 2, 3]));
        q.push(Bytes::from_static(&[4, 5]));
        q.push(Bytes::new());
        assert_eq!(q.len(), 5);
        assert_eq!(q.chunks.len(), 2);

        assert_eq!(q.pop_exact(2).unwrap().as_ref(), &[1, 2]);
        assert_eq!(q.len(), 3);
        assert_eq!(q.pop_exact(2).unwrap().as_ref(), &[3, 4]);
        assert_eq!(q.chunks.len(), 1);
        assert!(q.pop_exact(2).is_none());
        assert_eq!(q.pop_exact(1).unwrap().as_ref(), &[5]);
        assert!(q.is_empty());
        assert!(q.chunks.is_empty());
    }

    #[test]
    fn queue_push_front_restores_order() {
        let mut q = RawByteQueue::new();
        q.push(Bytes::from_static(&[1, 2, 3, 4]));
        let a = q.pop_exact(1).unwrap();
        let b = q.pop_exact(2).unwrap();
        q.push_front(b);
        q.push_front(a);
        assert_eq!(q.pop_exact(4).unwrap().as_ref(), &[1, 2, 3, 4]);
    }

    proptest::proptest! {
        #[test]
        fn queue_output_ignores_chunking(
            bytes in proptest::collection::vec(proptest::num::u8::ANY, 0..256),
            chunk in 1usize..32,
            request in 1usize..16,
        ) {
            let mut q = RawByteQueue::new();
            for c in bytes.chunks(chunk) {
                q.push(Bytes::copy_from_slice(c));
            }
            let mut out = Vec::new();
            while let Some(b) = q.pop_exact(request.min(q.len().max(1))) {
                out.extend_from_slice(&b);
                if q.is_empty() {
                    break;
                }
            }
            proptest::prop_assert_eq!(out, bytes);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn read_exact_spans_chunks() {
        let ch = MemoryChannel::new().ungated();
        ch.push_data(vec![1u8, 2]);
        ch.push_data(vec![3u8]);
        ch.push_data(vec![4u8, 5, 6]);
        let mut r = reader(&ch);

        assert_eq!(r.read_exact(4).await.unwrap().as_ref(), &[1, 2, 3, 4]);
        assert_eq!(r.read_exact(2).await.unwrap().as_ref(), &[5, 6]);
        assert_eq!(r.stats().bytes_read, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn read_exact_waits_for_late_data() {
        let ch = MemoryChannel::new().ungated();
        let mut r = reader(&ch);
        let feeder = ch.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(500)).await;
            feeder.push_data(vec![7u8, 8, 9]);
        });

        let started = Instant::now();
        assert_eq!(r.read_exact(3).await.unwrap().as_ref(), &[7, 8, 9]);
        assert!(started.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn bursting_chunks_are_pulled_back_to_back() {
        let ch = MemoryChannel::new().ungated();
        // Three full chunks above the threshold, then a short tail.
        ch.push_data(vec![0u8; 64 * 3 + 10]);
        let mut r = reader(&ch);

        let started = Instant::now();
        r.read_exact(1).await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(ch.pending_data(), 0);
        assert_eq!(r.buffered(), 64 * 3 + 9);
    }

    #[tokio::test(start_paused = true)]
    async fn buffered_reads_skip_the_transport_within_the_period() {
        let ch = MemoryChannel::new().ungated();
        ch.push_data(vec![1u8, 2, 3, 4]);
        let mut r = reader(&ch);

        r.read_exact(1).await.unwrap();
        let reads = ch.data_reads();
        r.read_exact(1).await.unwrap();
        r.read_exact(1).await.unwrap();
        assert_eq!(ch.data_reads(), reads);

        tokio::time::advance(Duration::from_millis(60)).await;
        r.read_exact(1).await.unwrap();
        assert_eq!(ch.data_reads(), reads + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_signal_interrupts_a_starved_read() {
        let ch = MemoryChannel::new().ungated();
        ch.push_data(vec![1u8]);
        let stop = StopSignal::new();
        let mut r = BufferedReader::new(ch.clone(), config(), stop.clone());
        let trigger = stop.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            trigger.trigger();
        });

        let err = r.read_exact(2).await.unwrap_err();
        assert!(matches!(err, StreamError::Interrupted(Interrupt::Cancelled)));
        assert_eq!(r.buffered(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_a_starved_read() {
        let ch = MemoryChannel::new().ungated();
        let mut r = reader(&ch);
        r.set_deadline(Some(Instant::now() + Duration::from_millis(200)));
        let err = r.read_exact(1).await.unwrap_err();
        assert!(matches!(
            err,
            StreamError::Interrupted(Interrupt::DeadlineElapsed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_surfaces_as_interrupt() {
        let ch = MemoryChannel::new().ungated();
        ch.fail_read_after(Channel::Data, 0);
        let mut r = reader(&ch);
        let err = r.read_exact(1).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test(start_paused = true)]
    async fn draining_never_touches_the_transport() {
        let ch = MemoryChannel::new().ungated();
        ch.push_data(vec![1u8, 2, 3]);
        let mut r = reader(&ch);
        r.read_exact(1).await.unwrap();
        ch.push_data(vec![4u8]);

        r.start_draining();
        let reads = ch.data_reads();
        assert_eq!(r.read_exact(2).await.unwrap().as_ref(), &[2, 3]);
        assert!(matches!(
            r.read_exact(1).await,
            Err(StreamError::Truncated { remaining: 0 })
        ));
        assert_eq!(ch.data_reads(), reads);
        assert_eq!(ch.pending_data(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rollback_restores_a_partial_record() {
        let ch = MemoryChannel::new().ungated();
        ch.push_data(vec![1u8, 2, 3, 4, 5]);
        let mut r = reader(&ch);

        r.begin_record();
        r.read_exact(1).await.unwrap();
        r.read_exact(3).await.unwrap();
        r.rollback_record();
        assert_eq!(r.buffered(), 5);

        r.begin_record();
        assert_eq!(r.read_exact(5).await.unwrap().as_ref(), &[1, 2, 3, 4, 5]);
        r.commit_record();
        r.rollback_record();
        assert_eq!(r.buffered(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_collects_everything_pending() {
        let ch = MemoryChannel::new().ungated();
        ch.push_data_chunked(&[9u8; 150], 10);
        let mut r = reader(&ch);
        assert_eq!(r.flush_channel().await, 150);
        assert_eq!(r.buffered(), 150);
        assert_eq!(ch.pending_data(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn lines_are_reassembled_across_chunks() {
        let ch = MemoryChannel::new().ungated();
        ch.push_info(&b"evtA,0,u8,va"[..]);
        ch.push_info(&b"lue\n\nrest"[..]);
        let mut r = reader(&ch);
        assert_eq!(r.read_line().await.unwrap(), "evtA,0,u8,value");
        assert_eq!(r.read_line().await.unwrap(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_utf8_line_is_a_registry_error() {
        let ch = MemoryChannel::new().ungated();
        ch.push_info(vec![0xffu8, 0xfe, b'\n']);
        let mut r = reader(&ch);
        assert!(matches!(
            r.read_line().await,
            Err(StreamError::Registry(RegistryError::InvalidUtf8))
        ));
    }
}
