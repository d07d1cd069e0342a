//! Profiler host configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Endianness of every integer on the data channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl ByteOrder {
    /// Read an unsigned integer of up to four bytes.
    pub fn read_uint(self, bytes: &[u8]) -> u32 {
        match self {
            ByteOrder::Little => bytes
                .iter()
                .rev()
                .fold(0u32, |acc, &b| (acc << 8) | u32::from(b)),
            ByteOrder::Big => bytes
                .iter()
                .fold(0u32, |acc, &b| (acc << 8) | u32::from(b)),
        }
    }

    /// Append the low `width` bytes of `value`.
    pub fn write_uint(self, value: u32, width: usize, out: &mut Vec<u8>) {
        let le = value.to_le_bytes();
        match self {
            ByteOrder::Little => out.extend_from_slice(&le[..width]),
            ByteOrder::Big => out.extend(le[..width].iter().rev()),
        }
    }
}

/// Names of the RTT channels on the device, resolved by the connection layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelNames {
    #[serde(default = "default_info_channel")]
    pub info: String,
    #[serde(default = "default_data_channel")]
    pub data: String,
    #[serde(default = "default_command_channel")]
    pub command: String,
}

fn default_info_channel() -> String { "rtt_info".into() }
fn default_data_channel() -> String { "rtt_data".into() }
fn default_command_channel() -> String { "rtt_commands".into() }

impl Default for ChannelNames {
    fn default() -> Self {
        Self {
            info: default_info_channel(),
            data: default_data_channel(),
            command: default_command_channel(),
        }
    }
}

/// Top-level profiler host configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilerConfig {
    /// Milliseconds per raw timestamp tick (32.768 kHz RTC by default)
    #[serde(default = "default_ms_per_tick")]
    pub ms_per_timestamp_tick: f64,
    /// Modulus of the device's wrapping tick counter
    #[serde(default = "default_timestamp_raw_max")]
    pub timestamp_raw_max: u32,
    /// Endianness of ids, ticks and integer fields
    #[serde(default)]
    pub byte_order: ByteOrder,
    /// Largest chunk requested from the transport in one read
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
    /// A chunk larger than this means the device is still bursting; read again at once
    #[serde(default = "default_additional_read_threshold")]
    pub additional_read_threshold: usize,
    /// Minimum interval between transport reads while enough data is buffered
    #[serde(default = "default_read_period_ms")]
    pub read_period_ms: u64,
    /// Sleep between polls when the buffer cannot satisfy a read
    #[serde(default = "default_idle_sleep_ms")]
    pub idle_sleep_ms: u64,
    /// Sleep between polls of the info channel during negotiation
    #[serde(default = "default_info_poll_ms")]
    pub info_poll_ms: u64,
    /// Capacity of the consumer hand-off queue
    #[serde(default = "default_consumer_capacity")]
    pub consumer_capacity: usize,
    #[serde(default)]
    pub channel_names: ChannelNames,
    /// Debug probe serial number; `None` picks the only probe attached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_snr: Option<u64>,
    /// Reset the target before starting RTT
    #[serde(default)]
    pub reset_on_start: bool,
}

fn default_ms_per_tick() -> f64 { 1000.0 / 32768.0 }
fn default_timestamp_raw_max() -> u32 { 1 << 24 }
fn default_read_chunk_size() -> usize { 2048 }
fn default_additional_read_threshold() -> usize { 512 }
fn default_read_period_ms() -> u64 { 50 }
fn default_idle_sleep_ms() -> u64 { 50 }
fn default_info_poll_ms() -> u64 { 100 }
fn default_consumer_capacity() -> usize { 1_024 }

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            ms_per_timestamp_tick: default_ms_per_tick(),
            timestamp_raw_max: default_timestamp_raw_max(),
            byte_order: ByteOrder::default(),
            read_chunk_size: default_read_chunk_size(),
            additional_read_threshold: default_additional_read_threshold(),
            read_period_ms: default_read_period_ms(),
            idle_sleep_ms: default_idle_sleep_ms(),
            info_poll_ms: default_info_poll_ms(),
            consumer_capacity: default_consumer_capacity(),
            channel_names: ChannelNames::default(),
            device_snr: None,
            reset_on_start: false,
        }
    }
}

impl ProfilerConfig {
    pub fn read_period(&self) -> Duration {
        Duration::from_millis(self.read_period_ms)
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }

    pub fn info_poll(&self) -> Duration {
        Duration::from_millis(self.info_poll_ms)
    }
}
