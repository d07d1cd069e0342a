//! Error types for the RTT profiler pipeline.

use thiserror::Error;

use crate::types::Channel;

/// Errors raised by the byte transport underneath the engine.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("read from {channel} channel failed: {reason}")]
    Read { channel: Channel, reason: String },

    #[error("write to {channel} channel failed: {reason}")]
    Write { channel: Channel, reason: String },

    #[error("closing transport failed: {reason}")]
    Close { reason: String },

    #[error("transport already closed")]
    Closed,
}

/// Errors from parsing the event descriptions sent during negotiation.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("description record '{record}' has no id field")]
    MissingId { record: String },

    #[error("description record '{record}' has a non-numeric id '{id}'")]
    InvalidId { record: String, id: String },

    #[error("event id {id} does not fit in one byte")]
    IdOutOfRange { id: u64 },

    #[error("description record '{record}' has {count} type/label fields, expected an even count")]
    AsymmetricRecord { record: String, count: usize },

    #[error("unknown field type tag '{tag}' in event '{event}'")]
    UnknownTypeTag { event: String, tag: String },

    #[error("event id {id} registered twice ('{existing}' and '{incoming}')")]
    DuplicateId {
        id: u8,
        existing: String,
        incoming: String,
    },

    #[error("description stream is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors from decoding or encoding a single event record.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown event type id {id}")]
    UnknownEventType { id: u8 },

    #[error("string field is not valid UTF-8: {reason}")]
    InvalidUtf8 { reason: String },

    #[error("field {index} of event '{event}': expected {expected}, got {got}")]
    TypeMismatch {
        event: String,
        index: usize,
        expected: String,
        got: String,
    },

    #[error("event '{event}' declares {expected} fields, got {got}")]
    FieldCount {
        event: String,
        expected: usize,
        got: usize,
    },

    #[error("value {value} does not fit in {kind}")]
    OutOfRange { kind: String, value: i64 },

    #[error("string of {len} bytes exceeds the 255-byte length prefix")]
    StringTooLong { len: usize },

    #[error("{kind} field needs {expected} bytes, got {got}")]
    FieldWidth {
        kind: String,
        expected: usize,
        got: usize,
    },
}

/// Why a blocking read gave up before it was satisfied.
///
/// This is the controlled-exit path of the engine, not a protocol fault:
/// the controller reacts to it by running the shutdown sequence.
#[derive(Debug, Clone, Error)]
pub enum Interrupt {
    #[error("stop requested")]
    Cancelled,

    #[error("logging period elapsed")]
    DeadlineElapsed,

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
}

/// Errors from the streaming engine.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("negotiation failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("protocol desync: {0}")]
    Protocol(#[from] DecodeError),

    #[error("stream truncated: {remaining} buffered bytes do not form a whole event")]
    Truncated { remaining: usize },

    #[error("read interrupted: {0}")]
    Interrupted(#[from] Interrupt),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StreamError {
    /// Returns `true` if the byte stream can no longer be aligned with the schema.
    pub fn is_protocol_desync(&self) -> bool {
        matches!(
            self,
            Self::Registry(_) | Self::Protocol(_) | Self::Truncated { .. }
        )
    }

    /// Returns `true` if the error originated in the transport.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Interrupted(Interrupt::Transport(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let desync = StreamError::from(DecodeError::UnknownEventType { id: 9 });
        assert!(desync.is_protocol_desync());
        assert!(!desync.is_transport());

        let transport = StreamError::from(Interrupt::from(TransportError::Closed));
        assert!(transport.is_transport());
        assert!(!transport.is_protocol_desync());

        assert!(StreamError::Truncated { remaining: 3 }.is_protocol_desync());
    }

    #[test]
    fn messages_name_the_offender() {
        let err = RegistryError::AsymmetricRecord {
            record: "evt,1,u8".into(),
            count: 1,
        };
        assert!(err.to_string().contains("evt,1,u8"));
        assert_eq!(
            DecodeError::UnknownEventType { id: 42 }.to_string(),
            "unknown event type id 42"
        );
    }
}
