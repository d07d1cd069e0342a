//! Event record encoder: the device side of the data channel format.
//!
//! Used to build captures for replay and to check the decoder against
//! known byte layouts:
//!
//! ```text
//! [id: 1 byte][raw tick: 4 bytes][field bytes in schema order]
//! ```

use crate::config::ByteOrder;
use crate::error::DecodeError;
use crate::schema::EventType;
use crate::types::{FieldKind, FieldValue};

#[derive(Debug, Clone, Copy, Default)]
pub struct EventEncoder {
    byte_order: ByteOrder,
}

impl EventEncoder {
    pub fn new(byte_order: ByteOrder) -> Self {
        Self { byte_order }
    }

    /// Encode one record into a fresh buffer.
    pub fn encode(
        &self,
        event_type: &EventType,
        raw_tick: u32,
        fields: &[FieldValue],
    ) -> Result<Vec<u8>, DecodeError> {
        let mut out = Vec::with_capacity(5 + fields.len() * 4);
        self.encode_into(event_type, raw_tick, fields, &mut out)?;
        Ok(out)
    }

    /// Append one record to `out`. On error `out` is left unchanged.
    pub fn encode_into(
        &self,
        event_type: &EventType,
        raw_tick: u32,
        fields: &[FieldValue],
        out: &mut Vec<u8>,
    ) -> Result<(), DecodeError> {
        if fields.len() != event_type.field_count() {
            return Err(DecodeError::FieldCount {
                event: event_type.name.clone(),
                expected: event_type.field_count(),
                got: fields.len(),
            });
        }

        let start = out.len();
        out.push(event_type.id);
        self.byte_order.write_uint(raw_tick, 4, out);

        for (index, (kind, value)) in event_type.field_types.iter().zip(fields).enumerate() {
            if let Err(e) = self.encode_field(*kind, value, out) {
                out.truncate(start);
                return Err(match e {
                    DecodeError::TypeMismatch { expected, got, .. } => DecodeError::TypeMismatch {
                        event: event_type.name.clone(),
                        index,
                        expected,
                        got,
                    },
                    other => other,
                });
            }
        }
        Ok(())
    }

    fn encode_field(
        &self,
        kind: FieldKind,
        value: &FieldValue,
        out: &mut Vec<u8>,
    ) -> Result<(), DecodeError> {
        match (kind, value) {
            (FieldKind::Str, FieldValue::Str(s)) => {
                let len = u8::try_from(s.len())
                    .map_err(|_| DecodeError::StringTooLong { len: s.len() })?;
                out.push(len);
                out.extend_from_slice(s.as_bytes());
            }
            (kind, FieldValue::Uint(v)) if !kind.is_signed() && kind != FieldKind::Str => {
                let width = kind.width().unwrap_or(4);
                if width < 4 && *v >> (8 * width) != 0 {
                    return Err(DecodeError::OutOfRange {
                        kind: kind.to_string(),
                        value: i64::from(*v),
                    });
                }
                self.byte_order.write_uint(*v, width, out);
            }
            (kind, FieldValue::Int(v)) if kind.is_signed() => {
                let width = kind.width().unwrap_or(4);
                let bits = 8 * width as u32;
                let min = -(1i64 << (bits - 1));
                let max = (1i64 << (bits - 1)) - 1;
                if i64::from(*v) < min || i64::from(*v) > max {
                    return Err(DecodeError::OutOfRange {
                        kind: kind.to_string(),
                        value: i64::from(*v),
                    });
                }
                self.byte_order.write_uint(*v as u32, width, out);
            }
            (kind, value) => {
                return Err(DecodeError::TypeMismatch {
                    event: String::new(),
                    index: 0,
                    expected: kind.to_string(),
                    got: format!("{value:?}"),
                })
            }
        }
        Ok(())
    }
}
