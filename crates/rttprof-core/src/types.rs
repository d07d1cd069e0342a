//! Wire-level vocabulary: logical channels, host commands, field kinds and
//! decoded field values.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ByteOrder;
use crate::error::DecodeError;

/// Logical RTT channel multiplexed over the debug transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Device → host, newline-separated event descriptions.
    Info,
    /// Device → host, concatenated binary event records.
    Data,
    /// Host → device, one byte per command.
    Command,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Info => write!(f, "info"),
            Channel::Data => write!(f, "data"),
            Channel::Command => write!(f, "command"),
        }
    }
}

/// Command written to the device on the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Start = 1,
    Stop = 2,
    Info = 3,
}

impl Command {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Command::Start),
            2 => Some(Command::Stop),
            3 => Some(Command::Info),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Start => write!(f, "START"),
            Command::Stop => write!(f, "STOP"),
            Command::Info => write!(f, "INFO"),
        }
    }
}

/// A field type the device can declare in an event description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    #[serde(rename = "u8")]
    U8,
    #[serde(rename = "s8")]
    S8,
    #[serde(rename = "u16")]
    U16,
    #[serde(rename = "s16")]
    S16,
    #[serde(rename = "u32")]
    U32,
    #[serde(rename = "s32")]
    S32,
    /// Device timestamp carried as a plain field. Decodes like `u32`.
    #[serde(rename = "t")]
    Timestamp,
    /// One length byte followed by that many bytes of UTF-8.
    #[serde(rename = "s")]
    Str,
}

/// Tag → kind lookup, in the order the device firmware documents them.
const FIELD_KINDS: [(&str, FieldKind); 8] = [
    ("u8", FieldKind::U8),
    ("s8", FieldKind::S8),
    ("u16", FieldKind::U16),
    ("s16", FieldKind::S16),
    ("u32", FieldKind::U32),
    ("s32", FieldKind::S32),
    ("t", FieldKind::Timestamp),
    ("s", FieldKind::Str),
];

impl FieldKind {
    /// Resolve a type tag from an event description.
    pub fn from_tag(tag: &str) -> Option<Self> {
        FIELD_KINDS
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, kind)| *kind)
    }

    /// The tag this kind is announced with on the info channel.
    pub fn tag(self) -> &'static str {
        match self {
            FieldKind::U8 => "u8",
            FieldKind::S8 => "s8",
            FieldKind::U16 => "u16",
            FieldKind::S16 => "s16",
            FieldKind::U32 => "u32",
            FieldKind::S32 => "s32",
            FieldKind::Timestamp => "t",
            FieldKind::Str => "s",
        }
    }

    /// Width in bytes of a fixed-size field. `None` for length-prefixed strings.
    pub fn width(self) -> Option<usize> {
        match self {
            FieldKind::U8 | FieldKind::S8 => Some(1),
            FieldKind::U16 | FieldKind::S16 => Some(2),
            FieldKind::U32 | FieldKind::S32 | FieldKind::Timestamp => Some(4),
            FieldKind::Str => None,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, FieldKind::S8 | FieldKind::S16 | FieldKind::S32)
    }

    /// Decode the payload bytes of one field.
    ///
    /// For fixed-size kinds `bytes` must be exactly [`width`](Self::width)
    /// long. For [`FieldKind::Str`] it is the text after the length prefix.
    pub fn decode(self, bytes: &[u8], order: ByteOrder) -> Result<FieldValue, DecodeError> {
        if let Some(width) = self.width() {
            if bytes.len() != width {
                return Err(DecodeError::FieldWidth {
                    kind: self.tag().to_string(),
                    expected: width,
                    got: bytes.len(),
                });
            }
        }
        match self {
            FieldKind::Str => String::from_utf8(bytes.to_vec())
                .map(FieldValue::Str)
                .map_err(|e| DecodeError::InvalidUtf8 {
                    reason: e.to_string(),
                }),
            kind if kind.is_signed() => {
                let raw = order.read_uint(bytes);
                let shift = 32 - 8 * bytes.len() as u32;
                Ok(FieldValue::Int(((raw << shift) as i32) >> shift))
            }
            _ => Ok(FieldValue::Uint(order.read_uint(bytes))),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Uint(u32),
    Int(i32),
    Str(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Uint(v) => write!(f, "{v}"),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Uint(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}
