//! `rttprof capture`: build a data-channel capture from JSON events.

use anyhow::{anyhow, Context, Result};
use rttprof_core::{ByteOrder, EventEncoder, EventTypeRegistry, FieldKind, FieldValue};
use serde::Deserialize;
use std::path::Path;

use crate::cmd_schema::load_registry;

#[derive(Debug, Deserialize)]
pub struct CaptureEvent {
    pub type_id: u8,
    pub tick: u32,
    #[serde(default)]
    pub fields: Vec<FieldValue>,
}

/// JSON has no notion of signedness; positive numbers for signed kinds
/// arrive as `Uint`.
fn coerce(kind: FieldKind, value: FieldValue) -> FieldValue {
    match value {
        FieldValue::Uint(v) if kind.is_signed() => match i32::try_from(v) {
            Ok(v) => FieldValue::Int(v),
            Err(_) => FieldValue::Uint(v),
        },
        other => other,
    }
}

pub fn encode_events(
    registry: &EventTypeRegistry,
    events: Vec<CaptureEvent>,
    byte_order: ByteOrder,
) -> Result<Vec<u8>> {
    let encoder = EventEncoder::new(byte_order);
    let mut out = Vec::new();
    for (index, event) in events.into_iter().enumerate() {
        let event_type = registry
            .get(event.type_id)
            .ok_or_else(|| anyhow!("event #{index}: unknown type id {}", event.type_id))?;
        let fields: Vec<FieldValue> = event_type
            .field_types
            .iter()
            .zip(event.fields.iter().cloned())
            .map(|(kind, value)| coerce(*kind, value))
            .chain(event.fields.iter().skip(event_type.field_count()).cloned())
            .collect();
        encoder
            .encode_into(event_type, event.tick, &fields, &mut out)
            .with_context(|| format!("event #{index} ({})", event_type.name))?;
    }
    Ok(out)
}

pub fn run(info: &Path, events: &Path, out: &Path, byte_order: ByteOrder) -> Result<()> {
    let registry = load_registry(info)?;
    let text = std::fs::read_to_string(events)
        .with_context(|| format!("cannot read events file '{}'", events.display()))?;
    let events: Vec<CaptureEvent> =
        serde_json::from_str(&text).context("events file must be a JSON array of events")?;
    let count = events.len();

    let bytes = encode_events(&registry, events, byte_order)?;
    std::fs::write(out, &bytes)
        .with_context(|| format!("cannot write capture '{}'", out.display()))?;
    println!("✓ Wrote {} events ({} bytes) to {}", count, bytes.len(), out.display());
    Ok(())
}
