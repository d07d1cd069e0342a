//! Reads the event descriptions the device sends in answer to INFO.

use rttprof_core::{parse_description, Description, EventTypeRegistry, StreamError};
use tracing::debug;

use crate::channel::ByteChannel;
use crate::reader::BufferedReader;

/// Read description records until the empty terminator record.
pub async fn read_descriptions<C: ByteChannel>(
    reader: &mut BufferedReader<C>,
) -> Result<EventTypeRegistry, StreamError> {
    let mut registry = EventTypeRegistry::new();
    loop {
        let line = reader.read_line().await?;
        match parse_description(&line)? {
            Description::Event(event_type) => {
                debug!(
                    "Registered event type {} '{}' with {} fields",
                    event_type.id,
                    event_type.name,
                    event_type.field_count()
                );
                registry.register(event_type)?;
            }
            Description::End => return Ok(registry),
        }
    }
}
