//! Event schemas learned from the device during negotiation.
//!
//! The device describes each event type with one comma-separated line on the
//! info channel:
//!
//! ```text
//! name,id,type_1,..,type_k,label_1,..,label_k
//! ```
//!
//! and ends the list with an empty line.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::RegistryError;
use crate::types::FieldKind;

/// Schema of one event type. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventType {
    pub id: u8,
    pub name: String,
    /// Field kinds in wire order
    pub field_types: Vec<FieldKind>,
    /// Field labels, one per entry of `field_types`
    pub field_labels: Vec<String>,
}

impl EventType {
    /// Build a schema from `(kind, label)` pairs in wire order.
    pub fn new<L: Into<String>>(
        id: u8,
        name: impl Into<String>,
        fields: impl IntoIterator<Item = (FieldKind, L)>,
    ) -> Self {
        let (field_types, field_labels) = fields
            .into_iter()
            .map(|(kind, label)| (kind, label.into()))
            .unzip();
        Self {
            id,
            name: name.into(),
            field_types,
            field_labels,
        }
    }

    pub fn field_count(&self) -> usize {
        self.field_types.len()
    }

    /// Iterate `(label, kind)` pairs in wire order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldKind)> {
        self.field_labels
            .iter()
            .map(String::as_str)
            .zip(self.field_types.iter().copied())
    }

    /// Render the description line the device would send for this schema
    /// (without the trailing newline).
    pub fn to_description(&self) -> String {
        let mut parts = vec![self.name.clone(), self.id.to_string()];
        parts.extend(self.field_types.iter().map(|k| k.tag().to_string()));
        parts.extend(self.field_labels.iter().cloned());
        parts.join(",")
    }
}

/// One parsed line of the description stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Description {
    Event(EventType),
    /// The empty record that ends negotiation.
    End,
}

/// Parse one description line (without its newline).
pub fn parse_description(line: &str) -> Result<Description, RegistryError> {
    let record = line.trim_end_matches('\r');
    if record.is_empty() {
        return Ok(Description::End);
    }

    let parts: Vec<&str> = record.split(',').collect();
    let name = parts[0];
    let raw_id = parts.get(1).ok_or_else(|| RegistryError::MissingId {
        record: record.to_string(),
    })?;
    let id: u64 = raw_id.trim().parse().map_err(|_| RegistryError::InvalidId {
        record: record.to_string(),
        id: raw_id.to_string(),
    })?;
    let id = u8::try_from(id).map_err(|_| RegistryError::IdOutOfRange { id })?;

    let rest = &parts[2..];
    if rest.len() % 2 != 0 {
        return Err(RegistryError::AsymmetricRecord {
            record: record.to_string(),
            count: rest.len(),
        });
    }
    let (tags, labels) = rest.split_at(rest.len() / 2);

    let field_types = tags
        .iter()
        .map(|tag| {
            FieldKind::from_tag(tag).ok_or_else(|| RegistryError::UnknownTypeTag {
                event: name.to_string(),
                tag: tag.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Description::Event(EventType {
        id,
        name: name.to_string(),
        field_types,
        field_labels: labels.iter().map(|l| l.to_string()).collect(),
    }))
}

/// Mapping from event id to schema, filled once during negotiation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventTypeRegistry {
    types: BTreeMap<u8, EventType>,
}

impl EventTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema. An id may only be registered once.
    pub fn register(&mut self, event_type: EventType) -> Result<(), RegistryError> {
        if let Some(existing) = self.types.get(&event_type.id) {
            return Err(RegistryError::DuplicateId {
                id: event_type.id,
                existing: existing.name.clone(),
                incoming: event_type.name,
            });
        }
        self.types.insert(event_type.id, event_type);
        Ok(())
    }

    pub fn get(&self, id: u8) -> Option<&EventType> {
        self.types.get(&id)
    }

    pub fn contains(&self, id: u8) -> bool {
        self.types.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Schemas in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &EventType> {
        self.types.values()
    }

    /// Parse a complete description stream, stopping at the empty record.
    ///
    /// Lines after the terminator are ignored. A stream without a terminator
    /// yields whatever was registered before it ran out.
    pub fn from_descriptions(text: &str) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for line in text.split('\n') {
            match parse_description(line)? {
                Description::Event(et) => registry.register(et)?,
                Description::End => break,
            }
        }
        Ok(registry)
    }
}

impl FromIterator<EventType> for EventTypeRegistry {
    /// Later duplicates are dropped.
    fn from_iter<I: IntoIterator<Item = EventType>>(iter: I) -> Self {
        let mut registry = Self::new();
        for et in iter {
            registry.types.entry(et.id).or_insert(et);
        }
        registry
    }
}
