//! Decoded events and the append-only log they are collected into.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::schema::{EventType, EventTypeRegistry};
use crate::types::FieldValue;

/// One decoded event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub type_id: u8,
    /// `ms_per_tick * (raw + overflows * raw_max) / 1000`
    pub timestamp_ms: f64,
    /// Values in the order of the schema's `field_types`
    pub fields: Vec<FieldValue>,
}

impl Event {
    pub fn new(type_id: u8, timestamp_ms: f64, fields: Vec<FieldValue>) -> Self {
        Self {
            type_id,
            timestamp_ms,
            fields,
        }
    }

    /// Look up a field by its schema label.
    pub fn field<'a>(&'a self, event_type: &EventType, label: &str) -> Option<&'a FieldValue> {
        let idx = event_type.field_labels.iter().position(|l| l == label)?;
        self.fields.get(idx)
    }
}

/// Ordered events of one stream plus the schema table they were decoded with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    registry: Arc<EventTypeRegistry>,
    events: Vec<Event>,
    #[serde(skip)]
    terminated: bool,
}

impl EventLog {
    pub fn new(registry: Arc<EventTypeRegistry>) -> Self {
        Self {
            registry,
            events: Vec::new(),
            terminated: false,
        }
    }

    /// Append an event. Returns `false` once the log has been terminated.
    pub fn push(&mut self, event: Event) -> bool {
        if self.terminated {
            return false;
        }
        self.events.push(event);
        true
    }

    /// Freeze the log; later pushes are refused.
    pub fn terminate(&mut self) {
        self.terminated = true;
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn registry(&self) -> &Arc<EventTypeRegistry> {
        &self.registry
    }

    /// Swap in the negotiated schema table. Only allowed while empty.
    pub fn set_registry(&mut self, registry: Arc<EventTypeRegistry>) -> bool {
        if !self.events.is_empty() || self.terminated {
            return false;
        }
        self.registry = registry;
        true
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Schema name of an event, if its id is registered.
    pub fn type_name(&self, event: &Event) -> Option<&str> {
        self.registry.get(event.type_id).map(|et| et.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldKind;

    fn registry() -> Arc<EventTypeRegistry> {
        Arc::new(
            [EventType::new(
                0,
                "evtA",
                [(FieldKind::U8, "value"), (FieldKind::Str, "tag")],
            )]
            .into_iter()
            .collect(),
        )
    }

    #[test]
    fn field_lookup_by_label() {
        let reg = registry();
        let ev = Event::new(0, 0.5, vec![FieldValue::Uint(5), "A".into()]);
        let et = reg.get(0).unwrap();
        assert_eq!(ev.field(et, "tag"), Some(&FieldValue::Str("A".into())));
        assert_eq!(ev.field(et, "missing"), None);
    }

    #[test]
    fn terminated_log_refuses_events() {
        let mut log = EventLog::new(registry());
        assert!(log.push(Event::new(0, 0.0, vec![])));
        log.terminate();
        assert!(!log.push(Event::new(0, 1.0, vec![])));
        assert_eq!(log.len(), 1);
        assert!(log.is_terminated());
    }

    #[test]
    fn registry_is_fixed_once_events_arrive() {
        let mut log = EventLog::default();
        assert!(log.set_registry(registry()));
        log.push(Event::new(0, 0.0, vec![]));
        assert!(!log.set_registry(Arc::new(EventTypeRegistry::new())));
        assert_eq!(log.type_name(&log.events()[0]), Some("evtA"));
    }
}
