//! `EventDecoder`: turns one binary record on the data channel into an [`Event`].
//!
//! Records carry no delimiters:
//!
//! ```text
//! [id: 1 byte][raw tick: 4 bytes][fields in schema order]
//! ```
//!
//! so the boundaries come entirely from the schema registered for `id`.

use rttprof_core::{
    ByteOrder, DecodeError, Event, EventTypeRegistry, FieldKind, FieldValue, ProfilerConfig,
    StreamError, TimestampTracker,
};
use std::sync::Arc;

use crate::channel::ByteChannel;
use crate::reader::BufferedReader;

pub struct EventDecoder {
    registry: Arc<EventTypeRegistry>,
    tracker: TimestampTracker,
    byte_order: ByteOrder,
}

impl EventDecoder {
    pub fn new(registry: Arc<EventTypeRegistry>, config: &ProfilerConfig) -> Self {
        Self {
            registry,
            tracker: TimestampTracker::from_config(config),
            byte_order: config.byte_order,
        }
    }

    pub fn registry(&self) -> &Arc<EventTypeRegistry> {
        &self.registry
    }

    pub fn tracker(&self) -> &TimestampTracker {
        &self.tracker
    }

    /// Decode the next record.
    ///
    /// If the read is interrupted or the buffer runs dry while draining, the
    /// bytes already taken for this record go back into the reader so it can
    /// be decoded whole later. An unknown id consumes only the id byte.
    pub async fn decode_one<C: ByteChannel>(
        &mut self,
        reader: &mut BufferedReader<C>,
    ) -> Result<Event, StreamError> {
        reader.begin_record();
        match self.decode_record(reader).await {
            Ok(event) => {
                reader.commit_record();
                Ok(event)
            }
            Err(StreamError::Truncated { .. }) => {
                reader.rollback_record();
                Err(StreamError::Truncated {
                    remaining: reader.buffered(),
                })
            }
            Err(e @ StreamError::Interrupted(_)) => {
                reader.rollback_record();
                Err(e)
            }
            Err(e) => {
                reader.commit_record();
                Err(e)
            }
        }
    }

    async fn decode_record<C: ByteChannel>(
        &mut self,
        reader: &mut BufferedReader<C>,
    ) -> Result<Event, StreamError> {
        let id = reader.read_exact(1).await?[0];
        let registry = Arc::clone(&self.registry);
        let event_type = registry
            .get(id)
            .ok_or(DecodeError::UnknownEventType { id })?;

        let raw_tick = self.byte_order.read_uint(&reader.read_exact(4).await?);

        let mut fields = Vec::with_capacity(event_type.field_count());
        for &kind in &event_type.field_types {
            fields.push(self.decode_field(kind, reader).await?);
        }

        // Ticks are fed to the tracker only once the record is complete, so a
        // record that gets rolled back and re-read is observed exactly once.
        let timestamp_ms = self.tracker.observe(raw_tick);
        Ok(Event::new(id, timestamp_ms, fields))
    }

    async fn decode_field<C: ByteChannel>(
        &self,
        kind: FieldKind,
        reader: &mut BufferedReader<C>,
    ) -> Result<FieldValue, StreamError> {
        let payload = match kind.width() {
            Some(width) => reader.read_exact(width).await?,
            None => {
                let len = reader.read_exact(1).await?[0];
                reader.read_exact(usize::from(len)).await?
            }
        };
        Ok(kind.decode(&payload, self.byte_order)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::reader::ReaderConfig;
    use crate::signal::StopSignal;
    use rttprof_core::{EventEncoder, EventType};

    fn config() -> ProfilerConfig {
        ProfilerConfig {
            ms_per_timestamp_tick: 1000.0,
            timestamp_raw_max: 1000,
            ..ProfilerConfig::default()
        }
    }

    fn registry() -> Arc<EventTypeRegistry> {
        Arc::new(
            [
                EventType::new(0, "evtA", [(FieldKind::U8, "value"), (FieldKind::Str, "tag")]),
                EventType::new(
                    1,
                    "all",
                    [
                        (FieldKind::U8, "a"),
                        (FieldKind::S8, "b"),
                        (FieldKind::U16, "c"),
                        (FieldKind::S16, "d"),
                        (FieldKind::U32, "e"),
                        (FieldKind::S32, "f"),
                        (FieldKind::Timestamp, "g"),
                        (FieldKind::Str, "h"),
                    ],
                ),
            ]
            .into_iter()
            .collect(),
        )
    }

    fn reader(ch: &MemoryChannel) -> BufferedReader<MemoryChannel> {
        BufferedReader::new(
            ch.clone(),
            ReaderConfig::from(&config()),
            StopSignal::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn decodes_reference_record() {
        let ch = MemoryChannel::new().ungated();
        ch.push_data(vec![0x00u8, 0x10, 0x00, 0x00, 0x00, 0x05, 0x01, 0x41]);
        let mut decoder = EventDecoder::new(registry(), &config());

        let ev = decoder.decode_one(&mut reader(&ch)).await.unwrap();
        assert_eq!(ev.type_id, 0);
        assert_eq!(ev.timestamp_ms, 1000.0 * 16.0 / 1000.0);
        assert_eq!(ev.fields, vec![FieldValue::Uint(5), "A".into()]);
    }

    #[tokio::test(start_paused = true)]
    async fn every_kind_survives_encode_then_decode() {
        let reg = registry();
        let values = vec![
            FieldValue::Uint(u32::from(u8::MAX)),
            FieldValue::Int(i32::from(i8::MIN)),
            FieldValue::Uint(u32::from(u16::MAX)),
            FieldValue::Int(i32::from(i16::MIN)),
            FieldValue::Uint(u32::MAX),
            FieldValue::Int(i32::MIN),
            FieldValue::Uint(123_456),
            FieldValue::Str(String::new()),
        ];
        let maxima = vec![
            FieldValue::Uint(0),
            FieldValue::Int(i32::from(i8::MAX)),
            FieldValue::Uint(0),
            FieldValue::Int(i32::from(i16::MAX)),
            FieldValue::Uint(0),
            FieldValue::Int(i32::MAX),
            FieldValue::Uint(0),
            FieldValue::Str("żółw".into()),
        ];

        for order in [ByteOrder::Little, ByteOrder::Big] {
            let cfg = ProfilerConfig {
                byte_order: order,
                ..config()
            };
            let enc = EventEncoder::new(order);
            let all = reg.get(1).unwrap();
            let mut bytes = enc.encode(all, 7, &values).unwrap();
            enc.encode_into(all, 8, &maxima, &mut bytes).unwrap();

            let ch = MemoryChannel::new().ungated();
            ch.push_data(bytes);
            let mut r = reader(&ch);
            let mut decoder = EventDecoder::new(Arc::clone(&reg), &cfg);
            assert_eq!(decoder.decode_one(&mut r).await.unwrap().fields, values);
            assert_eq!(decoder.decode_one(&mut r).await.unwrap().fields, maxima);
            assert_eq!(r.buffered(), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_id_consumes_only_the_id_byte() {
        let ch = MemoryChannel::new().ungated();
        ch.push_data(vec![0x42u8, 0x10, 0x00, 0x00, 0x00]);
        let mut r = reader(&ch);
        let mut decoder = EventDecoder::new(registry(), &config());

        let err = decoder.decode_one(&mut r).await.unwrap_err();
        assert!(matches!(
            err,
            StreamError::Protocol(DecodeError::UnknownEventType { id: 0x42 })
        ));
        assert!(err.is_protocol_desync());
        assert_eq!(r.buffered(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn truncated_record_is_put_back_while_draining() {
        let ch = MemoryChannel::new().ungated();
        ch.push_data(vec![0x00u8, 0x10, 0x00, 0x00, 0x00, 0x05, 0x03, 0x41]);
        let mut r = reader(&ch);
        r.flush_channel().await;
        r.start_draining();
        let mut decoder = EventDecoder::new(registry(), &config());

        let err = decoder.decode_one(&mut r).await.unwrap_err();
        assert!(matches!(err, StreamError::Truncated { remaining: 8 }));
        assert_eq!(r.buffered(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn wraps_are_tracked_across_records() {
        let reg = registry();
        let enc = EventEncoder::default();
        let evt = reg.get(0).unwrap();
        let mut bytes = Vec::new();
        for tick in [100, 650, 50] {
            enc.encode_into(evt, tick, &[FieldValue::Uint(1), "".into()], &mut bytes)
                .unwrap();
        }
        let ch = MemoryChannel::new().ungated();
        ch.push_data(bytes);
        let mut r = reader(&ch);
        let mut decoder = EventDecoder::new(reg, &config());

        let stamps: Vec<f64> = [
            decoder.decode_one(&mut r).await.unwrap(),
            decoder.decode_one(&mut r).await.unwrap(),
            decoder.decode_one(&mut r).await.unwrap(),
        ]
        .iter()
        .map(|e| e.timestamp_ms)
        .collect();
        assert_eq!(stamps, vec![100.0, 650.0, 1050.0]);
        assert_eq!(decoder.tracker().overflow_count(), 1);
    }
}
