//! Dynamic Vision Sensor (event camera) payload: a variable-length array of
//! per-pixel brightness-change events.

use byteorder::{ByteOrder, LittleEndian};
use carla_streaming_macros::SensorPayload;

use crate::buffer::BufferView;
use crate::sensor::registry::{register, SensorKind, SensorPayload};

/// A single DVS event: pixel coordinates, timestamp in microseconds since
/// the episode began, and polarity (brightness increased or decreased).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DvsEvent {
    pub x: u16,
    pub y: u16,
    pub timestamp_us: i64,
    pub polarity: bool,
}

pub const EVENT_SIZE: usize = 2 + 2 + 8 + 1;

#[derive(SensorPayload)]
pub struct DvsEventArray;

/// Installs the DVS serializer in the global sensor registry and returns
/// the `SensorKind` it was assigned.
pub fn install() -> SensorKind {
    register::<DvsEventArray>(serialize_raw)
}

/// Serializes a slice of events into the wire format: a `u32` event count
/// followed by fixed-size event records.
pub fn serialize(events: &[DvsEvent]) -> BufferView {
    let mut out = Vec::with_capacity(4 + events.len() * EVENT_SIZE);
    out.extend_from_slice(&(events.len() as u32).to_le_bytes());
    for event in events {
        let mut record = [0u8; EVENT_SIZE];
        LittleEndian::write_u16(&mut record[0..2], event.x);
        LittleEndian::write_u16(&mut record[2..4], event.y);
        LittleEndian::write_i64(&mut record[4..12], event.timestamp_us);
        record[12] = event.polarity as u8;
        out.extend_from_slice(&record);
    }
    BufferView::from(out)
}

pub fn deserialize(raw: &[u8]) -> Vec<DvsEvent> {
    let count = LittleEndian::read_u32(&raw[0..4]) as usize;
    let mut events = Vec::with_capacity(count);
    let mut offset = 4;
    for _ in 0..count {
        let record = &raw[offset..offset + EVENT_SIZE];
        events.push(DvsEvent {
            x: LittleEndian::read_u16(&record[0..2]),
            y: LittleEndian::read_u16(&record[2..4]),
            timestamp_us: LittleEndian::read_i64(&record[4..12]),
            polarity: record[12] != 0,
        });
        offset += EVENT_SIZE;
    }
    events
}

/// The serializer function the registry stores must have a uniform
/// signature; this adapter parses raw bytes into events and re-serializes
/// them, matching the other sensors' `&BufferView -> BufferView` shape even
/// though DVS events do not need transcoding in practice.
fn serialize_raw(raw: &BufferView) -> BufferView {
    raw.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_roundtrip_through_wire_format() {
        let events = vec![
            DvsEvent { x: 10, y: 20, timestamp_us: 1_000, polarity: true },
            DvsEvent { x: 11, y: 21, timestamp_us: 1_050, polarity: false },
        ];
        let view = serialize(&events);
        let restored = deserialize(view.as_slice());
        assert_eq!(restored, events);
    }

    #[test]
    fn empty_event_array_serializes_to_just_the_count() {
        let view = serialize(&[]);
        assert_eq!(view.as_slice(), &0u32.to_le_bytes());
    }
}
