//! Optical flow camera payload: a dense per-pixel 2D motion vector field.
//!
//! The render pass produces a 16-bit-per-channel image where each channel
//! holds a motion component normalized into `[0, 1]`. The wire payload
//! carries the decoded `(vx, vy)` pairs, recovered from the raw channel
//! values with the fixed affine decode `v = (raw - 0.5) * 4`.

use byteorder::{ByteOrder, LittleEndian};
use carla_streaming_macros::SensorPayload;

use crate::buffer::BufferView;
use crate::sensor::registry::{register, SensorKind, SensorPayload};

#[derive(SensorPayload)]
pub struct OpticalFlowImage;

pub fn install() -> SensorKind {
    register::<OpticalFlowImage>(serialize_raw)
}

fn serialize_raw(raw: &BufferView) -> BufferView {
    raw.clone()
}

const U16_MAX: f32 = u16::MAX as f32;

/// Decodes a raw 16-bit channel value into a motion component.
fn decode_channel(raw: u16) -> f32 {
    (raw as f32 / U16_MAX - 0.5) * 4.0
}

/// Encodes a motion component back into a 16-bit channel value. The inverse
/// of [`decode_channel`], clamped to the representable range.
fn encode_channel(v: f32) -> u16 {
    let normalized = v / 4.0 + 0.5;
    (normalized.clamp(0.0, 1.0) * U16_MAX).round() as u16
}

/// Serializes a dense `width * height` field of `(vx, vy)` motion vectors
/// captured as raw 16-bit channel pairs. The wire layout is a `u32` width, a
/// `u32` height, then `width * height` pairs of little-endian `f32`s holding
/// the decoded vectors.
pub fn serialize(width: u32, height: u32, raw_channels: &[(u16, u16)]) -> BufferView {
    assert_eq!(raw_channels.len(), (width * height) as usize);
    let mut out = Vec::with_capacity(8 + raw_channels.len() * 8);
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    for &(raw_x, raw_y) in raw_channels {
        out.extend_from_slice(&decode_channel(raw_x).to_le_bytes());
        out.extend_from_slice(&decode_channel(raw_y).to_le_bytes());
    }
    BufferView::from(out)
}

/// Serializes already-decoded `(vx, vy)` vectors directly, skipping the
/// 16-bit channel round trip. Used when the field is synthesized rather than
/// read back from a rendered 16-bit image.
pub fn serialize_decoded(width: u32, height: u32, field: &[(f32, f32)]) -> BufferView {
    assert_eq!(field.len(), (width * height) as usize);
    let mut out = Vec::with_capacity(8 + field.len() * 8);
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    for (vx, vy) in field {
        out.extend_from_slice(&vx.to_le_bytes());
        out.extend_from_slice(&vy.to_le_bytes());
    }
    BufferView::from(out)
}

pub fn deserialize(raw: &[u8]) -> (u32, u32, Vec<(f32, f32)>) {
    let width = LittleEndian::read_u32(&raw[0..4]);
    let height = LittleEndian::read_u32(&raw[4..8]);
    let mut field = Vec::with_capacity((width * height) as usize);
    let mut offset = 8;
    for _ in 0..(width * height) {
        let vx = LittleEndian::read_f32(&raw[offset..offset + 4]);
        let vy = LittleEndian::read_f32(&raw[offset + 4..offset + 8]);
        field.push((vx, vy));
        offset += 8;
    }
    (width, height, field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_roundtrips_through_wire_format() {
        let field = vec![(0.5, -0.25), (1.0, 1.0), (0.0, 0.0), (-2.0, 3.5)];
        let view = serialize_decoded(2, 2, &field);
        let (w, h, restored) = deserialize(view.as_slice());
        assert_eq!((w, h), (2, 2));
        assert_eq!(restored, field);
    }

    #[test]
    fn raw_channel_midpoint_decodes_to_zero_motion() {
        let midpoint = (u16::MAX as f32 / 2.0).round() as u16;
        let view = serialize(1, 1, &[(midpoint, midpoint)]);
        let (_, _, field) = deserialize(view.as_slice());
        assert!(field[0].0.abs() < 1e-3);
        assert!(field[0].1.abs() < 1e-3);
    }

    #[test]
    fn raw_channel_extremes_decode_to_plus_minus_two() {
        let view = serialize(1, 1, &[(0, u16::MAX)]);
        let (_, _, field) = deserialize(view.as_slice());
        assert!((field[0].0 - (-2.0)).abs() < 1e-3);
        assert!((field[0].1 - 2.0).abs() < 1e-3);
    }

    #[test]
    fn encode_decode_channel_roundtrips() {
        for v in [-2.0f32, -1.0, 0.0, 0.5, 2.0] {
            let raw = encode_channel(v);
            let decoded = decode_channel(raw);
            assert!((decoded - v).abs() < 1e-3, "v={v} decoded={decoded}");
        }
    }
}
