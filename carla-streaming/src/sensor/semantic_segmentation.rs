//! Semantic and instance segmentation camera payloads.
//!
//! Semantic segmentation carries one class-id byte per pixel. Instance
//! segmentation shares the same per-pixel grid but carries a full RGBA
//! pixel: R is the semantic label, (G, B) are the low 16 bits of the
//! actor's unique id, packed big end first so they read as a plain u16.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use carla_streaming_macros::SensorPayload;

use crate::buffer::BufferView;
use crate::sensor::registry::{register, SensorKind, SensorPayload};

#[derive(SensorPayload)]
pub struct SemanticSegmentationImage;

pub fn install() -> SensorKind {
    register::<SemanticSegmentationImage>(serialize_raw)
}

fn serialize_raw(raw: &BufferView) -> BufferView {
    raw.clone()
}

/// Serializes a `width * height` grid of class-id bytes as a `u32` width, a
/// `u32` height, then the raw label bytes in row-major order.
pub fn serialize(width: u32, height: u32, labels: &[u8]) -> BufferView {
    assert_eq!(labels.len(), (width * height) as usize);
    let mut out = Vec::with_capacity(8 + labels.len());
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(labels);
    BufferView::from(out)
}

pub fn deserialize(raw: &[u8]) -> (u32, u32, &[u8]) {
    let width = LittleEndian::read_u32(&raw[0..4]);
    let height = LittleEndian::read_u32(&raw[4..8]);
    (width, height, &raw[8..8 + (width * height) as usize])
}

#[derive(SensorPayload)]
pub struct InstanceSegmentationImage;

pub fn install_instance() -> SensorKind {
    register::<InstanceSegmentationImage>(serialize_raw)
}

/// One per-pixel instance segmentation sample: a semantic class label and
/// the unique id of the actor that pixel belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstancePixel {
    pub semantic_label: u8,
    pub actor_id: u32,
}

/// Serializes a `width * height` grid of `InstancePixel`s as a `u32` width,
/// a `u32` height, then one RGBA quadruple per pixel in row-major order: R
/// is the semantic label, (G, B) are the low 16 bits of the actor id, A is
/// unused and always zero.
pub fn serialize_instance(width: u32, height: u32, pixels: &[InstancePixel]) -> BufferView {
    assert_eq!(pixels.len(), (width * height) as usize);
    let mut out = Vec::with_capacity(8 + pixels.len() * 4);
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    for pixel in pixels {
        let id16 = pixel.actor_id as u16;
        let mut gb = [0u8; 2];
        BigEndian::write_u16(&mut gb, id16);
        out.push(pixel.semantic_label);
        out.push(gb[0]);
        out.push(gb[1]);
        out.push(0);
    }
    BufferView::from(out)
}

pub fn deserialize_instance(raw: &[u8]) -> (u32, u32, Vec<InstancePixel>) {
    let width = LittleEndian::read_u32(&raw[0..4]);
    let height = LittleEndian::read_u32(&raw[4..8]);
    let count = (width * height) as usize;
    let mut pixels = Vec::with_capacity(count);
    let mut offset = 8;
    for _ in 0..count {
        let r = raw[offset];
        let gb = [raw[offset + 1], raw[offset + 2]];
        pixels.push(InstancePixel {
            semantic_label: r,
            actor_id: BigEndian::read_u16(&gb) as u32,
        });
        offset += 4;
    }
    (width, height, pixels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_roundtrip_through_wire_format() {
        let labels = vec![1u8, 2, 3, 4, 5, 6];
        let view = serialize(3, 2, &labels);
        let (w, h, restored) = deserialize(view.as_slice());
        assert_eq!((w, h), (3, 2));
        assert_eq!(restored, &labels[..]);
    }

    #[test]
    fn instance_pixels_roundtrip_through_wire_format() {
        let pixels = vec![
            InstancePixel { semantic_label: 10, actor_id: 0x1234 },
            InstancePixel { semantic_label: 4, actor_id: 0xABCD },
            InstancePixel { semantic_label: 0, actor_id: 0 },
            InstancePixel { semantic_label: 255, actor_id: 0xFFFF },
        ];
        let view = serialize_instance(2, 2, &pixels);
        let (w, h, restored) = deserialize_instance(view.as_slice());
        assert_eq!((w, h), (2, 2));
        assert_eq!(restored, pixels);
    }

    #[test]
    fn instance_pixel_actor_id_is_truncated_to_low_16_bits() {
        let pixels = vec![InstancePixel { semantic_label: 1, actor_id: 0x1_0001 }];
        let view = serialize_instance(1, 1, &pixels);
        let (_, _, restored) = deserialize_instance(view.as_slice());
        assert_eq!(restored[0].actor_id, 1);
    }
}
