//! The eight fixed buffer views
//!
//! Optimized simulator assets store all binary data in exactly eight named
//! buffer views. Each slot owns its own [`Buffer`] during export; at finalize
//! the non-empty ones are concatenated, in slot order, into buffer 0.

use gltf_json as json;
use json::accessor::{ComponentType, Type};
use json::buffer::{Stride, Target};
use json::validation::{Checked::Valid, USize64};
use msfs_common::VertexType;

use crate::buffer::Buffer;

/// One of the fixed buffer views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferViewSlot {
    FloatMat4,
    AnimFloatScalar,
    AnimFloatVec3,
    AnimFloatVec4,
    VertexNd,
    Index,
    Vertex4Blend,
    Vertex1Blend,
}

impl BufferViewSlot {
    /// All slots in output order
    pub const ALL: [BufferViewSlot; 8] = [
        BufferViewSlot::FloatMat4,
        BufferViewSlot::AnimFloatScalar,
        BufferViewSlot::AnimFloatVec3,
        BufferViewSlot::AnimFloatVec4,
        BufferViewSlot::VertexNd,
        BufferViewSlot::Index,
        BufferViewSlot::Vertex4Blend,
        BufferViewSlot::Vertex1Blend,
    ];

    /// Position in [`Self::ALL`]
    #[inline]
    pub const fn ordinal(self) -> usize {
        self as usize
    }

    pub fn from_ordinal(ordinal: u32) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }

    /// Name written into the buffer view
    pub const fn name(self) -> &'static str {
        match self {
            Self::FloatMat4 => "bufferViewFloatMat4",
            Self::AnimFloatScalar => "bufferViewAnimationFloatScalar",
            Self::AnimFloatVec3 => "bufferViewAnimationFloatVec3",
            Self::AnimFloatVec4 => "bufferViewAnimationFloatVec4",
            Self::VertexNd => "BufferViewVertexND",
            Self::Index => "BufferViewIndex",
            Self::Vertex4Blend => "BufferViewVertex4Blend",
            Self::Vertex1Blend => "BufferViewVertex1Blend",
        }
    }

    pub const fn byte_stride(self) -> Option<usize> {
        match self {
            Self::VertexNd => Some(VertexType::Vtx.stride()),
            Self::Vertex4Blend => Some(VertexType::Blend4.stride()),
            Self::Vertex1Blend => Some(VertexType::Blend1.stride()),
            _ => None,
        }
    }

    pub const fn target(self) -> Option<Target> {
        match self {
            Self::VertexNd | Self::Vertex4Blend | Self::Vertex1Blend => Some(Target::ArrayBuffer),
            Self::Index => Some(Target::ElementArrayBuffer),
            _ => None,
        }
    }

    /// Slot receiving vertex records of `vertex_type`
    pub const fn for_vertex_type(vertex_type: VertexType) -> Self {
        match vertex_type {
            VertexType::Vtx => Self::VertexNd,
            VertexType::Blend1 => Self::Vertex1Blend,
            VertexType::Blend4 => Self::Vertex4Blend,
        }
    }

    /// Slot for non-vertex accessor data of the given layout
    ///
    /// Float matrices and float animation tracks have dedicated slots; 16-bit
    /// scalars go to the index view. Anything else has no home.
    pub fn for_accessor(component_type: ComponentType, type_: Type) -> Option<Self> {
        match (component_type, type_) {
            (ComponentType::F32, Type::Mat4) => Some(Self::FloatMat4),
            (ComponentType::F32, Type::Scalar) => Some(Self::AnimFloatScalar),
            (ComponentType::F32, Type::Vec3) => Some(Self::AnimFloatVec3),
            (ComponentType::F32, Type::Vec4) => Some(Self::AnimFloatVec4),
            (ComponentType::U16, Type::Scalar) => Some(Self::Index),
            _ => None,
        }
    }
}

/// Per-export set of the eight fixed buffer views
///
/// The slot set is closed: data can only be appended to one of
/// [`BufferViewSlot::ALL`].
#[derive(Debug, Default)]
pub struct FixedBufferViews {
    buffers: [Buffer; 8],
}

/// Result of consolidating the fixed views into one buffer
#[derive(Debug)]
pub struct ConsolidatedViews {
    /// Retained (non-empty) buffer views, in slot order
    pub views: Vec<json::buffer::View>,
    /// Final index of each slot, `None` when the slot was dropped
    pub remap: [Option<u32>; 8],
    /// Buffer 0 contents
    pub buffer: Buffer,
}

impl ConsolidatedViews {
    /// Final buffer view index of `slot`
    pub fn index_of(&self, slot: BufferViewSlot) -> Option<u32> {
        self.remap[slot.ordinal()]
    }
}

impl FixedBufferViews {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append data with 4-byte padding; returns the offset within the slot
    pub fn append(&mut self, slot: BufferViewSlot, data: &[u8]) -> usize {
        self.buffers[slot.ordinal()].append(data, true)
    }

    /// Append pre-packed vertex records; returns the offset within the slot
    pub fn append_raw(&mut self, slot: BufferViewSlot, data: &[u8]) -> usize {
        self.buffers[slot.ordinal()].append_raw(data)
    }

    pub fn byte_length(&self, slot: BufferViewSlot) -> usize {
        self.buffers[slot.ordinal()].byte_length()
    }

    pub fn data(&self, slot: BufferViewSlot) -> &[u8] {
        self.buffers[slot.ordinal()].as_bytes()
    }

    /// Concatenate non-empty slots into one buffer and describe them as buffer views
    pub fn consolidate(self) -> ConsolidatedViews {
        let mut buffer = Buffer::new();
        let mut views = Vec::new();
        let mut remap = [None; 8];

        for (slot, data) in BufferViewSlot::ALL.into_iter().zip(self.buffers) {
            if data.is_empty() {
                continue;
            }
            let offset = buffer.append(data.as_bytes(), true);
            remap[slot.ordinal()] = Some(views.len() as u32);
            views.push(json::buffer::View {
                buffer: json::Index::new(0),
                byte_length: USize64::from(data.byte_length()),
                byte_offset: Some(USize64::from(offset)),
                byte_stride: slot.byte_stride().map(Stride),
                name: Some(slot.name().to_string()),
                target: slot.target().map(Valid),
                extensions: None,
                extras: Default::default(),
            });
        }

        ConsolidatedViews {
            views,
            remap,
            buffer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_catalog() {
        assert_eq!(BufferViewSlot::ALL.len(), 8);
        for (i, slot) in BufferViewSlot::ALL.into_iter().enumerate() {
            assert_eq!(slot.ordinal(), i);
            assert_eq!(BufferViewSlot::from_ordinal(i as u32), Some(slot));
        }
        assert_eq!(BufferViewSlot::from_ordinal(8), None);
        assert_eq!(BufferViewSlot::VertexNd.byte_stride(), Some(36));
        assert_eq!(BufferViewSlot::Vertex4Blend.byte_stride(), Some(48));
        assert_eq!(BufferViewSlot::Vertex1Blend.byte_stride(), Some(44));
        assert_eq!(BufferViewSlot::Index.target(), Some(Target::ElementArrayBuffer));
        assert_eq!(BufferViewSlot::FloatMat4.target(), None);
    }

    #[test]
    fn test_accessor_routing() {
        assert_eq!(
            BufferViewSlot::for_accessor(ComponentType::F32, Type::Vec4),
            Some(BufferViewSlot::AnimFloatVec4)
        );
        assert_eq!(
            BufferViewSlot::for_accessor(ComponentType::F32, Type::Mat4),
            Some(BufferViewSlot::FloatMat4)
        );
        assert_eq!(BufferViewSlot::for_accessor(ComponentType::U8, Type::Vec2), None);
    }

    #[test]
    fn test_consolidate_drops_empty_views() {
        let mut views = FixedBufferViews::new();
        views.append(BufferViewSlot::Index, &[0, 0, 1, 0, 2, 0]);
        views.append_raw(BufferViewSlot::VertexNd, &[7u8; 36]);

        let consolidated = views.consolidate();
        assert_eq!(consolidated.views.len(), 2);

        // Slot order: VertexND (4) before Index (5)
        assert_eq!(consolidated.index_of(BufferViewSlot::VertexNd), Some(0));
        assert_eq!(consolidated.index_of(BufferViewSlot::Index), Some(1));
        assert_eq!(consolidated.index_of(BufferViewSlot::FloatMat4), None);

        let vertex = &consolidated.views[0];
        assert_eq!(vertex.byte_offset, Some(USize64(0)));
        assert_eq!(vertex.byte_length, USize64(36));
        assert_eq!(vertex.byte_stride.map(|s| s.0), Some(36));
        let index = &consolidated.views[1];
        assert_eq!(index.byte_offset, Some(USize64(36)));
        assert_eq!(index.byte_length, USize64(8));
        assert!(index.byte_stride.is_none());
        assert_eq!(consolidated.buffer.byte_length(), 44);
    }
}
