//! Fixed vertex record layouts
//!
//! The flight simulator consumes exactly three interleaved vertex formats.
//! Every attribute lives at a fixed byte offset inside a fixed-stride record:
//!
//! | Layout | Stride | Skinning |
//! |--------|--------|----------|
//! | VTX    | 36     | none     |
//! | BLEND1 | 44     | 1 bone   |
//! | BLEND4 | 48     | 4 bones  |

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Vertex Type
// ============================================================================

/// Vertex record layout of a primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexType {
    /// Static geometry
    #[serde(rename = "VTX")]
    Vtx,
    /// Rigidly skinned geometry (one influence per vertex)
    #[serde(rename = "BLEND1")]
    Blend1,
    /// Skinned geometry with up to four influences per vertex
    #[serde(rename = "BLEND4")]
    Blend4,
}

impl VertexType {
    /// Size of one vertex record in bytes
    #[inline]
    pub const fn stride(self) -> usize {
        match self {
            Self::Vtx => 36,
            Self::Blend1 => 44,
            Self::Blend4 => 48,
        }
    }

    /// Name as written into `ASOBO_primitive.VertexType`
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vtx => "VTX",
            Self::Blend1 => "BLEND1",
            Self::Blend4 => "BLEND4",
        }
    }

    /// True for the bone-blend layouts
    #[inline]
    pub const fn is_blend(self) -> bool {
        matches!(self, Self::Blend1 | Self::Blend4)
    }

    /// All fields of this layout, in record order
    pub const fn layout(self) -> &'static [LayoutField] {
        match self {
            Self::Vtx => &VTX_LAYOUT,
            Self::Blend1 => &BLEND1_LAYOUT,
            Self::Blend4 => &BLEND4_LAYOUT,
        }
    }

    /// Field describing where `attribute` lives in this layout, if it has a slot
    pub fn field(self, attribute: Attribute) -> Option<LayoutField> {
        self.layout()
            .iter()
            .copied()
            .find(|field| field.attribute == attribute)
    }
}

impl fmt::Display for VertexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Attributes
// ============================================================================

/// Vertex attribute with a slot in at least one layout
///
/// Ordering follows record order, so a `BTreeMap<Attribute, _>` iterates
/// attributes the way they are laid out in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attribute {
    Position,
    Tangent,
    Normal,
    TexCoord0,
    TexCoord1,
    Joints0,
    Weights0,
    Color0,
}

impl Attribute {
    pub const ALL: [Attribute; 8] = [
        Attribute::Position,
        Attribute::Tangent,
        Attribute::Normal,
        Attribute::TexCoord0,
        Attribute::TexCoord1,
        Attribute::Joints0,
        Attribute::Weights0,
        Attribute::Color0,
    ];

    /// glTF semantic name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Position => "POSITION",
            Self::Tangent => "TANGENT",
            Self::Normal => "NORMAL",
            Self::TexCoord0 => "TEXCOORD_0",
            Self::TexCoord1 => "TEXCOORD_1",
            Self::Joints0 => "JOINTS_0",
            Self::Weights0 => "WEIGHTS_0",
            Self::Color0 => "COLOR_0",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|attribute| attribute.name() == name)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Field Formats
// ============================================================================

/// Binary encoding of one attribute inside a vertex record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldFormat {
    /// f32 × 3
    Float32x3,
    /// i8 × 4, value × 127
    Snorm8x4,
    /// f16 × 2
    Float16x2,
    /// u16 × 4, integer passthrough (joint indices)
    Uint16x4,
    /// u16 × 4, value × 65535
    Unorm16x4,
    /// f32 × 1
    Float32,
}

impl FieldFormat {
    /// Encoded size in bytes
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            Self::Float32x3 => 12,
            Self::Snorm8x4 => 4,
            Self::Float16x2 => 4,
            Self::Uint16x4 => 8,
            Self::Unorm16x4 => 8,
            Self::Float32 => 4,
        }
    }

    /// Number of source floats consumed per vertex
    #[inline]
    pub const fn components(self) -> usize {
        match self {
            Self::Float32x3 => 3,
            Self::Snorm8x4 | Self::Uint16x4 | Self::Unorm16x4 => 4,
            Self::Float16x2 => 2,
            Self::Float32 => 1,
        }
    }
}

/// One attribute slot of a vertex layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutField {
    pub attribute: Attribute,
    /// Byte offset from the start of the vertex record
    pub offset: usize,
    pub format: FieldFormat,
}

const fn field(attribute: Attribute, offset: usize, format: FieldFormat) -> LayoutField {
    LayoutField {
        attribute,
        offset,
        format,
    }
}

const VTX_LAYOUT: [LayoutField; 6] = [
    field(Attribute::Position, 0, FieldFormat::Float32x3),
    field(Attribute::Tangent, 12, FieldFormat::Snorm8x4),
    field(Attribute::Normal, 16, FieldFormat::Snorm8x4),
    field(Attribute::TexCoord0, 20, FieldFormat::Float16x2),
    field(Attribute::TexCoord1, 24, FieldFormat::Float16x2),
    field(Attribute::Color0, 28, FieldFormat::Unorm16x4),
];

const BLEND1_LAYOUT: [LayoutField; 8] = [
    field(Attribute::Position, 0, FieldFormat::Float32x3),
    field(Attribute::Tangent, 12, FieldFormat::Snorm8x4),
    field(Attribute::Normal, 16, FieldFormat::Snorm8x4),
    field(Attribute::TexCoord0, 20, FieldFormat::Float16x2),
    field(Attribute::TexCoord1, 24, FieldFormat::Float16x2),
    field(Attribute::Joints0, 28, FieldFormat::Uint16x4),
    field(Attribute::Weights0, 36, FieldFormat::Float32),
    field(Attribute::Color0, 40, FieldFormat::Snorm8x4),
];

const BLEND4_LAYOUT: [LayoutField; 8] = [
    field(Attribute::Position, 0, FieldFormat::Float32x3),
    field(Attribute::Tangent, 12, FieldFormat::Snorm8x4),
    field(Attribute::Normal, 16, FieldFormat::Snorm8x4),
    field(Attribute::TexCoord0, 20, FieldFormat::Float16x2),
    field(Attribute::TexCoord1, 24, FieldFormat::Float16x2),
    field(Attribute::Joints0, 28, FieldFormat::Uint16x4),
    field(Attribute::Weights0, 36, FieldFormat::Unorm16x4),
    field(Attribute::Color0, 44, FieldFormat::Snorm8x4),
];

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_TYPES: [VertexType; 3] = [VertexType::Vtx, VertexType::Blend1, VertexType::Blend4];

    #[test]
    fn test_layouts_fill_stride_exactly() {
        for vertex_type in ALL_TYPES {
            let mut end = 0;
            for field in vertex_type.layout() {
                assert_eq!(field.offset, end, "{vertex_type}: gap before {}", field.attribute);
                end = field.offset + field.format.size();
            }
            assert_eq!(end, vertex_type.stride(), "{vertex_type}: record size");
        }
    }

    #[test]
    fn test_vtx_has_no_skinning_slots() {
        assert!(VertexType::Vtx.field(Attribute::Joints0).is_none());
        assert!(VertexType::Vtx.field(Attribute::Weights0).is_none());
        assert_eq!(VertexType::Vtx.field(Attribute::Color0).map(|f| f.offset), Some(28));
    }

    #[test]
    fn test_blend_color_offsets() {
        assert_eq!(VertexType::Blend1.field(Attribute::Color0).map(|f| f.offset), Some(40));
        assert_eq!(VertexType::Blend4.field(Attribute::Color0).map(|f| f.offset), Some(44));
        assert_eq!(
            VertexType::Blend1.field(Attribute::Weights0).map(|f| f.format),
            Some(FieldFormat::Float32)
        );
    }

    #[test]
    fn test_attribute_names_roundtrip() {
        for attribute in Attribute::ALL {
            assert_eq!(Attribute::from_name(attribute.name()), Some(attribute));
        }
        assert_eq!(Attribute::from_name("TEXCOORD_2"), None);
    }

    #[test]
    fn test_vertex_type_serializes_as_vendor_name() {
        let json = serde_json::to_string(&VertexType::Blend4).unwrap();
        assert_eq!(json, "\"BLEND4\"");
        assert!(VertexType::Blend1.is_blend());
        assert!(!VertexType::Vtx.is_blend());
    }
}
