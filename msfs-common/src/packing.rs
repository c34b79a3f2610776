//! Vertex data quantization
//!
//! Converts f32 source data to the field encodings used by the vertex layouts:
//! - f32 → snorm8 (normals, tangents, blend colors)
//! - f32 → unorm16 (static colors, 4-bone weights)
//! - f32 → f16 (texture coordinates)
//! - f32 → u16 (joint indices)

use crate::vertex::FieldFormat;
use bytemuck::cast_slice;
use half::f16;

// ============================================================================
// Basic Conversion Functions
// ============================================================================

/// Convert f32 to signed normalized 8-bit integer (snorm8)
///
/// Maps f32 range [-1.0, 1.0] to i8 range [-127, 127].
#[inline]
pub fn f32_to_snorm8(value: f32) -> i8 {
    let clamped = value.clamp(-1.0, 1.0);
    (clamped * 127.0).round() as i8
}

/// Convert f32 to unsigned normalized 16-bit integer (unorm16)
///
/// Maps f32 range [0.0, 1.0] to u16 range [0, 65535].
#[inline]
pub fn f32_to_unorm16(value: f32) -> u16 {
    let clamped = value.clamp(0.0, 1.0);
    (clamped * 65535.0).round() as u16
}

/// Convert a joint index stored as f32 to u16
#[inline]
pub fn f32_to_joint(value: f32) -> u16 {
    value.round().clamp(0.0, u16::MAX as f32) as u16
}

// ============================================================================
// Field Packing
// ============================================================================

/// Pack a 4-component direction or color to snorm8 × 4
///
/// The fourth component is carried through unchanged in meaning.
#[inline]
pub fn pack_snorm8x4(v: [f32; 4]) -> [i8; 4] {
    v.map(f32_to_snorm8)
}

/// Pack a 4-component value to unorm16 × 4
#[inline]
pub fn pack_unorm16x4(v: [f32; 4]) -> [u16; 4] {
    v.map(f32_to_unorm16)
}

/// Pack a 2D UV coordinate (f32x2) to Float16x2 format
#[inline]
pub fn pack_uv_f16(u: f32, v: f32) -> [f16; 2] {
    [f16::from_f32(u), f16::from_f32(v)]
}

/// Pack joint indices to u16 × 4
#[inline]
pub fn pack_joints_u16(v: [f32; 4]) -> [u16; 4] {
    v.map(f32_to_joint)
}

/// Encode one attribute value into its record slot
///
/// `src` holds the source components of one vertex; missing trailing
/// components are treated as zero. `dst` must be at least `format.size()` bytes.
pub fn write_field(format: FieldFormat, src: &[f32], dst: &mut [u8]) {
    let c = |i: usize| src.get(i).copied().unwrap_or(0.0);
    let size = format.size();

    match format {
        FieldFormat::Float32x3 => {
            let packed = [c(0), c(1), c(2)];
            dst[..size].copy_from_slice(cast_slice(&packed));
        }
        FieldFormat::Snorm8x4 => {
            let packed = pack_snorm8x4([c(0), c(1), c(2), c(3)]);
            dst[..size].copy_from_slice(cast_slice(&packed));
        }
        FieldFormat::Float16x2 => {
            let packed = pack_uv_f16(c(0), c(1));
            dst[..size].copy_from_slice(cast_slice(&packed));
        }
        FieldFormat::Uint16x4 => {
            let packed = pack_joints_u16([c(0), c(1), c(2), c(3)]);
            dst[..size].copy_from_slice(cast_slice(&packed));
        }
        FieldFormat::Unorm16x4 => {
            let packed = pack_unorm16x4([c(0), c(1), c(2), c(3)]);
            dst[..size].copy_from_slice(cast_slice(&packed));
        }
        FieldFormat::Float32 => {
            dst[..size].copy_from_slice(&c(0).to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_to_snorm8_range() {
        assert_eq!(f32_to_snorm8(1.0), 127);
        assert_eq!(f32_to_snorm8(-1.0), -127);
        assert_eq!(f32_to_snorm8(0.0), 0);
        assert_eq!(f32_to_snorm8(2.0), 127); // clamped
        assert_eq!(f32_to_snorm8(0.5), 64);
    }

    #[test]
    fn test_f32_to_unorm16_range() {
        assert_eq!(f32_to_unorm16(0.0), 0);
        assert_eq!(f32_to_unorm16(1.0), 65535);
        assert_eq!(f32_to_unorm16(-0.5), 0); // clamped
        assert_eq!(f32_to_unorm16(0.5), 32768);
    }

    #[test]
    fn test_joint_conversion() {
        assert_eq!(pack_joints_u16([0.0, 3.0, 17.0, 300.0]), [0, 3, 17, 300]);
        assert_eq!(f32_to_joint(-1.0), 0);
    }

    #[test]
    fn test_write_field_position() {
        let mut dst = [0u8; 12];
        write_field(FieldFormat::Float32x3, &[1.0, -2.0, 3.5], &mut dst);
        let back: &[f32] = cast_slice(&dst);
        assert_eq!(back, &[1.0, -2.0, 3.5]);
    }

    #[test]
    fn test_write_field_vec3_normal_pads_fourth_component() {
        let mut dst = [0xFFu8; 4];
        write_field(FieldFormat::Snorm8x4, &[0.0, 1.0, 0.0], &mut dst);
        assert_eq!(dst, [0, 127, 0, 0]);
    }

    #[test]
    fn test_write_field_tangent_handedness_is_quantized() {
        let mut dst = [0u8; 4];
        write_field(FieldFormat::Snorm8x4, &[1.0, 0.0, 0.0, -1.0], &mut dst);
        let back: &[i8] = cast_slice(&dst);
        assert_eq!(back, &[127, 0, 0, -127]);
    }

    #[test]
    fn test_write_field_uv_half() {
        let mut dst = [0u8; 4];
        write_field(FieldFormat::Float16x2, &[0.25, 0.75], &mut dst);
        let u = f16::from_le_bytes([dst[0], dst[1]]);
        let v = f16::from_le_bytes([dst[2], dst[3]]);
        assert_eq!(u.to_f32(), 0.25);
        assert_eq!(v.to_f32(), 0.75);
    }

    #[test]
    fn test_write_field_scalar_weight() {
        let mut dst = [0u8; 4];
        write_field(FieldFormat::Float32, &[0.8, 0.2, 0.0, 0.0], &mut dst);
        assert_eq!(f32::from_le_bytes(dst), 0.8);
    }
}
