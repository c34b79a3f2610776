//! Shared vertex vocabulary for Microsoft Flight Simulator glTF export
//!
//! # Modules
//!
//! - [`vertex`] - The three fixed vertex record layouts (VTX, BLEND1, BLEND4)
//! - [`packing`] - f32 → snorm8/unorm16/f16 quantization and field encoding

pub mod packing;
pub mod vertex;

pub use packing::{
    f32_to_joint, f32_to_snorm8, f32_to_unorm16, pack_joints_u16, pack_snorm8x4, pack_unorm16x4,
    pack_uv_f16, write_field,
};
pub use vertex::{Attribute, FieldFormat, LayoutField, VertexType};
