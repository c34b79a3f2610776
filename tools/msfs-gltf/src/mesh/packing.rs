//! Interleaved vertex record packing

use glam::Vec3;
use gltf_json as json;
use json::accessor::{ComponentType, Type};
use msfs_common::{Attribute, FieldFormat, VertexType, write_field};
use std::collections::BTreeMap;

use super::Stream;
use crate::buffer_views::{BufferViewSlot, FixedBufferViews};
use crate::document;

/// Component and element type an accessor declares for a record field
pub fn accessor_format(format: FieldFormat) -> (ComponentType, Type) {
    match format {
        FieldFormat::Float32x3 => (ComponentType::F32, Type::Vec3),
        FieldFormat::Snorm8x4 => (ComponentType::I8, Type::Vec4),
        // Half floats are declared as shorts; the simulator reinterprets them
        FieldFormat::Float16x2 => (ComponentType::I16, Type::Vec2),
        FieldFormat::Uint16x4 | FieldFormat::Unorm16x4 => (ComponentType::U16, Type::Vec4),
        FieldFormat::Float32 => (ComponentType::F32, Type::Scalar),
    }
}

/// Pack attribute streams into fixed-stride records of `vertex_type`
///
/// Attributes without a slot in the layout are ignored; slots without an
/// attribute stay zeroed.
pub(crate) fn pack_vertices(
    vertex_type: VertexType,
    streams: &BTreeMap<Attribute, Stream>,
    count: usize,
) -> Vec<u8> {
    let stride = vertex_type.stride();
    let fields: Vec<_> = streams
        .iter()
        .filter_map(|(&attribute, stream)| Some((vertex_type.field(attribute)?, stream)))
        .collect();

    let mut data = vec![0u8; stride * count];
    for (i, record) in data.chunks_exact_mut(stride).enumerate() {
        for (field, stream) in &fields {
            write_field(field.format, stream.element(i), &mut record[field.offset..]);
        }
    }
    data
}

/// Component-wise min/max of a position stream
pub(crate) fn position_bounds(stream: &Stream) -> (Vec<f32>, Vec<f32>) {
    let mut min = Vec3::splat(f32::INFINITY);
    let mut max = Vec3::splat(f32::NEG_INFINITY);
    for i in 0..stream.count() {
        let element = stream.element(i);
        let p = Vec3::new(element[0], element[1], element[2]);
        min = min.min(p);
        max = max.max(p);
    }
    if stream.count() == 0 {
        return (vec![0.0; 3], vec![0.0; 3]);
    }
    (min.to_array().to_vec(), max.to_array().to_vec())
}

/// Pack `streams` into the vertex slot for `vertex_type` and emit one accessor per attribute
///
/// Returns attribute → accessor index. Accessors reference the slot
/// ordinal until the export is finalized.
pub(crate) fn append_vertex_accessors(
    mesh_name: &str,
    vertex_type: VertexType,
    streams: &BTreeMap<Attribute, Stream>,
    views: &mut FixedBufferViews,
    accessors: &mut Vec<json::Accessor>,
) -> BTreeMap<Attribute, u32> {
    let count = streams
        .get(&Attribute::Position)
        .map(Stream::count)
        .unwrap_or(0);
    let slot = BufferViewSlot::for_vertex_type(vertex_type);
    let start = views.append_raw(slot, &pack_vertices(vertex_type, streams, count));

    let mut attributes = BTreeMap::new();
    for (&attribute, stream) in streams {
        let Some(field) = vertex_type.field(attribute) else {
            continue;
        };
        let (component_type, type_) = accessor_format(field.format);
        let mut accessor = document::new_accessor(
            slot.ordinal() as u32,
            start + field.offset,
            component_type,
            type_,
            count,
            Some(format!("{mesh_name}_vertices#0_{attribute}")),
        );
        if attribute == Attribute::Position {
            let (min, max) = position_bounds(stream);
            document::set_bounds(&mut accessor, &min, &max);
        }
        let index = json::Index::push(accessors, accessor);
        attributes.insert(attribute, index.value() as u32);
    }
    attributes
}
