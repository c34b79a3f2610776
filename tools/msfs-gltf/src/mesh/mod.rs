//! Mesh packing pipeline
//!
//! Turns the primitives of one scene-graph mesh into output primitives whose
//! vertex data sits in a fixed vertex buffer view and whose 16-bit indices sit
//! in the index view:
//!
//! 1. Resolve attribute streams, fold extra joint influences, drop attributes
//!    the vertex layout has no slot for, and check vertex/index counts
//! 2. Reverse triangle winding
//! 3. Split index ranges above the threshold ([`split`])
//! 4. Unskinned meshes: merge every primitive into one shared vertex range
//!    and one shared index accessor ([`merge`]). Skinned meshes: pack each
//!    primitive on its own
//! 5. Pack vertex records ([`packing`])

mod influences;
mod merge;
mod packing;
pub mod split;

pub use packing::accessor_format;
pub use split::{IndexChunk, reverse_winding, split_indices};

use gltf_json as json;
use json::accessor::{ComponentType, Type};
use msfs_common::{Attribute, VertexType};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::buffer_views::{BufferViewSlot, FixedBufferViews};
use crate::document::{self, AsoboPrimitive, VERTEX_VERSION};
use crate::error::{ExportError, Result};
use crate::scene::{Accessor, AccessorData, Arena, Handle, Material, Mesh, Primitive};
use crate::settings::ExportSettings;

/// Flat float components of one attribute
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Stream {
    pub components: usize,
    pub data: Vec<f32>,
}

impl Stream {
    pub fn new(components: usize, data: Vec<f32>) -> Self {
        Self { components, data }
    }

    pub fn count(&self) -> usize {
        if self.components == 0 {
            0
        } else {
            self.data.len() / self.components
        }
    }

    /// Components of element `i`, empty when out of range
    pub fn element(&self, i: usize) -> &[f32] {
        let start = i * self.components;
        self.data
            .get(start..start + self.components)
            .unwrap_or(&[])
    }
}

/// A scene-graph primitive with its data resolved and validated
#[derive(Debug, Clone)]
pub(crate) struct SourcePrimitive {
    pub streams: BTreeMap<Attribute, Stream>,
    pub indices: Vec<u32>,
    pub vertex_type: VertexType,
    pub vertex_count: usize,
}

/// Output primitive before material and extension resolution
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PackedPrimitive {
    /// Index of the scene-graph primitive this was produced from
    pub source: usize,
    pub attributes: BTreeMap<Attribute, u32>,
    pub indices: u32,
    pub material: Option<Handle<Material>>,
    pub asobo: AsoboPrimitive,
}

/// Check `max(indices) + 1 == vertex_count`
fn check_index_range(
    mesh: &str,
    primitive: usize,
    max_index: Option<u32>,
    vertex_count: usize,
) -> Result<()> {
    let addressed = max_index.map_or(0, |max| max as usize + 1);
    if addressed != vertex_count {
        return Err(ExportError::IndexCountMismatch {
            mesh: mesh.to_string(),
            primitive,
            addressed,
            positions: vertex_count,
        });
    }
    Ok(())
}

/// Packs meshes into the fixed buffer views and the output accessor list
pub(crate) struct MeshPacker<'a> {
    pub accessors: &'a Arena<Accessor>,
    pub settings: &'a ExportSettings,
    pub views: &'a mut FixedBufferViews,
    pub output: &'a mut Vec<json::Accessor>,
}

impl MeshPacker<'_> {
    /// Pack every primitive of `mesh`
    pub fn pack(&mut self, mesh: &Mesh) -> Result<Vec<PackedPrimitive>> {
        let sources = mesh
            .primitives
            .iter()
            .enumerate()
            .map(|(i, primitive)| self.resolve_primitive(mesh, i, primitive))
            .collect::<Result<Vec<_>>>()?;
        let vertex_count: usize = sources.iter().map(|s| s.vertex_count).sum();

        let skinned = mesh.is_skinned();
        let mut packed = if skinned {
            self.pack_independent(&mesh.name, sources)?
        } else {
            self.pack_merged(&mesh.name, sources)?
        };
        for primitive in &mut packed {
            primitive.material = mesh.primitives[primitive.source].material;
        }

        info!(
            mesh = %mesh.name,
            primitives = packed.len(),
            vertices = vertex_count,
            skinned,
            "packed mesh"
        );
        Ok(packed)
    }

    fn accessor(&self, handle: Handle<Accessor>) -> Result<&Accessor> {
        self.accessors
            .get(handle)
            .ok_or(ExportError::InvalidHandle {
                kind: "accessor",
                index: handle.index(),
            })
    }

    fn resolve_primitive(
        &self,
        mesh: &Mesh,
        index: usize,
        primitive: &Primitive,
    ) -> Result<SourcePrimitive> {
        let vertex_type = primitive.vertex_type;

        let mut raw = BTreeMap::new();
        for (name, &handle) in &primitive.attributes {
            let accessor = self.accessor(handle)?;
            let components = accessor.components();
            let data = accessor
                .to_f32()
                .ok_or_else(|| ExportError::UnexpectedAccessorData {
                    accessor: format!("{}.{name}", mesh.name),
                    reason: "vertex attributes need numeric data, found pre-encoded bytes".into(),
                })?;
            if data.len() % components != 0 {
                return Err(ExportError::UnexpectedAccessorData {
                    accessor: format!("{}.{name}", mesh.name),
                    reason: format!("{} values do not form whole {components}-component elements", data.len()),
                });
            }
            raw.insert(name.clone(), Stream::new(components, data));
        }

        if vertex_type.is_blend() {
            influences::limit_influences(
                &mut raw,
                self.settings.all_vertex_influences,
                vertex_type == VertexType::Blend4,
                &mesh.name,
                index,
            );
        }

        let mut streams = BTreeMap::new();
        for (name, stream) in raw {
            match Attribute::from_name(&name).filter(|&a| vertex_type.field(a).is_some()) {
                Some(attribute) => {
                    streams.insert(attribute, prepare_stream(attribute, stream));
                }
                None => warn!(
                    mesh = %mesh.name,
                    primitive = index,
                    attribute = %name,
                    layout = %vertex_type,
                    "attribute has no slot in vertex layout, dropping"
                ),
            }
        }

        let positions = streams
            .get(&Attribute::Position)
            .ok_or_else(|| ExportError::MissingPosition {
                mesh: mesh.name.clone(),
                primitive: index,
            })?;
        if positions.components != 3 {
            return Err(ExportError::UnexpectedAccessorData {
                accessor: format!("{}.POSITION", mesh.name),
                reason: format!("expected VEC3, found {} components", positions.components),
            });
        }
        let vertex_count = positions.count();

        for (attribute, stream) in &streams {
            if stream.count() != vertex_count {
                return Err(ExportError::AttributeCountMismatch {
                    mesh: mesh.name.clone(),
                    primitive: index,
                    attribute: attribute.name().to_string(),
                    expected: vertex_count,
                    found: stream.count(),
                });
            }
        }

        let indices = match &self.accessor(primitive.indices)?.data {
            AccessorData::Index(indices) => indices.clone(),
            AccessorData::UnsignedShort(indices) => indices.iter().map(|&i| i as u32).collect(),
            _ => {
                return Err(ExportError::UnexpectedAccessorData {
                    accessor: format!("{}.indices", mesh.name),
                    reason: "indices must be integer data".into(),
                });
            }
        };
        if indices.len() % 3 != 0 {
            return Err(ExportError::Split {
                mesh: mesh.name.clone(),
                primitive: index,
                source: crate::error::SplitError::PartialTriangle(indices.len()),
            });
        }
        check_index_range(&mesh.name, index, indices.iter().copied().max(), vertex_count)?;

        Ok(SourcePrimitive {
            streams,
            indices,
            vertex_type,
            vertex_count,
        })
    }

    fn split(&self, mesh: &str, primitive: usize, indices: &[u32]) -> Result<Vec<IndexChunk>> {
        split_indices(indices, self.settings.split_threshold).map_err(|source| ExportError::Split {
            mesh: mesh.to_string(),
            primitive,
            source,
        })
    }

    /// Write u16 indices to the index view and emit their accessor
    fn append_index_accessor(&mut self, name: String, indices: &[u16]) -> u32 {
        let offset = self.views.append(BufferViewSlot::Index, bytemuck::cast_slice(indices));
        let accessor = document::new_accessor(
            BufferViewSlot::Index.ordinal() as u32,
            offset,
            ComponentType::U16,
            Type::Scalar,
            indices.len(),
            Some(name),
        );
        json::Index::push(self.output, accessor).value() as u32
    }

    /// Skinned meshes: every primitive keeps its own vertex range and index accessors
    fn pack_independent(
        &mut self,
        mesh: &str,
        sources: Vec<SourcePrimitive>,
    ) -> Result<Vec<PackedPrimitive>> {
        let mut packed = Vec::new();
        for (index, mut source) in sources.into_iter().enumerate() {
            reverse_winding(&mut source.indices);
            let chunks = self.split(mesh, index, &source.indices)?;
            let max_index = chunks.iter().filter_map(IndexChunk::max_source_index).max();
            check_index_range(mesh, index, max_index, source.vertex_count)?;
            if chunks.is_empty() {
                warn!(mesh = %mesh, primitive = index, "primitive has no triangles, skipping");
                continue;
            }

            let attributes = packing::append_vertex_accessors(
                mesh,
                source.vertex_type,
                &source.streams,
                self.views,
                self.output,
            );

            for chunk in chunks {
                let indices =
                    self.append_index_accessor(format!("{mesh}_indices#{}", packed.len()), &chunk.indices);
                packed.push(PackedPrimitive {
                    source: index,
                    attributes: attributes.clone(),
                    indices,
                    material: None,
                    asobo: AsoboPrimitive {
                        base_vertex_index: (chunk.base_vertex_index != 0)
                            .then_some(chunk.base_vertex_index),
                        primitive_count: chunk.triangle_count(),
                        start_index: None,
                        vertex_type: source.vertex_type,
                        vertex_version: VERTEX_VERSION,
                    },
                });
            }
        }
        Ok(packed)
    }
}

/// Fill in components the record layout expects but the source omitted
fn prepare_stream(attribute: Attribute, stream: Stream) -> Stream {
    if attribute == Attribute::Color0 && stream.components == 3 {
        // RGB → RGBA, opaque
        let data = stream
            .data
            .chunks_exact(3)
            .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], 1.0])
            .collect();
        return Stream::new(4, data);
    }
    stream
}
