//! Merged packing for unskinned meshes
//!
//! All primitives share one vertex range and one index accessor; each output
//! primitive selects its triangles with `StartIndex`/`PrimitiveCount`.

use msfs_common::Attribute;
use std::collections::BTreeMap;
use tracing::warn;

use super::{IndexChunk, MeshPacker, PackedPrimitive, SourcePrimitive, Stream, check_index_range, packing, reverse_winding};
use crate::document::{AsoboPrimitive, VERTEX_VERSION};
use crate::error::{ExportError, Result};

impl MeshPacker<'_> {
    pub(super) fn pack_merged(
        &mut self,
        mesh: &str,
        mut sources: Vec<SourcePrimitive>,
    ) -> Result<Vec<PackedPrimitive>> {
        let Some(first) = sources.first() else {
            return Ok(Vec::new());
        };
        let vertex_type = first.vertex_type;

        // Offset every primitive's indices into the shared vertex range, then split
        let mut chunks: Vec<(usize, IndexChunk)> = Vec::new();
        let mut vertex_offset = 0u32;
        for (index, source) in sources.iter_mut().enumerate() {
            reverse_winding(&mut source.indices);
            for i in &mut source.indices {
                *i += vertex_offset;
            }
            chunks.extend(
                self.split(mesh, index, &source.indices)?
                    .into_iter()
                    .map(|chunk| (index, chunk)),
            );
            vertex_offset += source.vertex_count as u32;
        }

        let streams = concat_streams(mesh, &sources)?;
        let max_index = chunks.iter().filter_map(|(_, c)| c.max_source_index()).max();
        check_index_range(mesh, 0, max_index, vertex_offset as usize)?;
        if chunks.is_empty() {
            warn!(mesh, "mesh has no triangles, skipping");
            return Ok(Vec::new());
        }

        let attributes =
            packing::append_vertex_accessors(mesh, vertex_type, &streams, self.views, self.output);

        let indices: Vec<u16> = chunks
            .iter()
            .flat_map(|(_, chunk)| chunk.indices.iter().copied())
            .collect();
        let index_accessor =
            self.append_index_accessor(format!("{mesh}_indices#{}", chunks.len() - 1), &indices);

        let starts = start_indices(chunks.iter().map(|(_, c)| c.triangle_count()));
        Ok(chunks
            .into_iter()
            .zip(starts)
            .map(|((source, chunk), start_index)| PackedPrimitive {
                source,
                attributes: attributes.clone(),
                indices: index_accessor,
                material: None,
                asobo: AsoboPrimitive {
                    base_vertex_index: (chunk.base_vertex_index != 0)
                        .then_some(chunk.base_vertex_index),
                    primitive_count: chunk.triangle_count(),
                    start_index,
                    vertex_type,
                    vertex_version: VERTEX_VERSION,
                },
            })
            .collect())
    }
}

/// Concatenate the streams of every primitive, keyed by the first primitive's attributes
fn concat_streams(mesh: &str, sources: &[SourcePrimitive]) -> Result<BTreeMap<Attribute, Stream>> {
    let Some(first) = sources.first() else {
        return Ok(BTreeMap::new());
    };

    let mut merged: BTreeMap<Attribute, Stream> = first
        .streams
        .iter()
        .map(|(&attribute, stream)| (attribute, Stream::new(stream.components, Vec::new())))
        .collect();

    for (index, source) in sources.iter().enumerate() {
        for (attribute, target) in &mut merged {
            let stream = source
                .streams
                .get(attribute)
                .ok_or_else(|| ExportError::MissingMergedAttribute {
                    mesh: mesh.to_string(),
                    primitive: index,
                    attribute: attribute.name().to_string(),
                })?;
            if stream.components == target.components {
                target.data.extend_from_slice(&stream.data);
            } else {
                // Widen or truncate to the first primitive's element size
                for i in 0..stream.count() {
                    let element = stream.element(i);
                    target.data.extend(
                        (0..target.components).map(|c| element.get(c).copied().unwrap_or(0.0)),
                    );
                }
            }
        }
        for attribute in source.streams.keys().filter(|a| !merged.contains_key(a)) {
            warn!(
                mesh,
                primitive = index,
                attribute = %attribute,
                "attribute missing from the first primitive, dropped when merging"
            );
        }
    }
    Ok(merged)
}

/// `StartIndex` of consecutive draw ranges: unset for the first, then
/// three times the triangles before it
fn start_indices(triangle_counts: impl Iterator<Item = u32>) -> Vec<Option<u32>> {
    let mut triangles = 0;
    triangle_counts
        .enumerate()
        .map(|(i, count)| {
            let start = (i > 0).then_some(triangles * 3);
            triangles += count;
            start
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_views::{BufferViewSlot, FixedBufferViews};
    use crate::scene::{Accessor, Mesh, Primitive, SceneGraph};
    use crate::settings::ExportSettings;
    use gltf_json as json;
    use json::accessor::Type;
    use json::validation::USize64;
    use msfs_common::VertexType;

    /// Four corners, six triangles (a doubled quad plus a fan)
    fn cube_face(scene: &mut SceneGraph) -> Primitive {
        let positions = scene.accessors.insert(Accessor::float(
            Type::Vec3,
            vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
        ));
        let normals = scene
            .accessors
            .insert(Accessor::float(Type::Vec3, [0.0, 0.0, 1.0].repeat(4)));
        let indices = scene.accessors.insert(Accessor::indices(vec![
            0, 1, 2, 0, 2, 3, 2, 1, 0, 3, 2, 0, 0, 1, 3, 1, 2, 3,
        ]));
        Primitive::new(VertexType::Vtx, indices)
            .with_attribute("POSITION", positions)
            .with_attribute("NORMAL", normals)
    }

    fn pack(
        scene: &SceneGraph,
        mesh: &Mesh,
        settings: &ExportSettings,
    ) -> Result<(Vec<PackedPrimitive>, Vec<json::Accessor>, FixedBufferViews)> {
        let mut views = FixedBufferViews::new();
        let mut output = Vec::new();
        let packed = MeshPacker {
            accessors: &scene.accessors,
            settings,
            views: &mut views,
            output: &mut output,
        }
        .pack(mesh)?;
        Ok((packed, output, views))
    }

    #[test]
    fn test_start_indices() {
        assert_eq!(
            start_indices([6, 6, 2].into_iter()),
            vec![None, Some(18), Some(36)]
        );
        assert!(start_indices(std::iter::empty()).is_empty());
    }

    #[test]
    fn test_cube_primitives_share_vertices_and_indices() {
        let mut scene = SceneGraph::new();
        let first = cube_face(&mut scene);
        let second = cube_face(&mut scene);
        let mesh = Mesh::new("cube", vec![first, second]);
        let (packed, accessors, views) = pack(&scene, &mesh, &ExportSettings::default()).unwrap();

        assert_eq!(packed.len(), 2);
        assert_eq!(packed[0].attributes, packed[1].attributes);
        assert_eq!(packed[0].indices, packed[1].indices);

        let position = &accessors[packed[0].attributes[&Attribute::Position] as usize];
        assert_eq!(position.count, USize64(8));
        let indices = &accessors[packed[0].indices as usize];
        assert_eq!(indices.count, USize64(36));
        assert_eq!(indices.name.as_deref(), Some("cube_indices#1"));

        assert_eq!(packed[0].asobo.start_index, None);
        assert_eq!(packed[1].asobo.start_index, Some(18));
        assert_eq!(packed[0].asobo.primitive_count, 6);
        assert_eq!(packed[1].asobo.base_vertex_index, None);
        assert_eq!(packed[1].source, 1);

        assert_eq!(views.byte_length(BufferViewSlot::VertexNd), 8 * 36);
        // Second primitive's reversed first triangle, offset by four vertices
        let index_data = views.data(BufferViewSlot::Index);
        let at = |i: usize| u16::from_le_bytes([index_data[i * 2], index_data[i * 2 + 1]]);
        assert_eq!([at(18), at(19), at(20)], [6, 5, 4]);
    }

    #[test]
    fn test_attribute_missing_from_later_primitive() {
        let mut scene = SceneGraph::new();
        let first = cube_face(&mut scene);
        let mut second = cube_face(&mut scene);
        second.attributes.remove("NORMAL");
        let mesh = Mesh::new("cube", vec![first, second]);
        let err = pack(&scene, &mesh, &ExportSettings::default()).unwrap_err();
        assert!(matches!(
            err,
            ExportError::MissingMergedAttribute { primitive: 1, ref attribute, .. } if attribute == "NORMAL"
        ));
    }

    #[test]
    fn test_extra_attribute_on_later_primitive_is_dropped() {
        let mut scene = SceneGraph::new();
        let mut first = cube_face(&mut scene);
        first.attributes.remove("NORMAL");
        let second = cube_face(&mut scene);
        let mesh = Mesh::new("cube", vec![first, second]);
        let (packed, _, _) = pack(&scene, &mesh, &ExportSettings::default()).unwrap();
        assert!(!packed[0].attributes.contains_key(&Attribute::Normal));
    }

    #[test]
    fn test_merged_split_rebases_later_primitives() {
        let mut scene = SceneGraph::new();
        let first = cube_face(&mut scene);
        let second = cube_face(&mut scene);
        let mesh = Mesh::new("cube", vec![first, second]);
        let settings = ExportSettings {
            split_threshold: 5,
            ..ExportSettings::default()
        };
        let (packed, accessors, _) = pack(&scene, &mesh, &settings).unwrap();

        assert_eq!(packed.len(), 2);
        assert_eq!(packed[0].asobo.base_vertex_index, None);
        assert_eq!(packed[1].asobo.base_vertex_index, Some(4));
        assert_eq!(packed[1].asobo.start_index, Some(18));
        assert_eq!(accessors[packed[0].indices as usize].count, USize64(36));
    }

    #[test]
    fn test_empty_mesh_packs_nothing() {
        let scene = SceneGraph::new();
        let mesh = Mesh::new("empty", Vec::new());
        let (packed, accessors, _) = pack(&scene, &mesh, &ExportSettings::default()).unwrap();
        assert!(packed.is_empty());
        assert!(accessors.is_empty());
    }

    #[test]
    fn test_primitive_without_triangles_packs_nothing() {
        let mut scene = SceneGraph::new();
        let positions = scene.accessors.insert(Accessor::float(Type::Vec3, Vec::new()));
        let indices = scene.accessors.insert(Accessor::indices(Vec::new()));
        let mesh = Mesh::new(
            "hollow",
            vec![Primitive::new(VertexType::Vtx, indices).with_attribute("POSITION", positions)],
        );
        let (packed, accessors, views) = pack(&scene, &mesh, &ExportSettings::default()).unwrap();
        assert!(packed.is_empty());
        assert!(accessors.is_empty());
        assert_eq!(views.byte_length(BufferViewSlot::Index), 0);
    }

    #[test]
    fn test_empty_primitive_beside_others_is_dropped() {
        let mut scene = SceneGraph::new();
        let first = cube_face(&mut scene);
        let positions = scene.accessors.insert(Accessor::float(Type::Vec3, Vec::new()));
        let normals = scene.accessors.insert(Accessor::float(Type::Vec3, Vec::new()));
        let indices = scene.accessors.insert(Accessor::indices(Vec::new()));
        let empty = Primitive::new(VertexType::Vtx, indices)
            .with_attribute("POSITION", positions)
            .with_attribute("NORMAL", normals);
        let mesh = Mesh::new("cube", vec![first, empty]);
        let (packed, accessors, _) = pack(&scene, &mesh, &ExportSettings::default()).unwrap();
        assert_eq!(packed.len(), 1);
        assert_eq!(packed[0].source, 0);
        assert_eq!(accessors[packed[0].indices as usize].name.as_deref(), Some("cube_indices#0"));
    }
}
