//! Programmatic scene graph construction for integration tests.
//!
//! Builders return handles into a caller-owned [`SceneGraph`] so tests can
//! share objects between nodes, and decoding helpers read packed fields back
//! out of a finalized export.

#![allow(dead_code)]

use gltf_json as json;
use json::accessor::Type;
use msfs_gltf::scene::{Accessor, Mesh, Node, Primitive, Scene};
use msfs_gltf::{ExportedGltf, Handle, SceneGraph, VertexType};

/// Install a test-writer subscriber so `RUST_LOG=debug` shows exporter logs
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Unit quad corners in the XY plane
pub const QUAD_POSITIONS: [[f32; 3]; 4] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [1.0, 1.0, 0.0],
    [0.0, 1.0, 0.0],
];

/// Six triangles over four vertices
pub const CUBE_FACE_INDICES: [u32; 18] = [0, 1, 2, 0, 2, 3, 2, 1, 0, 3, 2, 0, 0, 1, 3, 1, 2, 3];

fn flatten<const N: usize>(values: &[[f32; N]]) -> Vec<f32> {
    values.iter().flatten().copied().collect()
}

/// Four-vertex, six-triangle static primitive with positions and normals
pub fn cube_face(graph: &mut SceneGraph) -> Primitive {
    let positions = graph
        .accessors
        .insert(Accessor::float(Type::Vec3, flatten(&QUAD_POSITIONS)));
    let normals = graph
        .accessors
        .insert(Accessor::float(Type::Vec3, flatten(&[[0.0, 0.0, 1.0]; 4])));
    let indices = graph
        .accessors
        .insert(Accessor::indices(CUBE_FACE_INDICES.to_vec()));
    Primitive::new(VertexType::Vtx, indices)
        .with_attribute("POSITION", positions)
        .with_attribute("NORMAL", normals)
}

/// Static primitive of `vertex_count` vertices indexed `0..vertex_count` in order
pub fn linear_strip(graph: &mut SceneGraph, vertex_count: u32) -> Primitive {
    let positions: Vec<f32> = (0..vertex_count)
        .flat_map(|i| [i as f32, (i % 3) as f32, 0.0])
        .collect();
    let positions = graph.accessors.insert(Accessor::float(Type::Vec3, positions));
    let indices = graph
        .accessors
        .insert(Accessor::indices((0..vertex_count).collect()));
    Primitive::new(VertexType::Vtx, indices).with_attribute("POSITION", positions)
}

/// Skinned quad bound to `joint` with full weight
pub fn skinned_quad(graph: &mut SceneGraph, vertex_type: VertexType, joint: u16) -> Primitive {
    let positions = graph
        .accessors
        .insert(Accessor::float(Type::Vec3, flatten(&QUAD_POSITIONS)));
    let joints = graph
        .accessors
        .insert(Accessor::joints([joint, 0, 0, 0].repeat(4)));
    let weights = graph
        .accessors
        .insert(Accessor::float(Type::Vec4, [1.0, 0.0, 0.0, 0.0].repeat(4)));
    let indices = graph
        .accessors
        .insert(Accessor::indices(vec![0, 1, 2, 0, 2, 3]));
    Primitive::new(vertex_type, indices)
        .with_attribute("POSITION", positions)
        .with_attribute("JOINTS_0", joints)
        .with_attribute("WEIGHTS_0", weights)
}

/// Scene holding one node per mesh
pub fn scene_with_meshes(graph: &mut SceneGraph, meshes: Vec<Mesh>) -> Handle<Scene> {
    let nodes = meshes
        .into_iter()
        .map(|mesh| {
            let name = mesh.name.clone();
            let mesh = graph.meshes.insert(mesh);
            graph.nodes.insert(Node {
                mesh: Some(mesh),
                ..Node::named(name)
            })
        })
        .collect();
    graph.scenes.insert(Scene {
        nodes,
        ..Scene::default()
    })
}

// ============================================================================
// Decoding
// ============================================================================

/// Bytes of element `element` of accessor `index`, sized to the accessor's element
pub fn element_bytes(exported: &ExportedGltf, index: u32, element: usize) -> &[u8] {
    let root = &exported.document.root;
    let accessor = &root.accessors[index as usize];
    let view = &root.buffer_views[accessor.buffer_view.expect("accessor has a view").value()];
    let component_type = msfs_gltf::document::component_type(accessor).expect("valid component type");
    let type_ = msfs_gltf::document::accessor_type(accessor).expect("valid type");
    let element_size = component_type.size() * type_.multiplicity();
    let stride = view.byte_stride.map_or(element_size, |stride| stride.0);
    let start = view.byte_offset.map_or(0, |offset| offset.0 as usize)
        + accessor.byte_offset.map_or(0, |offset| offset.0 as usize)
        + element * stride;
    &exported.binary[start..start + element_size]
}

/// Accessor index bound to attribute `name` (e.g. `"POSITION"`) of a primitive
pub fn attribute(primitive: &json::mesh::Primitive, name: &str) -> Option<u32> {
    primitive
        .attributes
        .iter()
        .find(|(semantic, _)| semantic.to_string() == name)
        .map(|(_, accessor)| accessor.value() as u32)
}

/// `ASOBO_primitive` record from a primitive's extras
pub fn asobo(primitive: &json::mesh::Primitive) -> serde_json::Value {
    let extras = primitive.extras.as_ref().expect("primitive has extras");
    let extras: serde_json::Value = serde_json::from_str(extras.get()).expect("extras are JSON");
    extras["ASOBO_primitive"].clone()
}

/// Optional `u32` field of an `ASOBO_primitive` record
pub fn asobo_u32(record: &serde_json::Value, field: &str) -> Option<u32> {
    record[field].as_u64().map(|value| value as u32)
}

pub fn f32s(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

pub fn u16s(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .collect()
}

/// Index values of accessor `index` in `[start, start + count)`
pub fn index_range(exported: &ExportedGltf, index: u32, start: usize, count: usize) -> Vec<u32> {
    (start..start + count)
        .map(|i| u16s(element_bytes(exported, index, i))[0] as u32)
        .collect()
}
