//! glTF 2.0 export core for Microsoft Flight Simulator assets
//!
//! This library flattens an in-memory scene graph into a glTF document whose
//! binary data follows the simulator's optimized layout:
//! - FixedBufferViews: the eight named buffer views, consolidated into buffer 0
//! - MeshPacker: fixed-stride VTX / BLEND1 / BLEND4 vertex records, 16-bit
//!   split indices and `ASOBO_primitive` draw ranges
//! - GltfExporter: depth-first flattening with per-handle memoization,
//!   extension registration and image naming
//! - ExportSettings: TOML-loadable options
//!
//! # Example
//!
//! ```no_run
//! use msfs_gltf::*;
//! use msfs_gltf::scene::{Accessor, Mesh, Node, Primitive, Scene};
//! use msfs_common::VertexType;
//! use gltf_json::accessor::Type;
//!
//! let mut graph = SceneGraph::new();
//! let positions = graph.accessors.insert(Accessor::float(
//!     Type::Vec3,
//!     vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.5, 1.0, 0.0],
//! ));
//! let indices = graph.accessors.insert(Accessor::indices(vec![0, 1, 2]));
//! let mesh = graph.meshes.insert(Mesh::new(
//!     "Triangle",
//!     vec![Primitive::new(VertexType::Vtx, indices).with_attribute("POSITION", positions)],
//! ));
//! let node = graph.nodes.insert(Node { mesh: Some(mesh), ..Node::default() });
//! let scene = graph.scenes.insert(Scene { nodes: vec![node], ..Scene::default() });
//!
//! let mut exporter = GltfExporter::new(&graph, ExportSettings::default())?;
//! exporter.add_scene(scene, true)?;
//! let exported = exporter.finalize(BufferMode::Glb)?;
//! let glb_bytes = exported.to_glb()?;
//! # Ok::<(), ExportError>(())
//! ```

pub mod buffer;
pub mod buffer_views;
pub mod document;
pub mod error;
pub mod exporter;
pub mod mesh;
pub mod scene;
pub mod settings;
pub mod value;

pub use buffer::Buffer;
pub use buffer_views::{BufferViewSlot, FixedBufferViews};
pub use document::Document;
pub use error::{ExportError, Result, SplitError};
pub use exporter::{BufferMode, ExportedGltf, GltfExporter};
pub use scene::{Handle, RootRef, SceneGraph};
pub use settings::ExportSettings;
pub use value::{Extension, Value};

// Re-export the shared vertex vocabulary
pub use msfs_common::{Attribute, VertexType};
