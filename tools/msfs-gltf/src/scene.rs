//! In-memory scene graph supplied by the host
//!
//! Objects live in typed arenas and refer to each other through [`Handle`]s.
//! A handle is assigned when an object is inserted and never changes, which
//! gives the exporter a stable identity to memoize on. Sharing an object
//! (a mesh instanced by two nodes, an accessor used by two primitives) means
//! storing the same handle twice.

use gltf_json::accessor::{ComponentType, Type};
use msfs_common::VertexType;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

pub use gltf_json::animation::{Interpolation, Property};
pub use gltf_json::material::AlphaMode;
pub use gltf_json::texture::{MagFilter, MinFilter, WrappingMode};

use crate::value::Value;

// ============================================================================
// Arena
// ============================================================================

/// Typed index into an [`Arena`]
pub struct Handle<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub const fn new(index: u32) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    pub const fn index(self) -> u32 {
        self.index
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.index)
    }
}

/// Append-only object store
#[derive(Debug, Clone)]
pub struct Arena<T> {
    items: Vec<T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: T) -> Handle<T> {
        let handle = Handle::new(self.items.len() as u32);
        self.items.push(item);
        handle
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.items.get(handle.index as usize)
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.items.get_mut(handle.index as usize)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| (Handle::new(i as u32), item))
    }
}

/// Handle to an object of any root type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RootRef {
    Accessor(Handle<Accessor>),
    Animation(Handle<Animation>),
    Camera(Handle<Camera>),
    Image(Handle<Image>),
    Material(Handle<Material>),
    Mesh(Handle<Mesh>),
    Node(Handle<Node>),
    Sampler(Handle<Sampler>),
    Scene(Handle<Scene>),
    Skin(Handle<Skin>),
    Texture(Handle<Texture>),
}

impl RootRef {
    /// Root type name, for diagnostics
    pub const fn kind(self) -> &'static str {
        match self {
            Self::Accessor(_) => "accessor",
            Self::Animation(_) => "animation",
            Self::Camera(_) => "camera",
            Self::Image(_) => "image",
            Self::Material(_) => "material",
            Self::Mesh(_) => "mesh",
            Self::Node(_) => "node",
            Self::Sampler(_) => "sampler",
            Self::Scene(_) => "scene",
            Self::Skin(_) => "skin",
            Self::Texture(_) => "texture",
        }
    }

    pub const fn index(self) -> u32 {
        match self {
            Self::Accessor(h) => h.index(),
            Self::Animation(h) => h.index(),
            Self::Camera(h) => h.index(),
            Self::Image(h) => h.index(),
            Self::Material(h) => h.index(),
            Self::Mesh(h) => h.index(),
            Self::Node(h) => h.index(),
            Self::Sampler(h) => h.index(),
            Self::Scene(h) => h.index(),
            Self::Skin(h) => h.index(),
            Self::Texture(h) => h.index(),
        }
    }
}

impl fmt::Display for RootRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.index())
    }
}

/// All objects of one export
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    pub accessors: Arena<Accessor>,
    pub animations: Arena<Animation>,
    pub cameras: Arena<Camera>,
    pub images: Arena<Image>,
    pub materials: Arena<Material>,
    pub meshes: Arena<Mesh>,
    pub nodes: Arena<Node>,
    pub samplers: Arena<Sampler>,
    pub scenes: Arena<Scene>,
    pub skins: Arena<Skin>,
    pub textures: Arena<Texture>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }
}

// ============================================================================
// Accessors
// ============================================================================

/// Typed array pending placement in a buffer view
#[derive(Debug, Clone, PartialEq)]
pub struct Accessor {
    pub name: Option<String>,
    pub component_type: ComponentType,
    pub type_: Type,
    pub normalized: bool,
    pub data: AccessorData,
}

/// Raw contents of an accessor
#[derive(Debug, Clone, PartialEq)]
pub enum AccessorData {
    /// Flat float components (positions, normals, UVs, weights, animation tracks)
    Float(Vec<f32>),
    /// Flat 16-bit components (joint indices)
    UnsignedShort(Vec<u16>),
    /// Triangle list indices before splitting
    Index(Vec<u32>),
    /// Pre-encoded little-endian bytes
    Binary(Vec<u8>),
}

impl Accessor {
    /// Float accessor of the given type
    pub fn float(type_: Type, data: Vec<f32>) -> Self {
        Self {
            name: None,
            component_type: ComponentType::F32,
            type_,
            normalized: false,
            data: AccessorData::Float(data),
        }
    }

    /// Joint index accessor (VEC4 of u16)
    pub fn joints(data: Vec<u16>) -> Self {
        Self {
            name: None,
            component_type: ComponentType::U16,
            type_: Type::Vec4,
            normalized: false,
            data: AccessorData::UnsignedShort(data),
        }
    }

    /// Triangle list indices
    pub fn indices(data: Vec<u32>) -> Self {
        Self {
            name: None,
            component_type: ComponentType::U16,
            type_: Type::Scalar,
            normalized: false,
            data: AccessorData::Index(data),
        }
    }

    /// Pre-encoded data of an explicit layout
    pub fn binary(component_type: ComponentType, type_: Type, data: Vec<u8>) -> Self {
        Self {
            name: None,
            component_type,
            type_,
            normalized: false,
            data: AccessorData::Binary(data),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Components per element
    pub fn components(&self) -> usize {
        self.type_.multiplicity()
    }

    /// Number of elements
    pub fn count(&self) -> usize {
        let components = self.components();
        match &self.data {
            AccessorData::Float(v) => v.len() / components,
            AccessorData::UnsignedShort(v) => v.len() / components,
            AccessorData::Index(v) => v.len(),
            AccessorData::Binary(v) => v.len() / (components * self.component_type.size()),
        }
    }

    /// Components widened to f32, when the data is numeric
    ///
    /// Binary data is decoded for the float and 16-bit component types only.
    pub fn to_f32(&self) -> Option<Vec<f32>> {
        match &self.data {
            AccessorData::Float(v) => Some(v.clone()),
            AccessorData::UnsignedShort(v) => Some(v.iter().map(|&x| x as f32).collect()),
            AccessorData::Index(v) => Some(v.iter().map(|&x| x as f32).collect()),
            AccessorData::Binary(v) => match self.component_type {
                ComponentType::F32 => Some(
                    v.chunks_exact(4)
                        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                        .collect(),
                ),
                ComponentType::U16 => Some(
                    v.chunks_exact(2)
                        .map(|b| u16::from_le_bytes([b[0], b[1]]) as f32)
                        .collect(),
                ),
                _ => None,
            },
        }
    }

    /// Encoded little-endian bytes as stored in a buffer view
    ///
    /// Returns the first offending value as `Err` when an index does not fit `u16`.
    pub fn to_bytes(&self) -> Result<Vec<u8>, u32> {
        match &self.data {
            AccessorData::Float(v) => Ok(bytemuck::cast_slice(v).to_vec()),
            AccessorData::UnsignedShort(v) => Ok(bytemuck::cast_slice(v).to_vec()),
            AccessorData::Index(v) => {
                let narrowed = v
                    .iter()
                    .map(|&x| u16::try_from(x).map_err(|_| x))
                    .collect::<Result<Vec<u16>, u32>>()?;
                Ok(bytemuck::cast_slice(&narrowed).to_vec())
            }
            AccessorData::Binary(v) => Ok(v.clone()),
        }
    }
}

// ============================================================================
// Geometry
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub name: String,
    pub primitives: Vec<Primitive>,
    pub weights: Vec<f32>,
    pub extensions: BTreeMap<String, Value>,
    pub extras: Option<Value>,
}

impl Mesh {
    pub fn new(name: impl Into<String>, primitives: Vec<Primitive>) -> Self {
        Self {
            name: name.into(),
            primitives,
            weights: Vec::new(),
            extensions: BTreeMap::new(),
            extras: None,
        }
    }

    /// True when any primitive uses a bone-blend layout
    pub fn is_skinned(&self) -> bool {
        self.primitives.iter().any(|p| p.vertex_type.is_blend())
    }
}

/// One drawable surface of a mesh
#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    /// Attribute semantic name → accessor
    pub attributes: BTreeMap<String, Handle<Accessor>>,
    pub indices: Handle<Accessor>,
    pub material: Option<Handle<Material>>,
    pub vertex_type: VertexType,
    pub extensions: BTreeMap<String, Value>,
}

impl Primitive {
    pub fn new(vertex_type: VertexType, indices: Handle<Accessor>) -> Self {
        Self {
            attributes: BTreeMap::new(),
            indices,
            material: None,
            vertex_type,
            extensions: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, accessor: Handle<Accessor>) -> Self {
        self.attributes.insert(name.into(), accessor);
        self
    }

    pub fn with_material(mut self, material: Handle<Material>) -> Self {
        self.material = Some(material);
        self
    }
}

// ============================================================================
// Scene Graph
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub name: Option<String>,
    pub camera: Option<Handle<Camera>>,
    pub children: Vec<Handle<Node>>,
    pub matrix: Option<[f32; 16]>,
    pub mesh: Option<Handle<Mesh>>,
    pub rotation: Option<[f32; 4]>,
    pub scale: Option<[f32; 3]>,
    pub skin: Option<Handle<Skin>>,
    pub translation: Option<[f32; 3]>,
    pub weights: Vec<f32>,
    pub extensions: BTreeMap<String, Value>,
    pub extras: Option<Value>,
}

impl Node {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    pub name: Option<String>,
    pub nodes: Vec<Handle<Node>>,
    pub extensions: BTreeMap<String, Value>,
    pub extras: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Skin {
    pub name: Option<String>,
    pub inverse_bind_matrices: Option<Handle<Accessor>>,
    pub joints: Vec<Handle<Node>>,
    pub skeleton: Option<Handle<Node>>,
    pub extensions: BTreeMap<String, Value>,
    pub extras: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub name: Option<String>,
    pub projection: Projection,
    pub extensions: BTreeMap<String, Value>,
    pub extras: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        aspect_ratio: Option<f32>,
        yfov: f32,
        zfar: Option<f32>,
        znear: f32,
    },
    Orthographic {
        xmag: f32,
        ymag: f32,
        zfar: f32,
        znear: f32,
    },
}

// ============================================================================
// Animation
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Animation {
    pub name: Option<String>,
    pub channels: Vec<AnimationChannel>,
    pub samplers: Vec<AnimationSampler>,
    pub extensions: BTreeMap<String, Value>,
    pub extras: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationChannel {
    /// Index into the owning animation's samplers
    pub sampler: usize,
    pub node: Handle<Node>,
    pub path: Property,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationSampler {
    /// Keyframe times (SCALAR)
    pub input: Handle<Accessor>,
    pub interpolation: Interpolation,
    /// Keyframe values (SCALAR, VEC3 or VEC4)
    pub output: Handle<Accessor>,
}

// ============================================================================
// Materials and Textures
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Material {
    pub name: Option<String>,
    pub pbr_metallic_roughness: Option<PbrMetallicRoughness>,
    pub normal_texture: Option<TextureInfo>,
    pub occlusion_texture: Option<TextureInfo>,
    pub emissive_texture: Option<TextureInfo>,
    pub emissive_factor: Option<[f32; 3]>,
    pub alpha_mode: Option<AlphaMode>,
    pub alpha_cutoff: Option<f32>,
    pub double_sided: bool,
    pub extensions: BTreeMap<String, Value>,
    pub extras: Option<Value>,
}

impl Material {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PbrMetallicRoughness {
    pub base_color_factor: Option<[f32; 4]>,
    pub base_color_texture: Option<TextureInfo>,
    pub metallic_factor: Option<f32>,
    pub roughness_factor: Option<f32>,
    pub metallic_roughness_texture: Option<TextureInfo>,
    pub extensions: BTreeMap<String, Value>,
    pub extras: Option<Value>,
}

/// Inline texture reference (normal, occlusion and base color slots)
#[derive(Debug, Clone, PartialEq)]
pub struct TextureInfo {
    pub index: Handle<Texture>,
    pub tex_coord: u32,
    pub scale: Option<f32>,
    pub strength: Option<f32>,
    pub extensions: BTreeMap<String, Value>,
    pub extras: Option<Value>,
}

impl TextureInfo {
    pub fn new(index: Handle<Texture>) -> Self {
        Self {
            index,
            tex_coord: 0,
            scale: None,
            strength: None,
            extensions: BTreeMap::new(),
            extras: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub name: Option<String>,
    pub sampler: Option<Handle<Sampler>>,
    pub source: Handle<Image>,
    pub extensions: BTreeMap<String, Value>,
    pub extras: Option<Value>,
}

impl Texture {
    pub fn new(source: Handle<Image>) -> Self {
        Self {
            name: None,
            sampler: None,
            source,
            extensions: BTreeMap::new(),
            extras: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sampler {
    pub name: Option<String>,
    pub mag_filter: Option<MagFilter>,
    pub min_filter: Option<MinFilter>,
    pub wrap_s: WrappingMode,
    pub wrap_t: WrappingMode,
    pub extensions: BTreeMap<String, Value>,
    pub extras: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub name: Option<String>,
    pub source: ImageSource,
    pub mime_type: Option<String>,
    pub extensions: BTreeMap<String, Value>,
    pub extras: Option<Value>,
}

/// Where the pixels of an image come from
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// Encoded image to be written next to the document
    Data(ImageData),
    /// Already-resolved URI
    Uri(String),
}

/// Encoded image bytes awaiting the file writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// File stem
    pub name: String,
    pub data: Vec<u8>,
    /// Extension including the leading dot, e.g. `.png`
    pub file_extension: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_handles_are_stable() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_ne!(a, b);
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.get(Handle::new(7)), None);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_accessor_count() {
        let positions = Accessor::float(Type::Vec3, vec![0.0; 12]);
        assert_eq!(positions.count(), 4);
        let indices = Accessor::indices(vec![0, 1, 2, 2, 1, 3]);
        assert_eq!(indices.count(), 6);
        let matrices = Accessor::binary(ComponentType::F32, Type::Mat4, vec![0; 128]);
        assert_eq!(matrices.count(), 2);
    }

    #[test]
    fn test_accessor_bytes_are_little_endian() {
        let joints = Accessor::joints(vec![1, 2, 3, 258]);
        assert_eq!(joints.to_bytes(), Ok(vec![1, 0, 2, 0, 3, 0, 2, 1]));
    }

    #[test]
    fn test_index_bytes_reject_values_above_u16() {
        let fits = Accessor::indices(vec![0, 65535]);
        assert_eq!(fits.to_bytes(), Ok(vec![0, 0, 255, 255]));
        let overflow = Accessor::indices(vec![0, 1, 65536]);
        assert_eq!(overflow.to_bytes(), Err(65536));
    }

    #[test]
    fn test_binary_float_data_widens() {
        let bytes: Vec<u8> = [0.0f32, 0.5, 2.0].iter().flat_map(|x| x.to_le_bytes()).collect();
        let times = Accessor::binary(ComponentType::F32, Type::Scalar, bytes);
        assert_eq!(times.to_f32(), Some(vec![0.0, 0.5, 2.0]));
        let opaque = Accessor::binary(ComponentType::I8, Type::Scalar, vec![1, 2]);
        assert_eq!(opaque.to_f32(), None);
    }

    #[test]
    fn test_mesh_skinned_detection() {
        let mut accessors = Arena::new();
        let indices = accessors.insert(Accessor::indices(vec![0, 1, 2]));
        let mesh = Mesh::new(
            "m",
            vec![
                Primitive::new(VertexType::Vtx, indices),
                Primitive::new(VertexType::Blend1, indices),
            ],
        );
        assert!(mesh.is_skinned());
    }
}
