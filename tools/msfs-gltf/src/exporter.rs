//! Scene graph flattening
//!
//! [`GltfExporter`] walks the scene graph depth first and places every
//! reachable object in its root array of the output [`Document`], replacing
//! references by `gltf_json` indices. Meshes go through the mesh packer; every
//! other binary payload is routed to one of the fixed buffer views by its layout.
//!
//! Each root object is flattened once per export. Its index is memoized on
//! its handle, so sharing an object (a node instanced under two parents, an
//! accessor used as input by two samplers) always yields a single entry.

use gltf_json as json;
use hashbrown::{HashMap, HashSet};
use json::validation::{Checked::Valid, USize64};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::buffer::align_buffer;
use crate::buffer_views::{BufferViewSlot, FixedBufferViews};
use crate::document::{self, Document, Extensions, append_unique};
use crate::error::{ExportError, Result};
use crate::mesh::MeshPacker;
use crate::scene::{
    Accessor, AlphaMode, Animation, Arena, Camera, Handle, Image, ImageData, ImageSource,
    Material, Mesh, Node, Projection, RootRef, Sampler, Scene, SceneGraph, Skin, Texture,
    TextureInfo,
};
use crate::settings::ExportSettings;
use crate::value::{Extension, Value};

/// Draco geometry compression extension name
pub const DRACO_EXTENSION: &str = "KHR_draco_mesh_compression";

/// How the consolidated binary buffer is referenced from the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferMode {
    /// No URI; the bytes travel in the GLB binary chunk
    Glb,
    /// Base64 data URI inside the JSON
    Embedded,
    /// URI of a sidecar `.bin` file
    External(String),
}

/// Finalized export
#[derive(Debug, Clone)]
pub struct ExportedGltf {
    pub document: Document,
    /// Buffer 0 contents; empty when no binary data was exported
    pub binary: Vec<u8>,
    /// Image files to write next to the document, keyed by unique name
    pub images: BTreeMap<String, ImageData>,
}

impl ExportedGltf {
    /// Assemble a GLB container from the document and binary buffer
    pub fn to_glb(&self) -> Result<Vec<u8>> {
        let mut json = self.document.to_json_string()?.into_bytes();
        while json.len() % 4 != 0 {
            json.push(b' ');
        }
        let mut binary = self.binary.clone();
        align_buffer(&mut binary);

        let binary_chunk = if binary.is_empty() { 0 } else { 8 + binary.len() };
        let total_length = 12 + 8 + json.len() + binary_chunk;

        let mut glb = Vec::with_capacity(total_length);
        glb.extend_from_slice(b"glTF");
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&(total_length as u32).to_le_bytes());

        glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
        glb.extend_from_slice(&0x4E4F534Au32.to_le_bytes()); // "JSON"
        glb.extend_from_slice(&json);

        if !binary.is_empty() {
            glb.extend_from_slice(&(binary.len() as u32).to_le_bytes());
            glb.extend_from_slice(&0x004E4942u32.to_le_bytes()); // "BIN\0"
            glb.extend_from_slice(&binary);
        }
        Ok(glb)
    }
}

/// Single-pass exporter for one document
///
/// `finalize` consumes the exporter, so nothing can be added after the
/// buffer views are consolidated.
pub struct GltfExporter<'a> {
    scene: &'a SceneGraph,
    settings: ExportSettings,
    document: Document,
    views: FixedBufferViews,
    images: BTreeMap<String, ImageData>,
    memo: HashMap<RootRef, u32>,
    in_progress: HashSet<RootRef>,
}

impl<'a> GltfExporter<'a> {
    pub fn new(scene: &'a SceneGraph, settings: ExportSettings) -> Result<Self> {
        settings.validate()?;
        let document = Document::new(Some(settings.generator.clone()), settings.copyright.clone());
        Ok(Self {
            scene,
            settings,
            document,
            views: FixedBufferViews::new(),
            images: BTreeMap::new(),
            memo: HashMap::new(),
            in_progress: HashSet::new(),
        })
    }

    /// Document built so far
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Flatten a scene; the active scene becomes `document.scene`
    pub fn add_scene(&mut self, scene: Handle<Scene>, active: bool) -> Result<u32> {
        let index = self.add_root(RootRef::Scene(scene))?;
        if active {
            self.document.root.scene = Some(json::Index::new(index));
        }
        Ok(index)
    }

    pub fn add_animation(&mut self, animation: Handle<Animation>) -> Result<u32> {
        self.add_root(RootRef::Animation(animation))
    }

    /// Insert asset-level extensions, registering each as used
    pub fn add_asset_extensions(&mut self, extensions: &BTreeMap<String, Value>) -> Result<()> {
        for (name, value) in extensions {
            let value = self.flatten_value(value)?;
            self.document.asset_extensions.insert(name.clone(), value);
            self.add_extension_used(name);
        }
        Ok(())
    }

    pub fn add_extension_used(&mut self, name: &str) {
        let used = &mut self.document.root.extensions_used;
        if !used.iter().any(|used| used == name) {
            used.push(name.to_string());
        }
    }

    pub fn add_extension_required(&mut self, name: &str) {
        let required = &mut self.document.root.extensions_required;
        if !required.iter().any(|required| required == name) {
            required.push(name.to_string());
        }
    }

    /// Declare Draco-compressed geometry; readers without a decoder must reject the file
    pub fn add_draco_extension(&mut self) {
        self.add_extension_used(DRACO_EXTENSION);
        self.add_extension_required(DRACO_EXTENSION);
    }

    /// Carry extension declarations over from an imported document
    pub fn add_original_extensions<S: AsRef<str>>(&mut self, required: &[S], used: &[S]) {
        for name in required {
            self.add_extension_required(name.as_ref());
        }
        for name in used {
            self.add_extension_used(name.as_ref());
        }
    }

    /// Consolidate the fixed buffer views into buffer 0 and resolve accessor views
    pub fn finalize(self, mode: BufferMode) -> Result<ExportedGltf> {
        let Self {
            mut document,
            views,
            images,
            ..
        } = self;
        let root = &mut document.root;

        let consolidated = views.consolidate();
        for (index, accessor) in root.accessors.iter_mut().enumerate() {
            let Some(ordinal) = accessor.buffer_view else {
                continue;
            };
            let slot = BufferViewSlot::from_ordinal(ordinal.value() as u32).ok_or(
                ExportError::InvalidHandle {
                    kind: "buffer view",
                    index: ordinal.value() as u32,
                },
            )?;
            let view = consolidated.index_of(slot).ok_or(ExportError::EmptyBufferView {
                accessor: index as u32,
                view: slot.name(),
            })?;
            accessor.buffer_view = Some(json::Index::new(view));
        }

        let byte_length = consolidated.buffer.byte_length();
        if byte_length > 0 {
            let uri = match mode {
                BufferMode::Glb => None,
                BufferMode::Embedded => Some(consolidated.buffer.to_base64_uri()),
                BufferMode::External(uri) => Some(uri),
            };
            root.buffers.push(json::Buffer {
                byte_length: USize64::from(byte_length),
                name: None,
                uri,
                extensions: None,
                extras: Default::default(),
            });
        }
        root.buffer_views = consolidated.views;

        info!(
            accessors = root.accessors.len(),
            buffer_views = root.buffer_views.len(),
            byte_length,
            images = images.len(),
            "finalized export"
        );

        Ok(ExportedGltf {
            document,
            binary: consolidated.buffer.into_bytes(),
            images,
        })
    }

    // ========================================================================
    // Root objects
    // ========================================================================

    fn add_root(&mut self, root: RootRef) -> Result<u32> {
        if let Some(&index) = self.memo.get(&root) {
            debug!(%root, index, "reusing flattened object");
            return Ok(index);
        }
        if !self.in_progress.insert(root) {
            return Err(ExportError::ReferenceCycle(root.to_string()));
        }

        let result = match root {
            RootRef::Accessor(h) => self.add_accessor(h),
            RootRef::Animation(h) => self.flatten_animation(h),
            RootRef::Camera(h) => self.flatten_camera(h),
            RootRef::Image(h) => self.flatten_image(h),
            RootRef::Material(h) => self.flatten_material(h),
            RootRef::Mesh(h) => self.flatten_mesh(h),
            RootRef::Node(h) => self.flatten_node(h),
            RootRef::Sampler(h) => self.flatten_sampler(h),
            RootRef::Scene(h) => self.flatten_scene(h),
            RootRef::Skin(h) => self.flatten_skin(h),
            RootRef::Texture(h) => self.flatten_texture(h),
        };
        self.in_progress.remove(&root);

        let index = result?;
        self.memo.insert(root, index);
        Ok(index)
    }

    fn add_index<T, U>(&mut self, handle: Handle<T>, root: fn(Handle<T>) -> RootRef) -> Result<json::Index<U>> {
        Ok(json::Index::new(self.add_root(root(handle))?))
    }

    fn add_optional<T, U>(
        &mut self,
        handle: Option<Handle<T>>,
        root: fn(Handle<T>) -> RootRef,
    ) -> Result<Option<json::Index<U>>> {
        handle.map(|h| self.add_index(h, root)).transpose()
    }

    fn add_all<T, U>(
        &mut self,
        handles: &[Handle<T>],
        root: fn(Handle<T>) -> RootRef,
    ) -> Result<Vec<json::Index<U>>> {
        handles.iter().map(|&h| self.add_index(h, root)).collect()
    }

    /// Non-vertex accessor, routed to a fixed view by its layout
    fn add_accessor(&mut self, handle: Handle<Accessor>) -> Result<u32> {
        let accessor = lookup(&self.scene.accessors, handle, "accessor")?;
        let label = accessor
            .name
            .clone()
            .unwrap_or_else(|| format!("accessor {}", handle.index()));

        let slot = BufferViewSlot::for_accessor(accessor.component_type, accessor.type_).ok_or_else(
            || ExportError::UnsupportedBinaryLayout {
                accessor: label.clone(),
                component_type: accessor.component_type,
                type_: accessor.type_,
            },
        )?;

        let bytes = accessor
            .to_bytes()
            .map_err(|index| ExportError::IndexOutOfRange {
                accessor: label.clone(),
                index,
            })?;
        let count = accessor.count();
        let expected = count * accessor.components() * accessor.component_type.size();
        if bytes.len() != expected {
            return Err(ExportError::UnexpectedAccessorData {
                accessor: label,
                reason: format!(
                    "{} bytes do not match {count} elements of the declared layout",
                    bytes.len()
                ),
            });
        }

        let offset = self.views.append(slot, &bytes);
        let mut output = document::new_accessor(
            slot.ordinal() as u32,
            offset,
            accessor.component_type,
            accessor.type_,
            count,
            accessor.name.clone(),
        );
        output.normalized = accessor.normalized;

        // Distinct byte ranges: never equal to an existing entry
        Ok(json::Index::push(&mut self.document.root.accessors, output).value() as u32)
    }

    fn flatten_animation(&mut self, handle: Handle<Animation>) -> Result<u32> {
        let scene = self.scene;
        let animation = lookup(&scene.animations, handle, "animation")?;

        let mut samplers = Vec::with_capacity(animation.samplers.len());
        for sampler in &animation.samplers {
            let input = self.add_root(RootRef::Accessor(sampler.input))?;
            self.set_bounds(input, sampler.input)?;
            let output = self.add_root(RootRef::Accessor(sampler.output))?;
            samplers.push(json::animation::Sampler {
                input: json::Index::new(input),
                interpolation: Valid(sampler.interpolation),
                output: json::Index::new(output),
                extensions: None,
                extras: Default::default(),
            });
        }

        let mut channels = Vec::with_capacity(animation.channels.len());
        for channel in &animation.channels {
            if channel.sampler >= samplers.len() {
                return Err(ExportError::InvalidHandle {
                    kind: "animation sampler",
                    index: channel.sampler as u32,
                });
            }
            channels.push(json::animation::Channel {
                sampler: json::Index::new(channel.sampler as u32),
                target: json::animation::Target {
                    node: self.add_index(channel.node, RootRef::Node)?,
                    path: Valid(channel.path),
                    extensions: None,
                    extras: Default::default(),
                },
                extensions: None,
                extras: Default::default(),
            });
        }

        let output = json::Animation {
            channels,
            samplers,
            name: animation.name.clone(),
            extensions: self.extensions(&animation.extensions)?,
            extras: self.extras(&animation.extras)?,
        };
        Ok(append_unique(&mut self.document.root.animations, output)?.value() as u32)
    }

    /// Record per-component min/max on an animation input accessor
    fn set_bounds(&mut self, index: u32, handle: Handle<Accessor>) -> Result<()> {
        let accessor = lookup(&self.scene.accessors, handle, "accessor")?;
        let Some(data) = accessor.to_f32() else {
            return Ok(());
        };
        if let Some(output) = self.document.root.accessors.get_mut(index as usize)
            && output.min.is_none()
        {
            let (min, max) = component_bounds(&data, accessor.components());
            document::set_bounds(output, &min, &max);
        }
        Ok(())
    }

    fn flatten_camera(&mut self, handle: Handle<Camera>) -> Result<u32> {
        let scene = self.scene;
        let camera = lookup(&scene.cameras, handle, "camera")?;
        let (type_, perspective, orthographic) = match camera.projection {
            Projection::Perspective {
                aspect_ratio,
                yfov,
                zfar,
                znear,
            } => (
                json::camera::Type::Perspective,
                Some(json::camera::Perspective {
                    aspect_ratio,
                    yfov,
                    zfar,
                    znear,
                    extensions: None,
                    extras: Default::default(),
                }),
                None,
            ),
            Projection::Orthographic {
                xmag,
                ymag,
                zfar,
                znear,
            } => (
                json::camera::Type::Orthographic,
                None,
                Some(json::camera::Orthographic {
                    xmag,
                    ymag,
                    zfar,
                    znear,
                    extensions: None,
                    extras: Default::default(),
                }),
            ),
        };
        let output = json::Camera {
            type_: Valid(type_),
            perspective,
            orthographic,
            name: camera.name.clone(),
            extensions: self.extensions(&camera.extensions)?,
            extras: self.extras(&camera.extras)?,
        };
        Ok(append_unique(&mut self.document.root.cameras, output)?.value() as u32)
    }

    fn flatten_image(&mut self, handle: Handle<Image>) -> Result<u32> {
        let scene = self.scene;
        let image = lookup(&scene.images, handle, "image")?;
        let uri = match &image.source {
            ImageSource::Data(data) => self.add_image_data(data),
            ImageSource::Uri(uri) => uri.clone(),
        };
        let output = json::Image {
            buffer_view: None,
            uri: Some(uri),
            mime_type: image.mime_type.clone().map(json::image::MimeType),
            name: image.name.clone(),
            extensions: self.extensions(&image.extensions)?,
            extras: self.extras(&image.extras)?,
        };
        Ok(append_unique(&mut self.document.root.images, output)?.value() as u32)
    }

    fn flatten_material(&mut self, handle: Handle<Material>) -> Result<u32> {
        let scene = self.scene;
        let material = lookup(&scene.materials, handle, "material")?;

        let emissive_texture = self.texture_info_opt(&material.emissive_texture)?;
        let normal_texture = material
            .normal_texture
            .as_ref()
            .map(|info| -> Result<_> {
                Ok(json::material::NormalTexture {
                    index: self.add_index(info.index, RootRef::Texture)?,
                    scale: info.scale.unwrap_or(1.0),
                    tex_coord: info.tex_coord,
                    extensions: self.extensions(&info.extensions)?,
                    extras: self.extras(&info.extras)?,
                })
            })
            .transpose()?;
        let occlusion_texture = material
            .occlusion_texture
            .as_ref()
            .map(|info| -> Result<_> {
                Ok(json::material::OcclusionTexture {
                    index: self.add_index(info.index, RootRef::Texture)?,
                    strength: json::material::StrengthFactor(info.strength.unwrap_or(1.0)),
                    tex_coord: info.tex_coord,
                    extensions: self.extensions(&info.extensions)?,
                    extras: self.extras(&info.extras)?,
                })
            })
            .transpose()?;
        let pbr_metallic_roughness = match &material.pbr_metallic_roughness {
            Some(pbr) => json::material::PbrMetallicRoughness {
                base_color_factor: json::material::PbrBaseColorFactor(
                    pbr.base_color_factor.unwrap_or([1.0; 4]),
                ),
                base_color_texture: self.texture_info_opt(&pbr.base_color_texture)?,
                metallic_factor: json::material::StrengthFactor(pbr.metallic_factor.unwrap_or(1.0)),
                roughness_factor: json::material::StrengthFactor(
                    pbr.roughness_factor.unwrap_or(1.0),
                ),
                metallic_roughness_texture: self
                    .texture_info_opt(&pbr.metallic_roughness_texture)?,
                extensions: self.extensions(&pbr.extensions)?,
                extras: self.extras(&pbr.extras)?,
            },
            None => Default::default(),
        };

        let output = json::Material {
            alpha_cutoff: material.alpha_cutoff.map(json::material::AlphaCutoff),
            alpha_mode: Valid(material.alpha_mode.unwrap_or(AlphaMode::Opaque)),
            double_sided: material.double_sided,
            name: material.name.clone(),
            pbr_metallic_roughness,
            normal_texture,
            occlusion_texture,
            emissive_texture,
            emissive_factor: json::material::EmissiveFactor(
                material.emissive_factor.unwrap_or([0.0; 3]),
            ),
            extensions: self.extensions(&material.extensions)?,
            extras: self.extras(&material.extras)?,
        };
        Ok(append_unique(&mut self.document.root.materials, output)?.value() as u32)
    }

    fn flatten_mesh(&mut self, handle: Handle<Mesh>) -> Result<u32> {
        let scene = self.scene;
        let mesh = lookup(&scene.meshes, handle, "mesh")?;

        let extensions = self.extensions(&mesh.extensions)?;
        let extras = self.extras(&mesh.extras)?;

        let packed = MeshPacker {
            accessors: &scene.accessors,
            settings: &self.settings,
            views: &mut self.views,
            output: &mut self.document.root.accessors,
        }
        .pack(mesh)?;

        let mut primitives = Vec::with_capacity(packed.len());
        for primitive in packed {
            let extensions = self.extensions(&mesh.primitives[primitive.source].extensions)?;
            let material = match primitive.material {
                Some(material) if scene.materials.get(material).is_some() => {
                    Some(self.add_index(material, RootRef::Material)?)
                }
                Some(material) => {
                    warn!(
                        mesh = %mesh.name,
                        material = material.index(),
                        "primitive references a missing material, exporting without one"
                    );
                    None
                }
                None => None,
            };
            primitives.push(json::mesh::Primitive {
                attributes: primitive
                    .attributes
                    .iter()
                    .map(|(&attribute, &index)| (Valid(document::semantic(attribute)), json::Index::new(index)))
                    .collect(),
                indices: Some(json::Index::new(primitive.indices)),
                material,
                mode: Valid(json::mesh::Mode::Triangles),
                targets: None,
                extras: primitive.asobo.to_extras()?,
                extensions,
            });
        }

        let output = json::Mesh {
            primitives,
            weights: (!mesh.weights.is_empty()).then(|| mesh.weights.clone()),
            name: Some(mesh.name.clone()),
            extensions,
            extras,
        };
        Ok(append_unique(&mut self.document.root.meshes, output)?.value() as u32)
    }

    fn flatten_node(&mut self, handle: Handle<Node>) -> Result<u32> {
        let scene = self.scene;
        let node = lookup(&scene.nodes, handle, "node")?;
        let children = self.add_all(&node.children, RootRef::Node)?;
        let output = json::Node {
            camera: self.add_optional(node.camera, RootRef::Camera)?,
            children: (!children.is_empty()).then_some(children),
            extensions: self.extensions(&node.extensions)?,
            extras: self.extras(&node.extras)?,
            matrix: node.matrix,
            mesh: self.add_optional(node.mesh, RootRef::Mesh)?,
            name: node.name.clone(),
            rotation: node.rotation.map(json::scene::UnitQuaternion),
            scale: node.scale,
            translation: node.translation,
            skin: self.add_optional(node.skin, RootRef::Skin)?,
            weights: (!node.weights.is_empty()).then(|| node.weights.clone()),
        };
        Ok(append_unique(&mut self.document.root.nodes, output)?.value() as u32)
    }

    fn flatten_sampler(&mut self, handle: Handle<Sampler>) -> Result<u32> {
        let scene = self.scene;
        let sampler = lookup(&scene.samplers, handle, "sampler")?;
        let output = json::texture::Sampler {
            mag_filter: sampler.mag_filter.map(Valid),
            min_filter: sampler.min_filter.map(Valid),
            name: sampler.name.clone(),
            wrap_s: Valid(sampler.wrap_s),
            wrap_t: Valid(sampler.wrap_t),
            extensions: self.extensions(&sampler.extensions)?,
            extras: self.extras(&sampler.extras)?,
        };
        Ok(append_unique(&mut self.document.root.samplers, output)?.value() as u32)
    }

    fn flatten_scene(&mut self, handle: Handle<Scene>) -> Result<u32> {
        let scene = self.scene;
        let source = lookup(&scene.scenes, handle, "scene")?;
        let output = json::Scene {
            extensions: self.extensions(&source.extensions)?,
            extras: self.extras(&source.extras)?,
            name: source.name.clone(),
            nodes: self.add_all(&source.nodes, RootRef::Node)?,
        };
        Ok(append_unique(&mut self.document.root.scenes, output)?.value() as u32)
    }

    fn flatten_skin(&mut self, handle: Handle<Skin>) -> Result<u32> {
        let scene = self.scene;
        let skin = lookup(&scene.skins, handle, "skin")?;
        let output = json::Skin {
            extensions: self.extensions(&skin.extensions)?,
            extras: self.extras(&skin.extras)?,
            inverse_bind_matrices: self.add_optional(skin.inverse_bind_matrices, RootRef::Accessor)?,
            joints: self.add_all(&skin.joints, RootRef::Node)?,
            name: skin.name.clone(),
            skeleton: self.add_optional(skin.skeleton, RootRef::Node)?,
        };
        Ok(append_unique(&mut self.document.root.skins, output)?.value() as u32)
    }

    fn flatten_texture(&mut self, handle: Handle<Texture>) -> Result<u32> {
        let scene = self.scene;
        let texture = lookup(&scene.textures, handle, "texture")?;
        let output = json::Texture {
            name: texture.name.clone(),
            sampler: self.add_optional(texture.sampler, RootRef::Sampler)?,
            source: self.add_index(texture.source, RootRef::Image)?,
            extensions: self.extensions(&texture.extensions)?,
            extras: self.extras(&texture.extras)?,
        };
        Ok(append_unique(&mut self.document.root.textures, output)?.value() as u32)
    }

    // ========================================================================
    // Inline properties and values
    // ========================================================================

    fn texture_info(&mut self, info: &TextureInfo) -> Result<json::texture::Info> {
        Ok(json::texture::Info {
            index: self.add_index(info.index, RootRef::Texture)?,
            tex_coord: info.tex_coord,
            extensions: self.extensions(&info.extensions)?,
            extras: self.extras(&info.extras)?,
        })
    }

    fn texture_info_opt(&mut self, info: &Option<TextureInfo>) -> Result<Option<json::texture::Info>> {
        info.as_ref().map(|info| self.texture_info(info)).transpose()
    }

    /// Texture reference nested in an extension value; keeps `scale`/`strength` when set
    fn texture_info_value(&mut self, info: &TextureInfo) -> Result<JsonValue> {
        let mut value = serde_json::to_value(self.texture_info(info)?)?;
        if let Some(object) = value.as_object_mut() {
            if let Some(scale) = info.scale {
                object.insert("scale".to_string(), JsonValue::from(scale));
            }
            if let Some(strength) = info.strength {
                object.insert("strength".to_string(), JsonValue::from(strength));
            }
        }
        Ok(value)
    }

    /// Typed `extensions` object of any output type, `None` when empty
    fn extensions<E: DeserializeOwned>(&mut self, extensions: &BTreeMap<String, Value>) -> Result<Option<E>> {
        let entries = extensions
            .iter()
            .map(|(name, value)| Ok((name.clone(), self.flatten_value(value)?)))
            .collect::<Result<Extensions>>()?;
        document::extension_object(entries)
    }

    fn extras(&mut self, extras: &Option<Value>) -> Result<json::Extras> {
        let value = extras.as_ref().map(|value| self.flatten_value(value)).transpose()?;
        document::extras(value)
    }

    fn flatten_value(&mut self, value: &Value) -> Result<JsonValue> {
        Ok(match value {
            Value::Ref(root) => JsonValue::from(self.add_root(*root)?),
            Value::Property(info) => self.texture_info_value(info)?,
            Value::List(items) => JsonValue::Array(
                items
                    .iter()
                    .map(|item| self.flatten_value(item))
                    .collect::<Result<_>>()?,
            ),
            Value::Map(entries) => JsonValue::Object(
                entries
                    .iter()
                    .map(|(key, item)| Ok((key.clone(), self.flatten_value(item)?)))
                    .collect::<Result<_>>()?,
            ),
            Value::Image(data) => JsonValue::String(self.add_image_data(data)),
            Value::Extension(extension) => self.flatten_extension(extension)?,
            Value::Json(json) => json.clone(),
        })
    }

    fn flatten_extension(&mut self, extension: &Extension) -> Result<JsonValue> {
        let value = self.flatten_value(&extension.value)?;
        self.add_extension_used(&extension.name);
        if extension.required {
            self.add_extension_required(&extension.name);
        }

        let Some(path) = &extension.root_path else {
            return Ok(value);
        };
        let keys: Vec<&str> = std::iter::once(extension.name.as_str())
            .chain(path.iter().map(String::as_str))
            .collect();
        let list = root_extension_list(self.document.root_extensions_mut(), &keys).ok_or_else(|| {
            ExportError::ExtensionPathConflict {
                name: extension.name.clone(),
                path: path.clone(),
            }
        })?;
        Ok(JsonValue::from(append_unique(list, value)?.value()))
    }

    /// Store image bytes under a unique name and return their URI
    fn add_image_data(&mut self, image: &ImageData) -> String {
        let name = unique_image_name(&self.images, &image.name);
        let uri = image_uri(&self.settings.texture_uri_prefix, &name, &image.file_extension);
        if name != image.name {
            debug!(image = %image.name, renamed = %name, "image name taken");
        }
        self.images.insert(name, image.clone());
        uri
    }
}

fn lookup<'s, T>(arena: &'s Arena<T>, handle: Handle<T>, kind: &'static str) -> Result<&'s T> {
    arena.get(handle).ok_or(ExportError::InvalidHandle {
        kind,
        index: handle.index(),
    })
}

/// Per-component min/max of flat element data
fn component_bounds(data: &[f32], components: usize) -> (Vec<f32>, Vec<f32>) {
    let mut min = vec![f32::INFINITY; components];
    let mut max = vec![f32::NEG_INFINITY; components];
    for element in data.chunks_exact(components) {
        for (c, &value) in element.iter().enumerate() {
            min[c] = min[c].min(value);
            max[c] = max[c].max(value);
        }
    }
    if data.len() < components {
        return (vec![0.0; components], vec![0.0; components]);
    }
    (min, max)
}

/// Walk `extensions[keys[0]][keys[1]]...`, creating objects on the way and a
/// list at the end. `None` when an existing value has the wrong shape.
fn root_extension_list<'m>(
    map: &'m mut serde_json::Map<String, JsonValue>,
    keys: &[&str],
) -> Option<&'m mut Vec<JsonValue>> {
    let (key, rest) = keys.split_first()?;
    let entry = map.entry(key.to_string()).or_insert_with(|| {
        if rest.is_empty() {
            JsonValue::Array(Vec::new())
        } else {
            JsonValue::Object(serde_json::Map::new())
        }
    });
    if rest.is_empty() {
        entry.as_array_mut()
    } else {
        root_extension_list(entry.as_object_mut()?, rest)
    }
}

/// `name`, then `name-1`, `name-2`, ... replacing any existing `-N` suffix
fn unique_image_name(images: &BTreeMap<String, ImageData>, name: &str) -> String {
    let mut candidate = name.to_string();
    let mut count = 1;
    while images.contains_key(&candidate) {
        candidate = format!("{}-{count}", strip_numeric_suffix(&candidate));
        count += 1;
    }
    candidate
}

fn strip_numeric_suffix(name: &str) -> &str {
    match name.rsplit_once('-') {
        Some((stem, digits)) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
            stem
        }
        _ => name,
    }
}

fn image_uri(prefix: &str, name: &str, extension: &str) -> String {
    percent_encode_path(&format!("{prefix}{name}{extension}").replace('\\', "/"))
}

/// Percent-encode everything except unreserved characters and `/`
fn percent_encode_path(path: &str) -> String {
    let mut encoded = String::with_capacity(path.len());
    for byte in path.bytes() {
        if byte.is_ascii_alphanumeric() || b"_.-~/".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}
