//! Flattened glTF document
//!
//! The output side of the exporter is a [`gltf_json::Root`]: every
//! cross-reference is a `json::Index` into one of the root arrays. Vendor
//! draw-range metadata travels in primitive `extras`, vendor extensions in the
//! `others` map of each object's extension struct. `json::Asset` has no slot
//! for extensions, so asset-level ones are kept beside the root and merged in
//! when serializing.

use gltf_json as json;
use json::accessor::{ComponentType, GenericComponentType, Type};
use json::mesh::Semantic;
use json::validation::{Checked::Valid, USize64};
use msfs_common::{Attribute, VertexType};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::error::Result;

/// Extension entries of one glTF object, keyed by extension name
pub type Extensions = serde_json::Map<String, JsonValue>;

/// `ASOBO_primitive.VertexVersion` written on every primitive
pub const VERTEX_VERSION: u32 = 2;

/// Flattened root plus the asset extensions `json::Asset` cannot hold
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub root: json::Root,
    pub asset_extensions: Extensions,
}

impl Document {
    pub fn new(generator: Option<String>, copyright: Option<String>) -> Self {
        let mut root = json::Root::default();
        root.asset.generator = generator;
        root.asset.copyright = copyright;
        Self {
            root,
            asset_extensions: Extensions::new(),
        }
    }

    /// `extensions` object at the document root
    pub fn root_extensions_mut(&mut self) -> &mut Extensions {
        &mut self.root.extensions.get_or_insert_with(Default::default).others
    }

    pub fn to_json_value(&self) -> Result<JsonValue> {
        let mut value = json::serialize::to_value(&self.root)?;
        if !self.asset_extensions.is_empty()
            && let Some(asset) = value.get_mut("asset").and_then(JsonValue::as_object_mut)
        {
            asset.insert(
                "extensions".to_string(),
                JsonValue::Object(self.asset_extensions.clone()),
            );
        }
        Ok(value)
    }

    /// Serialize to compact JSON
    pub fn to_json_string(&self) -> Result<String> {
        if self.asset_extensions.is_empty() {
            return Ok(json::serialize::to_string(&self.root)?);
        }
        Ok(json::serialize::to_string(&self.to_json_value()?)?)
    }
}

/// Append `item` unless a structurally equal element already exists
///
/// `gltf-json` objects carry no `PartialEq`, so equality is decided on their
/// serialized form.
pub fn append_unique<T: Serialize>(list: &mut Vec<T>, item: T) -> Result<json::Index<T>> {
    let key = serde_json::to_value(&item)?;
    for (i, existing) in list.iter().enumerate() {
        if serde_json::to_value(existing)? == key {
            return Ok(json::Index::new(i as u32));
        }
    }
    Ok(json::Index::push(list, item))
}

/// Raw `extras` payload
pub fn extras(value: Option<JsonValue>) -> Result<json::Extras> {
    Ok(value
        .map(|value| serde_json::value::to_raw_value(&value))
        .transpose()?)
}

/// Extension struct of any glTF object, `None` when there are no entries
///
/// The `others` map of every `gltf_json::extensions` struct is flattened, so
/// deserializing the entries fills it.
pub fn extension_object<E: DeserializeOwned>(entries: Extensions) -> Result<Option<E>> {
    if entries.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(JsonValue::Object(entries))?))
}

/// glTF semantic of a layout attribute
pub fn semantic(attribute: Attribute) -> Semantic {
    match attribute {
        Attribute::Position => Semantic::Positions,
        Attribute::Tangent => Semantic::Tangents,
        Attribute::Normal => Semantic::Normals,
        Attribute::TexCoord0 => Semantic::TexCoords(0),
        Attribute::TexCoord1 => Semantic::TexCoords(1),
        Attribute::Joints0 => Semantic::Joints(0),
        Attribute::Weights0 => Semantic::Weights(0),
        Attribute::Color0 => Semantic::Colors(0),
    }
}

/// Accessor into a buffer view slot
///
/// `view` is the slot ordinal until the export is finalized; a zero offset is omitted.
pub fn new_accessor(
    view: u32,
    byte_offset: usize,
    component_type: ComponentType,
    type_: Type,
    count: usize,
    name: Option<String>,
) -> json::Accessor {
    json::Accessor {
        buffer_view: Some(json::Index::new(view)),
        byte_offset: (byte_offset != 0).then(|| USize64::from(byte_offset)),
        count: USize64::from(count),
        component_type: Valid(GenericComponentType(component_type)),
        extensions: None,
        extras: Default::default(),
        type_: Valid(type_),
        min: None,
        max: None,
        name,
        normalized: false,
        sparse: None,
    }
}

/// Set per-component `min`/`max`
pub fn set_bounds(accessor: &mut json::Accessor, min: &[f32], max: &[f32]) {
    accessor.min = Some(JsonValue::from(min.to_vec()));
    accessor.max = Some(JsonValue::from(max.to_vec()));
}

/// Component type of an accessor, when valid
pub fn component_type(accessor: &json::Accessor) -> Option<ComponentType> {
    match accessor.component_type {
        Valid(GenericComponentType(component_type)) => Some(component_type),
        _ => None,
    }
}

/// Element type of an accessor, when valid
pub fn accessor_type(accessor: &json::Accessor) -> Option<Type> {
    match accessor.type_ {
        Valid(type_) => Some(type_),
        _ => None,
    }
}

/// Draw-range metadata consumed by the simulator
///
/// `BaseVertexIndex` and `StartIndex` are written as `null` when unset.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AsoboPrimitive {
    pub base_vertex_index: Option<u32>,
    pub primitive_count: u32,
    pub start_index: Option<u32>,
    pub vertex_type: VertexType,
    pub vertex_version: u32,
}

#[derive(Serialize)]
struct PrimitiveExtras<'a> {
    #[serde(rename = "ASOBO_primitive")]
    asobo_primitive: &'a AsoboPrimitive,
}

impl AsoboPrimitive {
    /// Primitive `extras` holding this record under `ASOBO_primitive`
    pub fn to_extras(&self) -> Result<json::Extras> {
        let extras = PrimitiveExtras {
            asobo_primitive: self,
        };
        Ok(Some(serde_json::value::to_raw_value(&extras)?))
    }
}
