//! Open-ended `extensions` / `extras` values
//!
//! Extension payloads are arbitrary trees that may still point into the scene
//! graph (a texture referenced from a vendor material extension, a light
//! stored in a root-level extension list). Every node of such a tree declares
//! what it is, and the exporter resolves it by matching on the variant.

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::scene::{ImageData, RootRef, TextureInfo};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Reference to a root object, replaced by its index
    Ref(RootRef),
    /// Inline texture reference, flattened in place
    Property(Box<TextureInfo>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Image bytes, replaced by a URI
    Image(ImageData),
    Extension(Box<Extension>),
    /// Plain JSON, copied unchanged
    Json(JsonValue),
}

/// Named extension object
#[derive(Debug, Clone, PartialEq)]
pub struct Extension {
    pub name: String,
    pub value: Value,
    /// Also list the extension in `extensionsRequired`
    pub required: bool,
    /// When set, the value is stored under `extensions[name][path...]` at the
    /// document root and replaced by its index in that list
    pub root_path: Option<Vec<String>>,
}

impl Extension {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            required: false,
            root_path: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn child_of_root<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.root_path = Some(path.into_iter().map(Into::into).collect());
        self
    }
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        Value::Json(value)
    }
}

impl From<RootRef> for Value {
    fn from(value: RootRef) -> Self {
        Value::Ref(value)
    }
}

impl From<TextureInfo> for Value {
    fn from(value: TextureInfo) -> Self {
        Value::Property(Box::new(value))
    }
}

impl From<Extension> for Value {
    fn from(value: Extension) -> Self {
        Value::Extension(Box::new(value))
    }
}

impl<const N: usize> From<[(&str, Value); N]> for Value {
    fn from(entries: [(&str, Value); N]) -> Self {
        Value::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
        )
    }
}
