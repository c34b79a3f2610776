//! Export settings
//!
//! Settings can be built in code or loaded from TOML:
//!
//! ```toml
//! generator = "My Exporter"
//! copyright = "ACME Aviation"
//! texture_uri_prefix = "texture/"
//! all_vertex_influences = false
//! ```

use serde::Deserialize;

use crate::error::{ExportError, Result};

/// Largest 16-bit index value a primitive may address
///
/// Stays clear of the 65535 primitive-restart value and is a multiple of 3.
pub const DEFAULT_SPLIT_THRESHOLD: u32 = 65530;

/// Highest accepted split threshold (one below the restart value)
pub const MAX_SPLIT_THRESHOLD: u32 = 65534;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportSettings {
    /// `asset.generator`
    pub generator: String,

    /// `asset.copyright`, omitted when unset
    pub copyright: Option<String>,

    /// Prepended to image file names to build image URIs.
    /// Default: "" (images next to the document)
    pub texture_uri_prefix: String,

    /// Keep every joint influence instead of the four strongest.
    /// The vendor layouts still only hold one influence set, so extra sets
    /// are dropped either way; this only disables renormalization.
    /// Default: false
    pub all_vertex_influences: bool,

    /// Largest index value any emitted primitive may contain.
    /// Default: 65530
    pub split_threshold: u32,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            generator: default_generator(),
            copyright: None,
            texture_uri_prefix: String::new(),
            all_vertex_influences: false,
            split_threshold: DEFAULT_SPLIT_THRESHOLD,
        }
    }
}

fn default_generator() -> String {
    format!("msfs-gltf v{}", env!("CARGO_PKG_VERSION"))
}

impl ExportSettings {
    /// Parse settings from TOML, filling omitted keys with defaults
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let settings: Self = toml::from_str(source)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !(3..=MAX_SPLIT_THRESHOLD).contains(&self.split_threshold) {
            return Err(ExportError::InvalidSplitThreshold(self.split_threshold));
        }
        Ok(())
    }
}
