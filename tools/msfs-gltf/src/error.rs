//! Export errors
//!
//! Every variant here is fatal for the export it occurs in. Recoverable
//! conditions (unknown attributes, dangling material handles, excess skin
//! influences) are logged with `tracing::warn!` where they are detected and
//! never surface as errors.

/// Failure to partition a primitive's triangles under the index threshold
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SplitError {
    /// Index array length is not a multiple of three
    #[error("index count {0} is not a multiple of 3")]
    PartialTriangle(usize),

    /// A single triangle spans more vertices than the threshold allows
    #[error("triangle [{a}, {b}, {c}] spans more than {threshold} vertices")]
    UnsplittableTriangle {
        a: u32,
        b: u32,
        c: u32,
        threshold: u32,
    },
}

/// Error produced while flattening or packing a scene
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// A primitive has no POSITION attribute
    #[error("mesh '{mesh}' primitive {primitive}: missing POSITION attribute")]
    MissingPosition { mesh: String, primitive: usize },

    /// Attribute streams of one primitive disagree on vertex count
    #[error(
        "mesh '{mesh}' primitive {primitive}: attribute {attribute} has {found} elements, expected {expected}"
    )]
    AttributeCountMismatch {
        mesh: String,
        primitive: usize,
        attribute: String,
        expected: usize,
        found: usize,
    },

    /// An attribute present on the first primitive of a merged mesh is missing from another
    #[error("mesh '{mesh}' primitive {primitive}: attribute {attribute} required for merging is missing")]
    MissingMergedAttribute {
        mesh: String,
        primitive: usize,
        attribute: String,
    },

    /// `max(indices) + 1` disagrees with the POSITION count
    #[error(
        "mesh '{mesh}' primitive {primitive}: indices address {addressed} vertices but POSITION has {positions}"
    )]
    IndexCountMismatch {
        mesh: String,
        primitive: usize,
        addressed: usize,
        positions: usize,
    },

    /// Index splitting failed
    #[error("mesh '{mesh}' primitive {primitive}: {source}")]
    Split {
        mesh: String,
        primitive: usize,
        #[source]
        source: SplitError,
    },

    /// A handle does not resolve in its arena
    #[error("invalid {kind} handle {index}")]
    InvalidHandle { kind: &'static str, index: u32 },

    /// Accessor data does not have the shape its use requires
    #[error("accessor {accessor}: {reason}")]
    UnexpectedAccessorData { accessor: String, reason: String },

    /// An index value does not fit the 16-bit index component type
    #[error("accessor {accessor}: index {index} exceeds the 16-bit index range")]
    IndexOutOfRange { accessor: String, index: u32 },

    /// Raw binary accessor data with no matching fixed buffer view
    #[error("accessor {accessor}: no fixed buffer view holds {component_type:?} {type_:?} data")]
    UnsupportedBinaryLayout {
        accessor: String,
        component_type: gltf_json::accessor::ComponentType,
        type_: gltf_json::accessor::Type,
    },

    /// An accessor points at a buffer view that received no data
    #[error("accessor {accessor} references empty buffer view {view}")]
    EmptyBufferView { accessor: u32, view: &'static str },

    /// The object graph loops back on an object still being flattened
    #[error("reference cycle through {0}")]
    ReferenceCycle(String),

    /// A root-scoped extension path collides with a non-object value
    #[error("extension '{name}' path {path:?} collides with an existing value")]
    ExtensionPathConflict { name: String, path: Vec<String> },

    /// Settings failed to parse
    #[error("invalid export settings: {0}")]
    Settings(#[from] toml::de::Error),

    /// Split threshold outside the 16-bit safe range
    #[error("split threshold {0} must be between 3 and 65534")]
    InvalidSplitThreshold(u32),

    /// Document serialization failed
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ExportError>;
