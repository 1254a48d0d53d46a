//! # Module Entries and Handles
//!
//! The in-memory counterparts of the header's entry variants. The map
//! stores [`ModuleEntry`]; lookups hand out [`Module`] handles that share
//! the underlying source slots, so a handle stays usable while the
//! archive keeps streaming.

use std::sync::Arc;

use espack_core::{ParseError, SourceSlot};

/// The kind of a stored module, a single byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ModuleKind {
    /// JavaScript (or transpiled TypeScript) source.
    JavaScript = 0,
    /// JSON source.
    Json = 1,
    /// JSON with comments. Reserved for import maps; hidden from ordinary
    /// lookup.
    Jsonc = 2,
    /// Opaque bytes embedded without interpretation.
    OpaqueData = 3,
    /// A WebAssembly module.
    Wasm = 4,
}

impl ModuleKind {
    /// Decode the wire byte.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ModuleKind::JavaScript),
            1 => Some(ModuleKind::Json),
            2 => Some(ModuleKind::Jsonc),
            3 => Some(ModuleKind::OpaqueData),
            4 => Some(ModuleKind::Wasm),
            _ => None,
        }
    }

    /// Classify a module from the content type the graph builder
    /// reported.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let essence = content_type
            .unwrap_or("")
            .split(';')
            .next()
            .unwrap_or("")
            .trim();
        match essence {
            "application/json" => ModuleKind::Json,
            "application/wasm" => ModuleKind::Wasm,
            _ => ModuleKind::JavaScript,
        }
    }
}

/// One entry of the module map, tagged the same way as the wire kind
/// byte.
#[derive(Debug, Clone)]
pub(crate) enum ModuleEntry {
    /// A stored module with its body slots.
    Data {
        kind: ModuleKind,
        source: Arc<SourceSlot>,
        source_map: Arc<SourceSlot>,
    },
    /// An alias for another specifier.
    Redirect { target: String },
    /// A root package request, pointing into the snapshot table.
    PackageIndex(u32),
}

/// A handle to one stored module.
///
/// Shares the archive's slots: the body accessors await readiness, so a
/// handle obtained from a still-streaming archive blocks only on its own
/// module's bytes.
#[derive(Debug, Clone)]
pub struct Module {
    pub(crate) specifier: String,
    pub(crate) kind: ModuleKind,
    pub(crate) source: Arc<SourceSlot>,
    pub(crate) source_map: Arc<SourceSlot>,
}

impl Module {
    /// The specifier this module is stored under (after redirects).
    pub fn specifier(&self) -> &str {
        &self.specifier
    }

    /// The module kind.
    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    /// A shared view of the source bytes. Resolves once the body has
    /// streamed in; `None` after the source was taken.
    pub async fn source(&self) -> Result<Option<Arc<[u8]>>, ParseError> {
        self.source.bytes().await
    }

    /// Take the source bytes out. Exactly one take succeeds; later calls
    /// return `None`. The entry itself stays in the archive.
    pub async fn take_source(&self) -> Result<Option<Arc<[u8]>>, ParseError> {
        self.source.take().await
    }

    /// A shared view of the source-map bytes. Empty bytes mean the module
    /// has no source map.
    pub async fn source_map(&self) -> Result<Option<Arc<[u8]>>, ParseError> {
        self.source_map.bytes().await
    }

    /// Take the source-map bytes out.
    pub async fn take_source_map(&self) -> Result<Option<Arc<[u8]>>, ParseError> {
        self.source_map.take().await
    }
}
