//! # Legacy JSON Reader
//!
//! Read-only support for the obsolete v1 archive, a JSON document:
//!
//! ```json
//! {
//!   "version": 1,
//!   "modules": {
//!     "file:///a.ts": { "Redirect": "file:///b.ts" },
//!     "file:///b.ts": { "Source": { "source": "…", "transpiled": "…",
//!                                   "content_type": "…", "deps": [] } }
//!   }
//! }
//! ```
//!
//! The transpiled text is preferred over the raw source when present.
//! Taking a source removes the entry from the map entirely, an
//! observable difference from the binary format, where a taken entry
//! stays listed with an emptied slot. Source maps do not exist in v1.

use std::collections::HashMap;

use espack_core::{ParseError, ParseResult};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct V1Document {
    #[allow(dead_code)]
    version: u64,
    modules: HashMap<String, V1Entry>,
}

#[derive(Debug, Deserialize)]
enum V1Entry {
    Redirect(String),
    Source(V1Source),
}

#[derive(Debug, Deserialize)]
struct V1Source {
    source: String,
    transpiled: Option<String>,
    content_type: Option<String>,
    #[serde(default)]
    deps: Vec<String>,
}

/// A module held by a legacy archive.
#[derive(Debug, Clone)]
pub struct LegacyModule {
    source: String,
    content_type: Option<String>,
    deps: Vec<String>,
}

impl LegacyModule {
    /// The module text (transpiled when the document carried it).
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The content type the document recorded, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// The dependency specifiers the document recorded.
    pub fn deps(&self) -> &[String] {
        &self.deps
    }
}

#[derive(Debug)]
enum LegacyEntry {
    Module(LegacyModule),
    Redirect(String),
}

/// A parsed legacy (v1) archive.
#[derive(Debug)]
pub struct LegacyArchive {
    modules: HashMap<String, LegacyEntry>,
}

impl LegacyArchive {
    /// Parse a v1 JSON document.
    pub fn parse(bytes: &[u8]) -> ParseResult<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        if let Some(version) = value.get("version").and_then(serde_json::Value::as_u64) {
            if version != 1 {
                return Err(ParseError::InvalidV1Version(version));
            }
        }
        let document: V1Document = serde_json::from_value(value)?;

        let modules = document
            .modules
            .into_iter()
            .map(|(specifier, entry)| {
                let entry = match entry {
                    V1Entry::Redirect(target) => LegacyEntry::Redirect(target),
                    V1Entry::Source(source) => LegacyEntry::Module(LegacyModule {
                        source: source.transpiled.unwrap_or(source.source),
                        content_type: source.content_type,
                        deps: source.deps,
                    }),
                };
                (specifier, entry)
            })
            .collect();
        Ok(Self { modules })
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the archive holds no entries.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    fn resolve<'a>(&'a self, specifier: &'a str) -> Option<&'a str> {
        let mut visited = std::collections::HashSet::new();
        let mut current = specifier;
        loop {
            if !visited.insert(current) {
                return None;
            }
            match self.modules.get(current)? {
                LegacyEntry::Redirect(target) => current = target,
                LegacyEntry::Module(_) => return Some(current),
            }
        }
    }

    /// Resolve a specifier to its module, chasing redirects; `None` for
    /// unknown specifiers and cycles.
    pub fn lookup(&self, specifier: &str) -> Option<&LegacyModule> {
        let resolved = self.resolve(specifier)?;
        match self.modules.get(resolved) {
            Some(LegacyEntry::Module(module)) => Some(module),
            _ => None,
        }
    }

    /// Take a module's source out, removing the entry from the map: a
    /// later lookup of any specifier reaching it returns `None`.
    pub fn take_source(&mut self, specifier: &str) -> Option<String> {
        let resolved = self.resolve(specifier)?.to_string();
        match self.modules.remove(&resolved) {
            Some(LegacyEntry::Module(module)) => Some(module.source),
            _ => None,
        }
    }
}
