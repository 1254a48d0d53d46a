//! # Archive Facade
//!
//! [`Archive`] is the public surface of the format: build a module graph
//! with the `add_*` operations and serialize it, or parse a byte stream
//! and look modules up while their bodies are still arriving.
//!
//! Parsing is two-phase. `Archive::parse` consumes the magic, options
//! header, modules header, and package section, then returns the usable
//! archive together with a completion future that drains the bulk
//! regions into the module slots. Callers typically spawn the future and
//! start resolving modules immediately; awaiting a module body blocks
//! only on that body.
//!
//! Serialization always emits the latest format version, writing entries
//! in map order, appending each non-empty body (and its digest) to the
//! bulk regions as its header entry is produced.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use espack_core::{Checksum, OrderedMap, ParseError, ParseResult, SourceSlot};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::frame::Section;
use crate::header::{self, ParsedHeader};
use crate::loader;
use crate::module::{Module, ModuleEntry, ModuleKind};
use crate::npm::{self, NpmSnapshot};
use crate::version::{self, Options, Version};

/// An in-memory module-graph archive.
#[derive(Debug)]
pub struct Archive {
    version: Version,
    options: Options,
    modules: OrderedMap<ModuleEntry>,
    npm_snapshot: Option<NpmSnapshot>,
}

impl Default for Archive {
    fn default() -> Self {
        Self::new()
    }
}

impl Archive {
    /// An empty archive targeting the latest format version.
    ///
    /// New archives default to SHA-256 checksums; use
    /// [`Archive::set_checksum`] to pick another algorithm.
    pub fn new() -> Self {
        Self {
            version: Version::LATEST,
            options: Options {
                checksum: Some(Checksum::Sha256),
                checksum_size: None,
            },
            modules: OrderedMap::new(),
            npm_snapshot: None,
        }
    }

    /// The format version this archive was parsed from (or will be
    /// written as, for built archives).
    pub fn version(&self) -> Version {
        self.version
    }

    /// The negotiated checksum algorithm, if known to this build.
    pub fn checksum(&self) -> Option<Checksum> {
        self.options.checksum
    }

    /// Select the checksum algorithm for a subsequent serialization.
    /// Only effective before [`Archive::into_bytes`].
    pub fn set_checksum(&mut self, checksum: Checksum) {
        self.options = Options {
            checksum: Some(checksum),
            checksum_size: None,
        };
    }

    /// Every stored specifier, in archive order.
    pub fn specifiers(&self) -> Vec<&str> {
        self.modules.keys().collect()
    }

    /// Resolve a specifier to its module, chasing redirects.
    ///
    /// Returns `None` for unknown specifiers, redirect cycles, package
    /// request entries, and import-map (JSONC) modules; the latter are
    /// reachable through [`Archive::lookup_import_map`].
    pub fn lookup(&self, specifier: &str) -> Option<Module> {
        self.resolve(specifier, false)
    }

    /// As [`Archive::lookup`], but JSONC import-map modules resolve too.
    pub fn lookup_import_map(&self, specifier: &str) -> Option<Module> {
        self.resolve(specifier, true)
    }

    fn resolve(&self, specifier: &str, allow_jsonc: bool) -> Option<Module> {
        let mut visited = HashSet::new();
        let mut current = specifier;
        loop {
            if !visited.insert(current) {
                // Redirect cycle: a shape query, not an error.
                return None;
            }
            match self.modules.get(current)? {
                ModuleEntry::Redirect { target } => current = target,
                ModuleEntry::PackageIndex(_) => return None,
                ModuleEntry::Data {
                    kind,
                    source,
                    source_map,
                } => {
                    if *kind == ModuleKind::Jsonc && !allow_jsonc {
                        return None;
                    }
                    return Some(Module {
                        specifier: current.to_string(),
                        kind: *kind,
                        source: Arc::clone(source),
                        source_map: Arc::clone(source_map),
                    });
                }
            }
        }
    }

    /// Append a module with its source and source map. Empty bytes stand
    /// for an absent source map.
    pub fn add_module(
        &mut self,
        specifier: impl Into<String>,
        kind: ModuleKind,
        source: impl Into<Arc<[u8]>>,
        source_map: impl Into<Arc<[u8]>>,
    ) {
        self.modules.insert(
            specifier.into(),
            ModuleEntry::Data {
                kind,
                source: Arc::new(SourceSlot::ready(source)),
                source_map: Arc::new(SourceSlot::ready(source_map)),
            },
        );
    }

    /// Append opaque bytes under a specifier.
    pub fn add_opaque_data(&mut self, specifier: impl Into<String>, data: impl Into<Arc<[u8]>>) {
        self.add_module(specifier, ModuleKind::OpaqueData, data, Vec::new());
    }

    /// Append a redirect from one specifier to another.
    pub fn add_redirect(&mut self, specifier: impl Into<String>, target: impl Into<String>) {
        self.modules.insert(
            specifier.into(),
            ModuleEntry::Redirect {
                target: target.into(),
            },
        );
    }

    /// Insert an import-map module at the front of the archive, so it
    /// precedes the graph it describes.
    pub fn add_import_map(
        &mut self,
        kind: ModuleKind,
        specifier: impl Into<String>,
        source: impl Into<Arc<[u8]>>,
    ) {
        self.modules.insert_front(
            specifier.into(),
            ModuleEntry::Data {
                kind,
                source: Arc::new(SourceSlot::ready(source)),
                source_map: Arc::new(SourceSlot::ready(Vec::new())),
            },
        );
    }

    /// Embed a resolved package snapshot.
    ///
    /// Replaces any previous snapshot and its root request entries. Root
    /// requests are appended in sorted request order; the package table
    /// serializes in sorted id order, so equal logical snapshots yield
    /// byte-identical sections.
    pub fn set_npm_snapshot(&mut self, snapshot: NpmSnapshot) -> ParseResult<()> {
        let encoded = npm::encode(&snapshot)?;

        let stale: Vec<String> = self
            .modules
            .iter()
            .filter(|(_, entry)| matches!(entry, ModuleEntry::PackageIndex(_)))
            .map(|(specifier, _)| specifier.to_string())
            .collect();
        for specifier in stale {
            self.modules.remove(&specifier);
        }

        for (request, id) in &snapshot.root_packages {
            let index = encoded
                .index_of
                .get(&id.as_serialized())
                .copied()
                .ok_or_else(|| ParseError::InvalidV2NpmPackage(id.as_serialized()))?;
            self.modules
                .insert(request.clone(), ModuleEntry::PackageIndex(index));
        }

        self.npm_snapshot = Some(snapshot);
        Ok(())
    }

    /// Transfer the package snapshot to the caller. Subsequent calls
    /// return `None`.
    pub fn take_npm_snapshot(&mut self) -> Option<NpmSnapshot> {
        self.npm_snapshot.take()
    }

    /// Parse an archive from a byte stream.
    ///
    /// Returns the archive, usable immediately, and a completion future
    /// that streams the source and source-map regions into the module
    /// slots. Drive the future (typically on its own task) to make
    /// bodies available; dropping it fails every unfilled slot so
    /// waiters unblock.
    pub async fn parse<R>(
        mut reader: R,
    ) -> ParseResult<(Self, impl Future<Output = ParseResult<()>>)>
    where
        R: AsyncRead + Unpin,
    {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic).await?;
        let version = Version::from_magic(&magic).ok_or(ParseError::InvalidV2)?;

        let mut options = Options::default_for(version);
        if version.supports_options() {
            options = version::read_options_frame(&mut reader, options).await?;
        }
        debug!(?version, ?options, "parsing archive");

        let header_section = Section::read(&mut reader, options).await?;
        if !header_section.is_valid(options) {
            return Err(ParseError::InvalidV2HeaderHash);
        }
        let ParsedHeader {
            entries,
            sources,
            source_maps,
            npm_roots,
        } = header::decode(header_section.content(), version)?;
        debug!(modules = entries.len(), "archive header parsed");

        let mut npm_snapshot = None;
        if version.supports_packages() {
            let package_section = Section::read(&mut reader, options).await?;
            if !package_section.is_valid(options) {
                return Err(ParseError::InvalidV2NpmSnapshotHash);
            }
            if !package_section.content().is_empty() {
                npm_snapshot = Some(npm::decode(package_section.content(), &npm_roots)?);
            } else if let Some((_, index)) = npm_roots.first() {
                // Root requests with no table to point into.
                return Err(ParseError::InvalidV2NpmPackageOffset(*index as usize));
            }
        }

        let archive = Archive {
            version,
            options,
            modules: entries,
            npm_snapshot,
        };
        let load = loader::load_regions(reader, sources, source_maps, options);
        Ok((archive, load))
    }

    /// Serialize the archive under the latest format version.
    ///
    /// # Panics
    ///
    /// Panics if any module body is still pending or was taken: a parsed
    /// archive must have its completion future driven to the end, and
    /// its sources not consumed, before it can be re-serialized.
    pub fn into_bytes(self) -> Vec<u8> {
        let checksum = self.options.checksum.unwrap_or(Checksum::None);
        let encoded_snapshot = self.npm_snapshot.as_ref().map(|snapshot| {
            npm::encode(snapshot)
                .unwrap_or_else(|err| panic!("package snapshot no longer encodable: {err}"))
        });

        let mut header_bytes = Vec::new();
        let mut sources = Region::default();
        let mut source_maps = Region::default();

        for (specifier, entry) in self.modules.iter() {
            match entry {
                ModuleEntry::Data {
                    kind,
                    source,
                    source_map,
                } => {
                    let body = ready_body(source, specifier, "module body");
                    let map = ready_body(source_map, specifier, "source map");
                    let (src_off, src_len) = sources.append(&body, checksum);
                    let (map_off, map_len) = source_maps.append(&map, checksum);
                    header::write_module_entry(
                        &mut header_bytes,
                        specifier,
                        *kind,
                        src_off,
                        src_len,
                        map_off,
                        map_len,
                    );
                }
                ModuleEntry::Redirect { target } => {
                    header::write_redirect_entry(&mut header_bytes, specifier, target);
                }
                ModuleEntry::PackageIndex(_) => {
                    // Indices are recomputed against the sorted table; a
                    // taken snapshot leaves nothing to point into, so the
                    // entry is dropped.
                    let index = self.npm_snapshot.as_ref().and_then(|snapshot| {
                        let id = snapshot.root_packages.get(specifier)?;
                        encoded_snapshot
                            .as_ref()?
                            .index_of
                            .get(&id.as_serialized())
                            .copied()
                    });
                    if let Some(index) = index {
                        header::write_package_index_entry(&mut header_bytes, specifier, index);
                    }
                }
            }
        }

        let mut out = Vec::new();
        out.extend_from_slice(Version::LATEST.magic());
        Section::write(&mut out, &self.options.to_option_bytes(), checksum);
        Section::write(&mut out, &header_bytes, checksum);
        let package_content = encoded_snapshot
            .map(|encoded| encoded.content)
            .unwrap_or_default();
        Section::write(&mut out, &package_content, checksum);
        sources.finish(&mut out);
        source_maps.finish(&mut out);
        out
    }
}

/// One bulk region under construction. Offsets and the total count
/// content bytes only; digests ride along without affecting either.
#[derive(Default)]
struct Region {
    bytes: Vec<u8>,
    content_len: u32,
}

impl Region {
    fn append(&mut self, body: &[u8], checksum: Checksum) -> (u32, u32) {
        if body.is_empty() {
            return (0, 0);
        }
        let offset = self.content_len;
        self.bytes.extend_from_slice(body);
        self.bytes.extend(checksum.hash(body));
        self.content_len += body.len() as u32;
        (offset, body.len() as u32)
    }

    fn finish(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.content_len.to_be_bytes());
        out.extend(self.bytes);
    }
}

fn ready_body(slot: &SourceSlot, specifier: &str, what: &str) -> Arc<[u8]> {
    match slot.ready_bytes() {
        Some(bytes) => bytes,
        None => panic!(
            "{what} for {specifier} is not loaded; drive the parse future to completion before serializing"
        ),
    }
}
