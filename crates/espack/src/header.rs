//! # Modules Header Codec
//!
//! The modules header frame lists every entry of the archive in its
//! observable order. Each entry is:
//!
//! ```text
//! u32 specifier_len | specifier | u8 kind | payload
//! ```
//!
//! | Kind | Entry        | Payload                                              |
//! |------|--------------|------------------------------------------------------|
//! | 0    | Module       | u32 src_off, u32 src_len, u32 map_off, u32 map_len, u8 module_kind |
//! | 1    | Redirect     | u32 target_len, target                               |
//! | 2    | PackageIndex | u32 index (versions with package support only)       |
//!
//! A module body whose offset and length are both zero never touches the
//! bulk region; its slot is constructed ready and empty. Every
//! structural error carries the byte offset (within the header content)
//! where detection happened.

use std::collections::BTreeMap;
use std::sync::Arc;

use espack_core::{OrderedMap, ParseError, ParseResult, SourceSlot};

use crate::module::{ModuleEntry, ModuleKind};
use crate::version::Version;

pub(crate) const ENTRY_KIND_MODULE: u8 = 0;
pub(crate) const ENTRY_KIND_REDIRECT: u8 = 1;
pub(crate) const ENTRY_KIND_PACKAGE_INDEX: u8 = 2;

/// One pending body the loader must fill: its length, the owning
/// specifier (for diagnostics), and the slot itself.
#[derive(Debug, Clone)]
pub(crate) struct RegionEntry {
    pub length: u32,
    pub specifier: String,
    pub slot: Arc<SourceSlot>,
}

/// Everything the modules header describes: the ordered entries, the
/// offset indexes for both bulk regions, and the root package requests
/// in header order.
#[derive(Debug, Default)]
pub(crate) struct ParsedHeader {
    pub entries: OrderedMap<ModuleEntry>,
    pub sources: BTreeMap<u32, RegionEntry>,
    pub source_maps: BTreeMap<u32, RegionEntry>,
    pub npm_roots: Vec<(String, u32)>,
}

struct HeaderReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> HeaderReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn bytes(&mut self, len: usize, field: &str) -> ParseResult<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.buf.len());
        match end {
            Some(end) => {
                let slice = &self.buf[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(ParseError::InvalidV2Header(format!(
                "unexpected end reading {field} at offset {}",
                self.pos
            ))),
        }
    }

    fn u8(&mut self, field: &str) -> ParseResult<u8> {
        Ok(self.bytes(1, field)?[0])
    }

    fn u32(&mut self, field: &str) -> ParseResult<u32> {
        let bytes = self.bytes(4, field)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn string(&mut self, field: &str) -> ParseResult<String> {
        let len = self.u32(field)? as usize;
        let offset = self.pos;
        let bytes = self.bytes(len, field)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ParseError::InvalidV2Specifier(offset))
    }
}

fn body_slot(
    offset: u32,
    length: u32,
    specifier: &str,
    index: &mut BTreeMap<u32, RegionEntry>,
) -> ParseResult<Arc<SourceSlot>> {
    if offset == 0 && length == 0 {
        return Ok(Arc::new(SourceSlot::ready(Vec::new())));
    }
    let slot = Arc::new(SourceSlot::pending(offset, length));
    let previous = index.insert(
        offset,
        RegionEntry {
            length,
            specifier: specifier.to_string(),
            slot: Arc::clone(&slot),
        },
    );
    if previous.is_some() {
        return Err(ParseError::InvalidV2SourceOffset(offset as usize));
    }
    Ok(slot)
}

/// Decode the verified content of the modules frame.
pub(crate) fn decode(content: &[u8], version: Version) -> ParseResult<ParsedHeader> {
    let mut reader = HeaderReader::new(content);
    let mut header = ParsedHeader::default();

    while !reader.at_end() {
        let specifier = reader.string("specifier")?;
        let kind_offset = reader.pos;
        let kind = reader.u8("entry kind")?;
        match kind {
            ENTRY_KIND_MODULE => {
                let src_off = reader.u32("source offset")?;
                let src_len = reader.u32("source length")?;
                let map_off = reader.u32("source map offset")?;
                let map_len = reader.u32("source map length")?;
                let module_kind_offset = reader.pos;
                let module_kind_byte = reader.u8("module kind")?;
                let module_kind = ModuleKind::from_u8(module_kind_byte).ok_or(
                    ParseError::InvalidV2ModuleKind(module_kind_byte, module_kind_offset),
                )?;
                let source = body_slot(src_off, src_len, &specifier, &mut header.sources)?;
                let source_map = body_slot(map_off, map_len, &specifier, &mut header.source_maps)?;
                header.entries.insert(
                    specifier,
                    ModuleEntry::Data {
                        kind: module_kind,
                        source,
                        source_map,
                    },
                );
            }
            ENTRY_KIND_REDIRECT => {
                let target = reader.string("redirect target")?;
                header
                    .entries
                    .insert(specifier, ModuleEntry::Redirect { target });
            }
            ENTRY_KIND_PACKAGE_INDEX if version.supports_packages() => {
                let index = reader.u32("package index")?;
                header.npm_roots.push((specifier.clone(), index));
                header
                    .entries
                    .insert(specifier, ModuleEntry::PackageIndex(index));
            }
            _ => return Err(ParseError::InvalidV2EntryKind(kind, kind_offset)),
        }
    }

    Ok(header)
}

fn write_string(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u32).to_be_bytes());
    out.extend_from_slice(value.as_bytes());
}

/// Append a module entry to the header content.
pub(crate) fn write_module_entry(
    out: &mut Vec<u8>,
    specifier: &str,
    kind: ModuleKind,
    src_off: u32,
    src_len: u32,
    map_off: u32,
    map_len: u32,
) {
    write_string(out, specifier);
    out.push(ENTRY_KIND_MODULE);
    out.extend_from_slice(&src_off.to_be_bytes());
    out.extend_from_slice(&src_len.to_be_bytes());
    out.extend_from_slice(&map_off.to_be_bytes());
    out.extend_from_slice(&map_len.to_be_bytes());
    out.push(kind as u8);
}

/// Append a redirect entry to the header content.
pub(crate) fn write_redirect_entry(out: &mut Vec<u8>, specifier: &str, target: &str) {
    write_string(out, specifier);
    out.push(ENTRY_KIND_REDIRECT);
    write_string(out, target);
}

/// Append a root package request entry to the header content.
pub(crate) fn write_package_index_entry(out: &mut Vec<u8>, specifier: &str, index: u32) {
    write_string(out, specifier);
    out.push(ENTRY_KIND_PACKAGE_INDEX);
    out.extend_from_slice(&index.to_be_bytes());
}
