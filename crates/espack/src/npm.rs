//! # Package Snapshot Codec
//!
//! An archive may embed the resolved closure of its external package
//! dependencies. On the wire the snapshot is index-compressed: packages
//! are listed once, and both dependency edges and the root requests in
//! the modules header refer to packages by their position in that list.
//!
//! ```text
//! ( u32 id_len | id | u32 dep_count | ( u32 req_len | req | u32 index )* )*
//! ```
//!
//! Parsing is two-pass: first record `index -> id`, then rewrite every
//! dependency index to its id, rejecting dangling indices. Encoding is
//! deterministic: packages in lexicographic id order, dependency and
//! root maps in lexicographic request order.
//!
//! A package id serializes as `name@version`. Names may be scoped
//! (`@scope/name`), so the separator is the **last** `@`.

use std::collections::BTreeMap;
use std::fmt;

use espack_core::{ParseError, ParseResult};
use serde::{Deserialize, Serialize};

/// A resolved package identity: name plus exact version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NpmPackageId {
    /// Package name, possibly scoped (`@scope/name`).
    pub name: String,
    /// Exact resolved version.
    pub version: String,
}

impl NpmPackageId {
    /// Render as `name@version`.
    pub fn as_serialized(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    /// Parse a `name@version` id, splitting on the last `@` so scoped
    /// names keep their leading `@`.
    pub fn from_serialized(id: &str) -> ParseResult<Self> {
        let at = id
            .rfind('@')
            .ok_or_else(|| ParseError::InvalidV2NpmPackage(id.to_string()))?;
        let (name, version) = (&id[..at], &id[at + 1..]);
        if name.is_empty() || version.is_empty() {
            return Err(ParseError::InvalidV2NpmPackage(id.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
        })
    }
}

impl fmt::Display for NpmPackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// One resolved package: its identity and its dependency edges, keyed by
/// the request string each dependency was resolved from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpmPackage {
    /// The package identity.
    pub id: NpmPackageId,
    /// Dependency request -> resolved package id.
    pub deps: BTreeMap<String, NpmPackageId>,
}

/// The resolved external-dependency closure embedded in an archive.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NpmSnapshot {
    /// Every package of the closure.
    pub packages: Vec<NpmPackage>,
    /// Root request -> resolved package id, accumulated from the package
    /// request entries of the modules header.
    pub root_packages: BTreeMap<String, NpmPackageId>,
}

struct SnapshotReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SnapshotReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn bytes(&mut self, len: usize) -> ParseResult<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.buf.len());
        match end {
            Some(end) => {
                let slice = &self.buf[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(ParseError::InvalidV2Header(format!(
                "unexpected end of package snapshot at offset {}",
                self.pos
            ))),
        }
    }

    fn u32(&mut self) -> ParseResult<u32> {
        let bytes = self.bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn package_id(&mut self) -> ParseResult<String> {
        let len = self.u32()? as usize;
        let bytes = self.bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|err| ParseError::InvalidV2NpmPackage(String::from_utf8_lossy(err.as_bytes()).into_owned()))
    }

    fn request(&mut self) -> ParseResult<String> {
        let len = self.u32()? as usize;
        let bytes = self.bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|err| ParseError::InvalidV2NpmPackageReq(String::from_utf8_lossy(err.as_bytes()).into_owned()))
    }
}

/// Decode the verified content of the package-snapshot frame and apply
/// the root requests accumulated from the modules header.
pub(crate) fn decode(content: &[u8], npm_roots: &[(String, u32)]) -> ParseResult<NpmSnapshot> {
    let mut reader = SnapshotReader::new(content);

    // Pass 1: the raw table, dependency edges still index-shaped.
    let mut raw: Vec<(NpmPackageId, Vec<(String, u32)>)> = Vec::new();
    while !reader.at_end() {
        let id = NpmPackageId::from_serialized(&reader.package_id()?)?;
        let dep_count = reader.u32()? as usize;
        let mut deps = Vec::with_capacity(dep_count);
        for _ in 0..dep_count {
            let request = reader.request()?;
            let index = reader.u32()?;
            deps.push((request, index));
        }
        raw.push((id, deps));
    }

    let id_of = |index: u32| -> ParseResult<NpmPackageId> {
        raw.get(index as usize)
            .map(|(id, _)| id.clone())
            .ok_or(ParseError::InvalidV2NpmPackageOffset(index as usize))
    };

    // Pass 2: rewrite indices to ids.
    let mut packages = Vec::with_capacity(raw.len());
    for (id, deps) in &raw {
        let mut resolved = BTreeMap::new();
        for (request, index) in deps {
            resolved.insert(request.clone(), id_of(*index)?);
        }
        packages.push(NpmPackage {
            id: id.clone(),
            deps: resolved,
        });
    }

    let mut root_packages = BTreeMap::new();
    for (request, index) in npm_roots {
        root_packages.insert(request.clone(), id_of(*index)?);
    }

    Ok(NpmSnapshot {
        packages,
        root_packages,
    })
}

/// A snapshot normalized for serialization: the package table sorted by
/// id with an index for every id, so the header and the snapshot frame
/// agree on positions.
pub(crate) struct EncodedSnapshot {
    pub content: Vec<u8>,
    pub index_of: BTreeMap<String, u32>,
}

fn write_string(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u32).to_be_bytes());
    out.extend_from_slice(value.as_bytes());
}

/// Encode the snapshot deterministically. Rejects dependency edges that
/// name a package absent from the table.
pub(crate) fn encode(snapshot: &NpmSnapshot) -> ParseResult<EncodedSnapshot> {
    let mut sorted: Vec<&NpmPackage> = snapshot.packages.iter().collect();
    sorted.sort_by_key(|package| package.id.as_serialized());

    let mut index_of = BTreeMap::new();
    for (index, package) in sorted.iter().enumerate() {
        index_of.insert(package.id.as_serialized(), index as u32);
    }

    let resolve = |id: &NpmPackageId| -> ParseResult<u32> {
        index_of
            .get(&id.as_serialized())
            .copied()
            .ok_or_else(|| ParseError::InvalidV2NpmPackage(id.as_serialized()))
    };

    let mut content = Vec::new();
    for package in &sorted {
        write_string(&mut content, &package.id.as_serialized());
        content.extend_from_slice(&(package.deps.len() as u32).to_be_bytes());
        for (request, dep) in &package.deps {
            write_string(&mut content, request);
            content.extend_from_slice(&resolve(dep)?.to_be_bytes());
        }
    }

    Ok(EncodedSnapshot { content, index_of })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str, version: &str) -> NpmPackageId {
        NpmPackageId {
            name: name.to_string(),
            version: version.to_string(),
        }
    }

    fn snapshot() -> NpmSnapshot {
        let chalk = id("chalk", "5.3.0");
        let ansi = id("ansi-styles", "6.2.1");
        NpmSnapshot {
            packages: vec![
                NpmPackage {
                    id: chalk.clone(),
                    deps: BTreeMap::from([("ansi-styles@^6".to_string(), ansi.clone())]),
                },
                NpmPackage {
                    id: ansi.clone(),
                    deps: BTreeMap::new(),
                },
            ],
            root_packages: BTreeMap::from([("chalk@^5".to_string(), chalk)]),
        }
    }

    #[test]
    fn id_splits_on_last_at_sign() {
        let id = NpmPackageId::from_serialized("@scope/pkg@1.2.3").unwrap();
        assert_eq!(id.name, "@scope/pkg");
        assert_eq!(id.version, "1.2.3");
        assert_eq!(id.as_serialized(), "@scope/pkg@1.2.3");
    }

    #[test]
    fn id_rejects_missing_name_or_version() {
        assert!(NpmPackageId::from_serialized("@1.2.3").is_err());
        assert!(NpmPackageId::from_serialized("chalk@").is_err());
        assert!(NpmPackageId::from_serialized("no-version").is_err());
    }

    #[test]
    fn encode_then_decode_round_trips() {
        let original = snapshot();
        let encoded = encode(&original).unwrap();
        let roots: Vec<(String, u32)> = original
            .root_packages
            .iter()
            .map(|(request, id)| (request.clone(), encoded.index_of[&id.as_serialized()]))
            .collect();
        let decoded = decode(&encoded.content, &roots).unwrap();
        assert_eq!(decoded.root_packages, original.root_packages);
        let mut expected = original.packages.clone();
        expected.sort_by_key(|package| package.id.as_serialized());
        assert_eq!(decoded.packages, expected);
    }

    #[test]
    fn encoding_is_deterministic_regardless_of_input_order() {
        let mut shuffled = snapshot();
        shuffled.packages.reverse();
        assert_eq!(
            encode(&snapshot()).unwrap().content,
            encode(&shuffled).unwrap().content
        );
    }

    #[test]
    fn dangling_dep_index_is_rejected() {
        let encoded = encode(&snapshot()).unwrap();
        let decoded = decode(&encoded.content, &[("chalk@^5".to_string(), 99)]);
        assert!(matches!(
            decoded,
            Err(ParseError::InvalidV2NpmPackageOffset(99))
        ));
    }

    #[test]
    fn dep_on_package_outside_table_is_rejected_at_encode() {
        let mut bad = snapshot();
        bad.packages[0]
            .deps
            .insert("left-pad@^1".to_string(), id("left-pad", "1.3.0"));
        assert!(matches!(
            encode(&bad),
            Err(ParseError::InvalidV2NpmPackage(_))
        ));
    }

    #[test]
    fn non_utf8_request_is_rejected() {
        let mut content = Vec::new();
        write_string(&mut content, "chalk@5.3.0");
        content.extend_from_slice(&1u32.to_be_bytes()); // one dep
        content.extend_from_slice(&2u32.to_be_bytes()); // request length
        content.extend_from_slice(&[0xff, 0xfe]);
        content.extend_from_slice(&0u32.to_be_bytes()); // dep index
        assert!(matches!(
            decode(&content, &[]),
            Err(ParseError::InvalidV2NpmPackageReq(_))
        ));
    }

    #[test]
    fn truncated_snapshot_is_rejected() {
        let encoded = encode(&snapshot()).unwrap();
        let truncated = &encoded.content[..encoded.content.len() - 3];
        assert!(decode(truncated, &[]).is_err());
    }
}
