//! Shared helpers for the integration suite.
#![allow(dead_code)]

use espack::{Archive, Checksum};

/// Parse an archive and drive its completion future to the end.
pub async fn parse_fully(bytes: &[u8]) -> Archive {
    let (archive, load) = Archive::parse(bytes).await.expect("archive should parse");
    load.await.expect("bodies should load");
    archive
}

/// Byte offsets of the sections of a serialized archive.
///
/// Mirrors the wire layout: `magic[8]`, then the options, modules, and
/// packages frames, then the two bulk regions. `checksum` is the
/// algorithm the archive was serialized with; `source_bodies` the number
/// of non-empty source bodies (each carries one digest in its region).
pub struct Layout {
    pub options_start: usize,
    pub header_start: usize,
    pub packages_start: usize,
    pub sources_start: usize,
    pub maps_start: usize,
}

pub fn layout(bytes: &[u8], checksum: Checksum, source_bodies: usize) -> Layout {
    let digest = checksum.digest_size() as usize;
    let frame_end = |start: usize| -> usize {
        let len = u32::from_be_bytes(bytes[start..start + 4].try_into().unwrap()) as usize;
        start + 4 + len + digest
    };
    let options_start = 8;
    let header_start = frame_end(options_start);
    let packages_start = frame_end(header_start);
    let sources_start = frame_end(packages_start);
    let sources_len =
        u32::from_be_bytes(bytes[sources_start..sources_start + 4].try_into().unwrap()) as usize;
    let maps_start = sources_start + 4 + sources_len + digest * source_bodies;
    Layout {
        options_start,
        header_start,
        packages_start,
        sources_start,
        maps_start,
    }
}
