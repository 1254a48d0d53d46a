//! # Streaming Loader
//!
//! After the header and package sections are consumed, the rest of the
//! stream is the two bulk regions:
//!
//! ```text
//! u32 total_len | ( bytes[N_i] | digest[D] )*     sources
//! u32 total_len | ( bytes[M_i] | digest[D] )*     source maps
//! ```
//!
//! Offsets and totals count content bytes only; digests sit between
//! entries without affecting either. The loader walks each region in
//! offset order, verifies every entry against the negotiated checksum,
//! and fills the owning slot, so consumers awaiting a body are released
//! in on-disk order while later bodies are still in flight.
//!
//! On any failure the already-ready slots keep their bytes and every
//! slot that never became ready is failed with the same cause, which
//! unblocks all waiters. The same applies when the returned future is
//! dropped before completion.

use std::collections::BTreeMap;
use std::sync::Arc;

use espack_core::{ParseError, ParseResult, SourceSlot};
use tokio::io::AsyncRead;
use tracing::{debug, trace};

use crate::frame::{read_u32, Section};
use crate::header::RegionEntry;
use crate::version::Options;

/// Fails every still-pending slot when dropped, so cancelling the load
/// cannot strand waiters.
struct PendingGuard {
    slots: Vec<Arc<SourceSlot>>,
}

impl PendingGuard {
    fn new(sources: &BTreeMap<u32, RegionEntry>, source_maps: &BTreeMap<u32, RegionEntry>) -> Self {
        let slots = sources
            .values()
            .chain(source_maps.values())
            .map(|entry| Arc::clone(&entry.slot))
            .collect();
        Self { slots }
    }

    fn fail_remaining(&mut self, cause: &ParseError) {
        for slot in self.slots.drain(..) {
            slot.fail(cause.clone());
        }
    }

    fn disarm(&mut self) {
        self.slots.clear();
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.slots.is_empty() {
            return;
        }
        let cause = ParseError::from(std::io::Error::new(
            std::io::ErrorKind::Interrupted,
            "archive load cancelled",
        ));
        self.fail_remaining(&cause);
    }
}

/// Drain both bulk regions into their slots.
///
/// The guard is armed before the returned future is first polled, so
/// dropping the future at any point fails the slots it never filled.
pub(crate) fn load_regions<R: AsyncRead + Unpin>(
    mut reader: R,
    sources: BTreeMap<u32, RegionEntry>,
    source_maps: BTreeMap<u32, RegionEntry>,
    options: Options,
) -> impl std::future::Future<Output = ParseResult<()>> {
    let mut guard = PendingGuard::new(&sources, &source_maps);
    async move {
        let outcome = async {
            drain_region(&mut reader, &sources, "source", options).await?;
            drain_region(&mut reader, &source_maps, "source map", options).await?;
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => {
                guard.disarm();
                Ok(())
            }
            Err(err) => {
                guard.fail_remaining(&err);
                Err(err)
            }
        }
    }
}

async fn drain_region<R: AsyncRead + Unpin>(
    reader: &mut R,
    region: &BTreeMap<u32, RegionEntry>,
    label: &str,
    options: Options,
) -> ParseResult<()> {
    let total = read_u32(reader).await? as usize;
    debug!(entries = region.len(), total, "loading {label} region");

    let mut position = 0usize;
    for (offset, entry) in region {
        if *offset as usize != position {
            return Err(ParseError::InvalidV2SourceOffset(position));
        }
        let section = Section::read_with_len(reader, entry.length as usize, options).await?;
        if !section.is_valid(options) {
            return Err(ParseError::InvalidV2SourceHash(entry.specifier.clone()));
        }
        position += entry.length as usize;
        trace!(specifier = %entry.specifier, length = entry.length, "{label} body ready");
        entry.slot.set_ready(section.into_content().into());
    }

    if position != total {
        return Err(ParseError::InvalidV2SourceOffset(position));
    }
    Ok(())
}
