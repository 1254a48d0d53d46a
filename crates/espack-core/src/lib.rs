//! # espack-core: Archive Vocabulary
//!
//! Shared building blocks for the espack module-graph archive format:
//!
//! - **Error surface** (`error.rs`): the [`ParseError`] taxonomy every
//!   parse, verification, and load failure is reported through.
//! - **Checksums** (`checksum.rs`): the [`Checksum`] algorithms an
//!   archive may negotiate (none, SHA-256, XXH3-64) and their digest
//!   discipline.
//! - **Ordered map** (`ordered.rs`): [`OrderedMap`], the insertion-ordered
//!   specifier map whose iteration order is the archive's wire order.
//! - **Source slot** (`slot.rs`): [`SourceSlot`], the pending/ready/taken
//!   cell that lets consumers await a module body while the rest of the
//!   archive is still streaming in.
//!
//! ## Crate Policy
//!
//! This crate depends on no other workspace crate. The codec crate
//! (`espack`) builds the wire format and facade on top of these types.

pub mod checksum;
pub mod error;
pub mod ordered;
pub mod slot;

pub use checksum::Checksum;
pub use error::{ParseError, ParseResult};
pub use ordered::OrderedMap;
pub use slot::SourceSlot;
