//! # Archive Error Surface
//!
//! Structured errors for every way an archive can fail to parse, verify,
//! or load. Uses `thiserror` for derive-based `Display` and `Error`
//! implementations with diagnostic payloads (byte offsets, specifiers,
//! package names) attached at the point of detection.
//!
//! ## Cloneability
//!
//! `ParseError` is `Clone`: a single failure while draining the source
//! regions must fan out to every module body that never became ready, and
//! each waiter receives the same cause. The `Io` and `InvalidV1Json`
//! variants wrap their non-cloneable inner errors in `Arc` to keep the
//! enum cheap to clone.

use std::sync::Arc;

use thiserror::Error;

/// Convenience alias for fallible archive operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Errors raised while parsing, verifying, or loading an archive.
///
/// Structural errors carry the byte offset (relative to the section being
/// decoded) or the specifier that triggered detection. All variants are
/// fatal for the archive; shape queries such as redirect cycles or a take
/// on an already-taken slot are `None`-shaped results, not errors.
#[derive(Error, Debug, Clone)]
pub enum ParseError {
    /// The legacy v1 document is not valid JSON of the expected shape.
    #[error("invalid v1 archive json: {0}")]
    InvalidV1Json(Arc<serde_json::Error>),

    /// The legacy v1 document declares an unsupported version tag.
    #[error("invalid v1 archive version: expected 1, got {0}")]
    InvalidV1Version(u64),

    /// The input does not start with a recognized archive magic.
    #[error("not an archive: unrecognized magic bytes")]
    InvalidV2,

    /// The modules header digest does not match its content.
    #[error("archive header checksum mismatch")]
    InvalidV2HeaderHash,

    /// A specifier in the modules header is not valid UTF-8.
    #[error("invalid specifier in header at offset {0}")]
    InvalidV2Specifier(usize),

    /// An entry kind byte is unknown, or not supported by the declared
    /// archive version.
    #[error("invalid entry kind {0} in header at offset {1}")]
    InvalidV2EntryKind(u8, usize),

    /// A module kind byte is outside the known set.
    #[error("invalid module kind {0} in header at offset {1}")]
    InvalidV2ModuleKind(u8, usize),

    /// The modules header is structurally truncated or malformed.
    #[error("invalid archive header: {0}")]
    InvalidV2Header(String),

    /// A source region carried bytes at an offset no header entry claims,
    /// or the stream position diverged from the offset an entry declared.
    #[error("invalid source offset {0}")]
    InvalidV2SourceOffset(usize),

    /// A source (or source map) body failed digest verification.
    #[error("source checksum mismatch for {0}")]
    InvalidV2SourceHash(String),

    /// The package snapshot digest does not match its content.
    #[error("package snapshot checksum mismatch")]
    InvalidV2NpmSnapshotHash,

    /// A dependency or root entry referenced a package index outside the
    /// snapshot table.
    #[error("package index {0} out of range in snapshot")]
    InvalidV2NpmPackageOffset(usize),

    /// A serialized package id could not be split into name and version.
    #[error("invalid package id {0:?}")]
    InvalidV2NpmPackage(String),

    /// A dependency request string is malformed.
    #[error("invalid package dependency request {0:?}")]
    InvalidV2NpmPackageReq(String),

    /// The options header is malformed (odd byte count, or a declared
    /// checksum that cannot carry a digest).
    #[error("invalid options header: {0}")]
    InvalidV22OptionsHeader(String),

    /// The options header digest (computed with the checksum the header
    /// itself declares) does not match.
    #[error("options header checksum mismatch")]
    InvalidV22OptionsHeaderHash,

    /// An I/O error from the underlying byte stream.
    #[error("io error: {0}")]
    Io(Arc<std::io::Error>),

    /// The external graph builder failed to load a requested specifier.
    #[error("provider failed for {specifier}: {reason}")]
    Provider {
        /// The specifier the load request named.
        specifier: String,
        /// The failure reported by the provider.
        reason: String,
    },
}

impl From<std::io::Error> for ParseError {
    fn from(err: std::io::Error) -> Self {
        ParseError::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        ParseError::InvalidV1Json(Arc::new(err))
    }
}
