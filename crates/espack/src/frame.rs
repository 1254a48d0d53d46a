//! # Framed Sections
//!
//! Every structured section of an archive is a frame:
//!
//! ```text
//! │◄────────────── frame ──────────────►│
//! ├────────────┬───────────┬────────────┤
//! │u32 BE      │           │            │
//! │length      │content    │digest[D]   │
//! └────────────┴───────────┴────────────┘
//! ```
//!
//! `D` is the digest size the archive's options negotiated (0 when the
//! checksum is none). Inside the bulk source regions the per-entry
//! lengths come from the modules header instead of a prefix, so a
//! known-length read variant exists for those.
//!
//! Verification is split from reading: each caller maps a digest
//! mismatch to the error variant of the section it was reading.

use espack_core::{Checksum, ParseResult};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::version::Options;

/// Read a big-endian u32.
pub(crate) async fn read_u32<R: AsyncRead + Unpin>(reader: &mut R) -> ParseResult<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).await?;
    Ok(u32::from_be_bytes(buf))
}

/// Read exactly `len` bytes.
pub(crate) async fn read_vec<R: AsyncRead + Unpin>(
    reader: &mut R,
    len: usize,
) -> ParseResult<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// A frame's content together with the digest that followed it.
#[derive(Debug)]
pub(crate) struct Section {
    content: Vec<u8>,
    digest: Vec<u8>,
}

impl Section {
    /// Read a length-prefixed frame.
    pub(crate) async fn read<R: AsyncRead + Unpin>(
        reader: &mut R,
        options: Options,
    ) -> ParseResult<Self> {
        let len = read_u32(reader).await? as usize;
        Self::read_with_len(reader, len, options).await
    }

    /// Read a frame whose content length is already known, as inside the
    /// bulk regions.
    pub(crate) async fn read_with_len<R: AsyncRead + Unpin>(
        reader: &mut R,
        len: usize,
        options: Options,
    ) -> ParseResult<Self> {
        let content = read_vec(reader, len).await?;
        let digest = read_vec(reader, options.digest_size() as usize).await?;
        Ok(Section { content, digest })
    }

    pub(crate) fn content(&self) -> &[u8] {
        &self.content
    }

    pub(crate) fn into_content(self) -> Vec<u8> {
        self.content
    }

    /// Whether the digest matches the content under the negotiated
    /// checksum. An unknown algorithm cannot be verified and passes.
    pub(crate) fn is_valid(&self, options: Options) -> bool {
        match options.checksum {
            Some(checksum) => checksum.verify(&self.content, &self.digest),
            None => true,
        }
    }

    /// Append `u32 length | content | digest` to `out`.
    pub(crate) fn write(out: &mut Vec<u8>, content: &[u8], checksum: Checksum) {
        out.extend_from_slice(&(content.len() as u32).to_be_bytes());
        out.extend_from_slice(content);
        out.extend(checksum.hash(content));
    }
}
