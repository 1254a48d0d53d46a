//! # Version and Options Negotiation
//!
//! An archive opens with an 8-byte magic that pins its format version.
//! Later versions add a package snapshot section and a self-describing
//! options header:
//!
//! | Magic       | Version | Packages | Options header | Default checksum |
//! |-------------|---------|----------|----------------|------------------|
//! | `ESZIP_V2`  | 2.0     | no       | no             | SHA-256          |
//! | `ESZIP2.1`  | 2.1     | yes      | no             | SHA-256          |
//! | `ESZIP2.2`  | 2.2     | yes      | yes            | none             |
//! | `ESZIP2.3`  | 2.3     | yes      | yes            | none             |
//!
//! 2.3 reserves codec extensions and frames identically to 2.2.
//!
//! ## Options header
//!
//! The options header is a framed byte vector of `(option_id, value)`
//! pairs. Id 0 declares the checksum algorithm, id 1 the digest size;
//! unknown ids are skipped so newer writers stay readable. The frame's
//! own digest is computed with the checksum the header just declared. An
//! algorithm byte this build does not know is accepted: digests are then
//! consumed using the declared size and verification is skipped.

use espack_core::{Checksum, ParseError, ParseResult};
use tokio::io::AsyncRead;

use crate::frame;

const OPTION_CHECKSUM: u8 = 0;
const OPTION_CHECKSUM_SIZE: u8 = 1;

/// An archive format version, identified by its magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Version {
    /// `ESZIP_V2`: modules and redirects only.
    V2_0,
    /// `ESZIP2.1`: adds the package snapshot section.
    V2_1,
    /// `ESZIP2.2`: adds the options header.
    V2_2,
    /// `ESZIP2.3`: as 2.2, with codec extensions reserved.
    V2_3,
}

impl Version {
    /// The version serialization emits.
    pub const LATEST: Version = Version::V2_3;

    /// Map magic bytes to a version.
    pub fn from_magic(magic: &[u8; 8]) -> Option<Self> {
        match magic {
            b"ESZIP_V2" => Some(Version::V2_0),
            b"ESZIP2.1" => Some(Version::V2_1),
            b"ESZIP2.2" => Some(Version::V2_2),
            b"ESZIP2.3" => Some(Version::V2_3),
            _ => None,
        }
    }

    /// The magic bytes identifying this version.
    pub fn magic(self) -> &'static [u8; 8] {
        match self {
            Version::V2_0 => b"ESZIP_V2",
            Version::V2_1 => b"ESZIP2.1",
            Version::V2_2 => b"ESZIP2.2",
            Version::V2_3 => b"ESZIP2.3",
        }
    }

    /// Whether archives of this version carry a package snapshot section.
    pub fn supports_packages(self) -> bool {
        self >= Version::V2_1
    }

    /// Whether archives of this version open with an options header.
    pub fn supports_options(self) -> bool {
        self >= Version::V2_2
    }
}

/// The negotiated per-archive options: checksum algorithm and digest size.
///
/// `checksum == None` means the algorithm byte was one this build does
/// not know; the archive still parses, with digests skipped rather than
/// verified, sized by the declared digest-size option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// The declared checksum algorithm, if known to this build.
    pub checksum: Option<Checksum>,
    /// The digest size declared by the options header, if any.
    pub checksum_size: Option<u8>,
}

impl Options {
    /// The options an archive of `version` starts from before its options
    /// header (if any) is applied.
    pub fn default_for(version: Version) -> Self {
        let checksum = if version.supports_options() {
            Checksum::None
        } else {
            Checksum::Sha256
        };
        Options {
            checksum: Some(checksum),
            checksum_size: None,
        }
    }

    /// The number of digest bytes each section and region entry carries.
    pub fn digest_size(&self) -> u8 {
        self.checksum_size
            .or_else(|| self.checksum.map(Checksum::digest_size))
            .unwrap_or(0)
    }

    /// Apply the raw option bytes of an options header onto `self`.
    ///
    /// Unknown option ids are skipped. Rejects an odd byte count and a
    /// declared digest size that disagrees with a known algorithm.
    fn update_from_bytes(&mut self, bytes: &[u8]) -> ParseResult<()> {
        if bytes.len() % 2 != 0 {
            return Err(ParseError::InvalidV22OptionsHeader(format!(
                "option bytes must come in pairs, got {} bytes",
                bytes.len()
            )));
        }
        for pair in bytes.chunks_exact(2) {
            match pair[0] {
                OPTION_CHECKSUM => self.checksum = Checksum::from_u8(pair[1]),
                OPTION_CHECKSUM_SIZE => self.checksum_size = Some(pair[1]),
                _ => {}
            }
        }
        self.validate()
    }

    fn validate(&self) -> ParseResult<()> {
        if let (Some(checksum), Some(size)) = (self.checksum, self.checksum_size) {
            if size != checksum.digest_size() {
                return Err(ParseError::InvalidV22OptionsHeader(format!(
                    "digest size {size} disagrees with checksum {checksum:?}"
                )));
            }
        }
        Ok(())
    }

    /// The option bytes serialization writes.
    pub(crate) fn to_option_bytes(&self) -> Vec<u8> {
        let checksum = self.checksum.unwrap_or(Checksum::None);
        vec![
            OPTION_CHECKSUM,
            checksum as u8,
            OPTION_CHECKSUM_SIZE,
            checksum.digest_size(),
        ]
    }
}

/// Read and apply the options header frame, verifying its digest with the
/// checksum the header itself declares.
pub(crate) async fn read_options_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    defaults: Options,
) -> ParseResult<Options> {
    let len = frame::read_u32(reader).await? as usize;
    let content = frame::read_vec(reader, len).await?;
    let mut options = defaults;
    options.update_from_bytes(&content)?;
    let digest = frame::read_vec(reader, options.digest_size() as usize).await?;
    if let Some(checksum) = options.checksum {
        if !checksum.verify(&content, &digest) {
            return Err(ParseError::InvalidV22OptionsHeaderHash);
        }
    }
    Ok(options)
}
