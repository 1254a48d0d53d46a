//! # Checksum Primitives
//!
//! The fixed-size digest functions an archive can protect its sections
//! with: none, SHA-256 (32 bytes), and XXH3-64 (8 bytes, stored
//! big-endian). The algorithm is negotiated per archive through the
//! options header; every framed section and every source body carries a
//! digest of the negotiated size.
//!
//! SHA-256 digests are compared in constant time via
//! [`subtle::ConstantTimeEq`]; XXH3 is an integrity check, not a security
//! boundary, and compares directly.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use xxhash_rust::xxh3::xxh3_64;

/// A checksum algorithm negotiated for an archive.
///
/// The discriminant is the algorithm byte carried in the options header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Checksum {
    /// No digests are written or verified.
    #[default]
    None = 0,
    /// SHA-256, 32-byte digests.
    Sha256 = 1,
    /// XXH3-64, 8-byte big-endian digests.
    Xxh3 = 2,
}

impl Checksum {
    /// Decode an algorithm byte from the options header.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Checksum::None),
            1 => Some(Checksum::Sha256),
            2 => Some(Checksum::Xxh3),
            _ => None,
        }
    }

    /// The number of digest bytes this algorithm appends to a section.
    pub fn digest_size(self) -> u8 {
        match self {
            Checksum::None => 0,
            Checksum::Sha256 => 32,
            Checksum::Xxh3 => 8,
        }
    }

    /// Compute the digest of `bytes`.
    ///
    /// Returns an empty vector for [`Checksum::None`].
    pub fn hash(self, bytes: &[u8]) -> Vec<u8> {
        match self {
            Checksum::None => Vec::new(),
            Checksum::Sha256 => Sha256::digest(bytes).to_vec(),
            Checksum::Xxh3 => xxh3_64(bytes).to_be_bytes().to_vec(),
        }
    }

    /// Verify that `digest` matches the digest of `bytes`.
    ///
    /// [`Checksum::None`] always verifies.
    pub fn verify(self, bytes: &[u8], digest: &[u8]) -> bool {
        match self {
            Checksum::None => true,
            Checksum::Sha256 => {
                let computed = Sha256::digest(bytes);
                computed.as_slice().ct_eq(digest).into()
            }
            Checksum::Xxh3 => xxh3_64(bytes).to_be_bytes().as_slice() == digest,
        }
    }
}
