//! # Content identity
//!
//! Every object in the store is named by a [`Guid`]: the SHA-256 digest of
//! either its raw bytes (atoms) or a canonical string built from its
//! immutable fields (every other manifest type).
//!
//! The text form is `SHA256_16_<hex digest>` (algorithm, base, digest) and is
//! what travels over the wire and lands on disk. A distinguished
//! [`Guid::Invalid`] value stands in for anything that could not be hashed or
//! parsed; lookups and stores reject it up front.

use std::fmt;
use std::io::Read;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Size of a SHA-256 digest in bytes
pub const GUID_SIZE: usize = 32;

const GUID_PREFIX: &str = "SHA256_16_";
const INVALID_TEXT: &str = "INVALID";

/// Errors that can occur while computing a digest
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("failed to read input while hashing: {0}")]
    Read(#[from] std::io::Error),
}

/// Errors that can occur while parsing a GUID from text
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GuidError {
    #[error("guid is missing the SHA256_16_ prefix: {0}")]
    MissingPrefix(String),
    #[error("guid digest is not valid hex: {0}")]
    InvalidHex(String),
    #[error("guid digest has wrong length, expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// A content-derived identifier.
///
/// `Invalid` sorts before every real digest so that sets of GUIDs keep a
/// stable order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Guid {
    #[default]
    Invalid,
    Sha256([u8; GUID_SIZE]),
}

impl Guid {
    /// Hash a byte sequence
    pub fn hash(data: impl AsRef<[u8]>) -> Self {
        let digest = Sha256::digest(data.as_ref());
        Guid::Sha256(digest.into())
    }

    /// Hash a canonical manifest string
    pub fn hash_str(canonical: &str) -> Self {
        Self::hash(canonical.as_bytes())
    }

    /// Hash everything a reader yields, without buffering it all in memory
    pub fn hash_reader<R: Read>(mut reader: R) -> Result<Self, HashError> {
        let mut hasher = GuidHasher::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hasher.finish())
    }

    /// Parse a GUID, mapping anything malformed to [`Guid::Invalid`]
    pub fn parse_lossy(s: &str) -> Self {
        s.parse().unwrap_or(Guid::Invalid)
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Guid::Sha256(_))
    }

    pub fn is_invalid(&self) -> bool {
        !self.is_valid()
    }

    /// Raw digest bytes, if this is a real digest
    pub fn digest(&self) -> Option<&[u8; GUID_SIZE]> {
        match self {
            Guid::Sha256(bytes) => Some(bytes),
            Guid::Invalid => None,
        }
    }

    /// Hex-encoded digest, empty for `Invalid`
    pub fn to_hex(&self) -> String {
        self.digest().map(hex::encode).unwrap_or_default()
    }

    /// Short form for log lines
    pub fn short(&self) -> String {
        match self {
            Guid::Sha256(bytes) => hex::encode(&bytes[..6]),
            Guid::Invalid => INVALID_TEXT.to_string(),
        }
    }

    /// Stable shard index in `0..shards`, used by the sharded maps
    pub fn shard(&self, shards: usize) -> usize {
        match self {
            Guid::Sha256(bytes) => {
                let mut word = [0u8; 8];
                word.copy_from_slice(&bytes[..8]);
                (u64::from_le_bytes(word) % shards as u64) as usize
            }
            Guid::Invalid => 0,
        }
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guid::Sha256(bytes) => write!(f, "{}{}", GUID_PREFIX, hex::encode(bytes)),
            Guid::Invalid => f.write_str(INVALID_TEXT),
        }
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self.short())
    }
}

impl FromStr for Guid {
    type Err = GuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digest = s
            .strip_prefix(GUID_PREFIX)
            .ok_or_else(|| GuidError::MissingPrefix(s.to_string()))?;
        let bytes = hex::decode(digest).map_err(|_| GuidError::InvalidHex(s.to_string()))?;
        let bytes: [u8; GUID_SIZE] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| GuidError::InvalidLength(bytes.len()))?;
        Ok(Guid::Sha256(bytes))
    }
}

impl Serialize for Guid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Guid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Malformed identifiers decode to `Invalid` so that the surrounding
        // manifest can still be inspected and reported as invalid.
        let text = String::deserialize(deserializer)?;
        Ok(Guid::parse_lossy(&text))
    }
}

/// Incremental hasher producing a [`Guid`]
#[derive(Clone, Default)]
pub struct GuidHasher(Sha256);

impl GuidHasher {
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    pub fn update(&mut self, data: impl AsRef<[u8]>) {
        self.0.update(data.as_ref());
    }

    pub fn finish(self) -> Guid {
        Guid::Sha256(self.0.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        let a = Guid::hash(b"hello sea of stuff");
        let b = Guid::hash(b"hello sea of stuff");
        assert_eq!(a, b);
        assert!(a.is_valid());
    }

    #[test]
    fn test_known_vector() {
        // sha256("abc")
        let guid = Guid::hash(b"abc");
        assert_eq!(
            guid.to_string(),
            "SHA256_16_ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_parse_round_trip() {
        let guid = Guid::hash(b"data");
        let parsed: Guid = guid.to_string().parse().unwrap();
        assert_eq!(guid, parsed);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            "abc".parse::<Guid>(),
            Err(GuidError::MissingPrefix(_))
        ));
        assert!(matches!(
            "SHA256_16_zz".parse::<Guid>(),
            Err(GuidError::InvalidHex(_))
        ));
        assert_eq!(
            "SHA256_16_abcd".parse::<Guid>(),
            Err(GuidError::InvalidLength(2))
        );
        assert_eq!(Guid::parse_lossy("INVALID"), Guid::Invalid);
    }

    #[test]
    fn test_reader_matches_bytes() {
        let data = vec![7u8; 200_000];
        let from_reader = Guid::hash_reader(std::io::Cursor::new(&data)).unwrap();
        assert_eq!(from_reader, Guid::hash(&data));
    }

    #[test]
    fn test_serde_invalid_is_lossy() {
        let guid: Guid = serde_json::from_str("\"not-a-guid\"").unwrap();
        assert_eq!(guid, Guid::Invalid);
        assert_eq!(serde_json::to_string(&Guid::Invalid).unwrap(), "\"INVALID\"");
    }

    #[test]
    fn test_hasher_concatenation() {
        let mut hasher = GuidHasher::new();
        hasher.update(b"abc");
        hasher.update(b"def");
        assert_eq!(hasher.finish(), Guid::hash(b"abcdef"));
    }
}
