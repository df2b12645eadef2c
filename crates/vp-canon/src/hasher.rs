// hasher.rs — SHA-256 policy hashing.
//
// A policy hash is always `sha256:` followed by the 64-character lowercase
// hex digest of the policy's canonical bytes. Other algorithm tags are
// reserved for future use and are rejected when parsing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::CanonError;

/// Algorithm tag prefixed to every hash this crate produces.
pub const SHA256_PREFIX: &str = "sha256:";

/// Hash arbitrary bytes, returning a lowercase hex-encoded SHA-256 string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    // `format!("{:x}", ...)` produces lowercase hex
    format!("{:x}", result)
}

/// Hash canonical bytes into a tagged [`PolicyHash`].
pub fn hash(canonical: &[u8]) -> PolicyHash {
    PolicyHash {
        hex: hash_bytes(canonical),
    }
}

/// A tagged SHA-256 digest: `sha256:<64 lowercase hex>`.
///
/// Only [`hash`] and [`PolicyHash::parse`] construct one, so a value of this
/// type is always well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolicyHash {
    hex: String,
}

impl PolicyHash {
    /// Parse a `sha256:<hex>` string.
    pub fn parse(value: &str) -> Result<Self, CanonError> {
        let malformed = |reason: &str| CanonError::MalformedHash {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let hex = value
            .strip_prefix(SHA256_PREFIX)
            .ok_or_else(|| malformed("missing 'sha256:' algorithm tag"))?;
        if hex.len() != 64 {
            return Err(malformed("digest must be 64 hex characters"));
        }
        if !hex
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(malformed("digest must be lowercase hex"));
        }
        Ok(Self {
            hex: hex.to_string(),
        })
    }
}

impl fmt::Display for PolicyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", SHA256_PREFIX, self.hex)
    }
}

impl FromStr for PolicyHash {
    type Err = CanonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PolicyHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PolicyHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
