//! Archive checksums.
//!
//! A checksum is the string `sha256:` followed by 64 lowercase hex digits.
//! Parsing accepts either case and normalizes, so comparison is plain string
//! equality. [`ChecksumHasher`] computes one incrementally over a stream.

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Literal prefix carried by every checksum string.
pub const CHECKSUM_PREFIX: &str = "sha256:";

/// Errors that can occur when parsing a checksum string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChecksumError {
    /// The string does not start with `sha256:`.
    #[error("checksum must start with '{CHECKSUM_PREFIX}', got '{0}'")]
    MissingPrefix(String),

    /// The hex portion is not 64 characters long.
    #[error("checksum must carry 64 hex characters, got {0}")]
    BadLength(usize),

    /// The hex portion contains non-hex characters.
    #[error("checksum contains non-hex characters: '{0}'")]
    NonHex(String),
}

/// A SHA-256 checksum in its wire form: `sha256:<64 lowercase hex>`.
///
/// Validated at construction and deserialization, so every `Checksum` in the
/// system is well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    /// Parse a `sha256:<hex>` string, normalizing the hex to lowercase.
    ///
    /// # Errors
    ///
    /// Returns a [`ChecksumError`] describing the first violated rule.
    pub fn parse(s: &str) -> Result<Self, ChecksumError> {
        let hex = s
            .strip_prefix(CHECKSUM_PREFIX)
            .ok_or_else(|| ChecksumError::MissingPrefix(s.to_string()))?;

        if hex.len() != 64 {
            return Err(ChecksumError::BadLength(hex.len()));
        }
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ChecksumError::NonHex(s.to_string()));
        }

        Ok(Self(format!("{CHECKSUM_PREFIX}{}", hex.to_lowercase())))
    }

    /// Compute the checksum of an in-memory buffer.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = ChecksumHasher::new();
        hasher.update(data);
        hasher.finalize()
    }

    /// The full `sha256:<hex>` string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The hex digest without the prefix.
    pub fn hex(&self) -> &str {
        &self.0[CHECKSUM_PREFIX.len()..]
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Checksum {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Incremental checksum computation for streamed content.
#[derive(Debug, Clone, Default)]
pub struct ChecksumHasher(Sha256);

impl ChecksumHasher {
    /// Start a new hash.
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    /// Feed the next chunk of bytes.
    pub fn update(&mut self, chunk: &[u8]) {
        self.0.update(chunk);
    }

    /// Finish hashing and produce the checksum.
    pub fn finalize(self) -> Checksum {
        Checksum(format!("{CHECKSUM_PREFIX}{}", hex::encode(self.0.finalize())))
    }
}
