//! Shared types and wire format for updist.
//!
//! Everything in this crate is pure data: version grammar, checksums, the
//! archive manifest and the public views of published packages. No I/O.

pub mod checksum;
pub mod manifest;
pub mod types;
pub mod version;

// Re-exports
pub use checksum::{Checksum, ChecksumError, ChecksumHasher};
pub use manifest::{Manifest, ManifestDraft, ManifestError};
pub use types::*;
pub use version::{Version, VersionError, compare};

/// Name of the manifest entry every update archive carries at its root.
pub const MANIFEST_ENTRY: &str = "version.json";

/// Name of the exercise export entry bundled into generated packages.
pub const EXERCISES_ENTRY: &str = "exercises.json";

/// Content type used when streaming update archives.
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";
