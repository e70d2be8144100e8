//! Package catalog
//!
//! One record per published version, backed by `SQLite`. The catalog is the
//! source of truth for which versions exist and which are still active; the
//! bytes live in the blob store and are referenced by `blob_ref`.

pub mod actor;
pub mod db;

use chrono::{DateTime, Utc};
use thiserror::Error;
use updist_schema::{Checksum, PackageId, PackageInfo, PackageMetadata, Version};

use crate::blob::BlobRef;

pub use actor::{CatalogEvent, CatalogHandle};
pub use db::Catalog;

/// Catalog failure.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// A record with this exact version string exists, active or not.
    #[error("version {0} is already published")]
    DuplicateVersion(Version),

    /// No record has this id.
    #[error("package not found: {0}")]
    NotFound(PackageId),

    /// The database rejected the statement.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored row does not decode.
    #[error("corrupt catalog row: {0}")]
    Corrupt(String),

    /// The actor thread has exited.
    #[error("catalog actor is no longer running")]
    ActorDied,
}

/// A published package as persisted in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    /// Assigned at upload.
    pub id: PackageId,
    /// Unique across all records.
    pub version: Version,
    /// Release notes from the manifest.
    pub changelog: String,
    /// Filename the archive was uploaded under.
    pub filename: String,
    /// Archive size in bytes.
    pub file_size: u64,
    /// Internal; never leaves the service.
    pub blob_ref: BlobRef,
    /// Checksum of the archive bytes.
    pub checksum: Checksum,
    /// Inactive records are kept but never offered or served.
    pub active: bool,
    /// Oldest client able to apply this update.
    pub minimum_client_version: Version,
    /// Optional manifest fields.
    pub metadata: PackageMetadata,
    /// Upload time, microsecond precision.
    pub created_at: DateTime<Utc>,
}

impl PackageRecord {
    /// Public view, without the blob reference.
    pub fn info(&self) -> PackageInfo {
        PackageInfo {
            id: self.id,
            version: self.version.clone(),
            changelog: self.changelog.clone(),
            filename: self.filename.clone(),
            file_size: self.file_size,
            checksum: self.checksum.clone(),
            minimum_client_version: self.minimum_client_version.clone(),
            active: self.active,
            metadata: self.metadata.clone(),
            created_at: self.created_at,
        }
    }
}
