//! Service-level errors.

use thiserror::Error;
use updist_schema::{Checksum, ChecksumError, ManifestError, PackageId, Version, VersionError};

use crate::blob::{BlobError, BlobRef};
use crate::caller::Role;
use crate::catalog::CatalogError;
use crate::exercises::ExportError;
use crate::gate::GateError;

/// Coarse failure class, used to pick transport status codes and log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The caller sent something unacceptable.
    Validation,
    /// The version is already published.
    Conflict,
    /// The tenant may not receive updates.
    Gating,
    /// No such package.
    NotFound,
    /// The package exists but is in the wrong state.
    State,
    /// The caller's role does not permit the operation.
    Forbidden,
    /// Internal storage or collaborator failure; details stay server-side.
    Storage,
}

/// Every way a service operation can fail. [`UpdateError::class`] maps it
/// to a transport-neutral [`ErrorClass`].
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Filename or magic bytes are not a zip archive.
    #[error("update packages must be .zip archives")]
    InvalidFileType,

    /// Manifest missing, malformed or invalid.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Supplied checksum string does not parse.
    #[error("invalid checksum: {0}")]
    InvalidChecksum(#[from] ChecksumError),

    #[error("checksum mismatch: supplied {supplied}, computed {computed}")]
    /// Supplied checksum differs from the archive's.
    ChecksumMismatch {
        /// What the publisher sent.
        supplied: Checksum,
        /// What the bytes hash to.
        computed: Checksum,
    },

    /// A node reported a version that does not parse.
    #[error("invalid reported version: {0}")]
    InvalidReportedVersion(#[source] VersionError),

    /// Version already published, active or not.
    #[error("an update with version {0} already exists")]
    ConflictVersionExists(Version),

    /// Gate: no such tenant.
    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    /// Gate: tenant switched off.
    #[error("tenant {0} is inactive")]
    TenantInactive(String),

    /// Gate: no active license.
    #[error("tenant {0} has no active license")]
    NoActiveLicense(String),

    /// Gate: every active license has expired.
    #[error("license of tenant {0} has expired")]
    LicenseExpired(String),

    /// No record with this id.
    #[error("update not found: {0}")]
    NotFound(PackageId),

    /// Record exists but is deactivated.
    #[error("update {0} is no longer active")]
    PackageInactive(PackageId),

    /// Caller's role does not permit the operation.
    #[error("role {role} may not {action}")]
    Forbidden {
        /// Role of the caller.
        role: Role,
        /// Attempted operation, for the message.
        action: &'static str,
    },

    /// Blob write failed; no record was created.
    #[error("failed to store archive: {0}")]
    StorageWriteFailed(#[source] BlobError),

    /// A record points at a blob the store does not have.
    #[error("archive {blob_ref} of update {id} is missing from storage")]
    BlobMissing {
        /// Affected record.
        id: PackageId,
        /// Reference the record holds.
        blob_ref: BlobRef,
    },

    /// Other blob store failure.
    #[error("blob store error: {0}")]
    Blob(#[source] BlobError),

    /// Catalog failure other than duplicates and missing ids.
    #[error("catalog error: {0}")]
    Catalog(#[source] CatalogError),

    /// A generated archive could not be written.
    #[error("failed to build archive: {0}")]
    ArchiveBuild(#[from] zip::result::ZipError),

    /// License gate or exercise exporter failed.
    #[error("{what} failed: {source}")]
    Collaborator {
        /// Which collaborator.
        what: &'static str,
        /// Its error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl UpdateError {
    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidFileType
            | Self::Manifest(_)
            | Self::InvalidChecksum(_)
            | Self::ChecksumMismatch { .. }
            | Self::InvalidReportedVersion(_) => ErrorClass::Validation,
            Self::ConflictVersionExists(_) => ErrorClass::Conflict,
            Self::TenantNotFound(_)
            | Self::TenantInactive(_)
            | Self::NoActiveLicense(_)
            | Self::LicenseExpired(_) => ErrorClass::Gating,
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::PackageInactive(_) => ErrorClass::State,
            Self::Forbidden { .. } => ErrorClass::Forbidden,
            Self::StorageWriteFailed(_)
            | Self::BlobMissing { .. }
            | Self::Blob(_)
            | Self::Catalog(_)
            | Self::ArchiveBuild(_)
            | Self::Collaborator { .. } => ErrorClass::Storage,
        }
    }
}

impl From<CatalogError> for UpdateError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::DuplicateVersion(v) => Self::ConflictVersionExists(v),
            CatalogError::NotFound(id) => Self::NotFound(id),
            other => Self::Catalog(other),
        }
    }
}

impl From<GateError> for UpdateError {
    fn from(e: GateError) -> Self {
        Self::Collaborator {
            what: "license gate",
            source: Box::new(e),
        }
    }
}

impl From<ExportError> for UpdateError {
    fn from(e: ExportError) -> Self {
        Self::Collaborator {
            what: "exercise export",
            source: Box::new(e),
        }
    }
}
