//! Update distribution service
//!
//! Orchestrates the archive reader, blob store, catalog and license gate.
//!
//! Writes follow a two-step protocol: blob first, then the catalog record.
//! A failure between the two leaves an orphan blob (logged, never rolled
//! back in-request); deletes remove the blob first and tolerate it already
//! being gone. [`crate::reconcile`] sweeps both kinds of leftovers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, SubsecRound, Utc};
use updist_schema::{
    ARCHIVE_CONTENT_TYPE, AvailableUpdate, Checksum, EligibilityDecision, PackageId, PackageInfo,
    Version, WithheldReason, WithheldUpdate, compare,
};

use crate::archive;
use crate::blob::{BlobError, BlobStore, BlobStream};
use crate::caller::Caller;
use crate::catalog::{CatalogError, CatalogHandle, PackageRecord};
use crate::error::UpdateError;
use crate::gate::{LicenseGate, TenantStanding};
use crate::reconcile::{self, ReconcileReport};

/// An archive submitted for publication.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Original filename; must end in `.zip`.
    pub filename: String,
    /// Full archive bytes.
    pub bytes: Bytes,
    /// Optional `sha256:<hex>` the publisher computed.
    pub checksum: Option<String>,
}

/// A package ready to stream to a node.
pub struct PackageDownload {
    /// Archive bytes, read lazily.
    pub stream: BlobStream,
    /// Filename to offer the client.
    pub filename: String,
    /// Length in bytes.
    pub size: u64,
    /// Package version.
    pub version: Version,
    /// Checksum of the full stream.
    pub checksum: Checksum,
    /// Always `application/zip`.
    pub content_type: &'static str,
}

impl fmt::Debug for PackageDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageDownload")
            .field("filename", &self.filename)
            .field("size", &self.size)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// The update distribution service. Cheap to clone.
#[derive(Clone)]
pub struct UpdateService {
    catalog: CatalogHandle,
    blobs: Arc<dyn BlobStore>,
    gate: Arc<dyn LicenseGate>,
}

impl fmt::Debug for UpdateService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateService").finish_non_exhaustive()
    }
}

fn require_publisher(caller: &Caller, action: &'static str) -> Result<(), UpdateError> {
    if caller.role.can_publish() {
        Ok(())
    } else {
        Err(UpdateError::Forbidden {
            role: caller.role,
            action,
        })
    }
}

fn require_reader(caller: &Caller, action: &'static str) -> Result<(), UpdateError> {
    if caller.role.can_read() {
        Ok(())
    } else {
        Err(UpdateError::Forbidden {
            role: caller.role,
            action,
        })
    }
}

/// Catalog timestamps are stored at microsecond precision.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

impl UpdateService {
    /// Service over the given stores and gate.
    pub fn new(
        catalog: CatalogHandle,
        blobs: Arc<dyn BlobStore>,
        gate: Arc<dyn LicenseGate>,
    ) -> Self {
        Self {
            catalog,
            blobs,
            gate,
        }
    }

    /// Validate and publish an archive.
    ///
    /// # Errors
    ///
    /// Validation errors (file type, manifest, checksum) are returned before
    /// anything is stored. [`UpdateError::ConflictVersionExists`] if the
    /// version is taken, [`UpdateError::StorageWriteFailed`] if the blob write
    /// fails, and a catalog error if the record cannot be written after it.
    pub async fn upload(
        &self,
        caller: &Caller,
        request: UploadRequest,
    ) -> Result<PackageInfo, UpdateError> {
        require_publisher(caller, "upload updates")?;

        if !archive::is_zip_archive(&request.filename, &request.bytes) {
            return Err(UpdateError::InvalidFileType);
        }

        let manifest = archive::read_manifest(&request.bytes)?;
        tracing::info!(
            version = %manifest.version,
            minimum_client_version = %manifest.minimum_client_version,
            filename = %request.filename,
            "manifest extracted"
        );

        if self
            .catalog
            .find_by_version(manifest.version.to_string())
            .await?
            .is_some()
        {
            return Err(UpdateError::ConflictVersionExists(manifest.version));
        }

        let computed = Checksum::compute(&request.bytes);
        if let Some(supplied) = request.checksum.as_deref() {
            let supplied = Checksum::parse(supplied.trim())?;
            if supplied != computed {
                return Err(UpdateError::ChecksumMismatch { supplied, computed });
            }
        }

        let mut reader: &[u8] = &request.bytes;
        let stored = self.blobs.put(&mut reader).await.map_err(|e| {
            tracing::error!(version = %manifest.version, error = %e, "blob write failed");
            UpdateError::StorageWriteFailed(e)
        })?;

        let created_at = now();
        let mut metadata = manifest.metadata();
        if metadata.created_at.is_none() {
            metadata.created_at = Some(created_at.to_rfc3339());
        }

        let record = PackageRecord {
            id: PackageId::generate(),
            version: manifest.version,
            changelog: manifest.changelog,
            filename: request.filename,
            file_size: stored.size,
            blob_ref: stored.blob_ref.clone(),
            checksum: computed,
            active: true,
            minimum_client_version: manifest.minimum_client_version,
            metadata,
            created_at,
        };
        let info = record.info();

        match self.catalog.create(record).await {
            Ok(()) => {
                tracing::info!(
                    update_id = %info.id,
                    version = %info.version,
                    size = info.file_size,
                    checksum = %info.checksum,
                    "update published"
                );
                Ok(info)
            }
            Err(CatalogError::DuplicateVersion(version)) => {
                // Lost a race with a concurrent upload; this blob is unreferenced
                tracing::warn!(%version, "concurrent upload won the version");
                if let Err(e) = self.blobs.delete(&stored.blob_ref).await {
                    tracing::error!(
                        blob = %stored.blob_ref,
                        error = %e,
                        "failed to remove blob of rejected upload, left as orphan"
                    );
                }
                Err(UpdateError::ConflictVersionExists(version))
            }
            Err(e) => {
                tracing::error!(
                    blob = %stored.blob_ref,
                    version = %info.version,
                    error = %e,
                    "catalog write failed after blob write, orphan blob left"
                );
                Err(e.into())
            }
        }
    }

    /// Decide whether `tenant_id`, running `reported_version`, should update.
    ///
    /// # Errors
    ///
    /// Gating errors for unknown, inactive or unlicensed tenants, checked
    /// before the version; [`UpdateError::InvalidReportedVersion`] for an
    /// unparseable version. "No update" outcomes are not errors.
    pub async fn check_for_updates(
        &self,
        tenant_id: &str,
        reported_version: &str,
    ) -> Result<EligibilityDecision, UpdateError> {
        tracing::debug!(tenant = tenant_id, version = reported_version, "update check");

        match self.gate.tenant_status(tenant_id).await? {
            TenantStanding::Licensed => {}
            TenantStanding::UnknownTenant => {
                return Err(UpdateError::TenantNotFound(tenant_id.to_string()));
            }
            TenantStanding::Inactive => {
                return Err(UpdateError::TenantInactive(tenant_id.to_string()));
            }
            TenantStanding::NoActiveLicense => {
                return Err(UpdateError::NoActiveLicense(tenant_id.to_string()));
            }
            TenantStanding::LicenseExpired => {
                return Err(UpdateError::LicenseExpired(tenant_id.to_string()));
            }
        }

        let current =
            Version::parse(reported_version).map_err(UpdateError::InvalidReportedVersion)?;

        let Some(latest) = self.catalog.find_latest_active().await? else {
            return Ok(EligibilityDecision::Unavailable(WithheldUpdate {
                reason: WithheldReason::NoUpdatePublished,
                current_version: current,
                latest_version: None,
                minimum_client_version: None,
            }));
        };

        if !latest.version.is_newer_than(&current) {
            return Ok(EligibilityDecision::Unavailable(WithheldUpdate {
                reason: WithheldReason::AlreadyCurrent,
                current_version: current,
                latest_version: Some(latest.version),
                minimum_client_version: None,
            }));
        }

        if compare(&current, &latest.minimum_client_version).is_lt() {
            tracing::info!(
                tenant = tenant_id,
                current = %current,
                required = %latest.minimum_client_version,
                "client too old for latest update"
            );
            return Ok(EligibilityDecision::Unavailable(WithheldUpdate {
                reason: WithheldReason::ClientTooOld,
                current_version: current,
                latest_version: Some(latest.version),
                minimum_client_version: Some(latest.minimum_client_version),
            }));
        }

        tracing::info!(
            tenant = tenant_id,
            current = %current,
            latest = %latest.version,
            "update available"
        );
        Ok(EligibilityDecision::Available(AvailableUpdate {
            update_id: latest.id,
            current_version: current,
            latest_version: latest.version,
            changelog: latest.changelog,
            file_size: latest.file_size,
            checksum: latest.checksum,
            minimum_client_version: latest.minimum_client_version,
            breaking: latest.metadata.breaking,
            security_update: latest.metadata.security_update,
            created_at: latest.created_at,
        }))
    }

    /// Open an active package for streaming.
    ///
    /// # Errors
    ///
    /// [`UpdateError::NotFound`], [`UpdateError::PackageInactive`], or
    /// [`UpdateError::BlobMissing`] when the record's blob is gone.
    pub async fn download(&self, id: PackageId) -> Result<PackageDownload, UpdateError> {
        let record = self.catalog.find_by_id(id).await?;
        if !record.active {
            return Err(UpdateError::PackageInactive(id));
        }

        let stream = match self.blobs.get(&record.blob_ref).await {
            Ok(stream) => stream,
            Err(BlobError::NotFound(blob_ref)) => {
                tracing::error!(
                    update_id = %id,
                    version = %record.version,
                    blob = %blob_ref,
                    "catalog record points at a missing blob"
                );
                return Err(UpdateError::BlobMissing { id, blob_ref });
            }
            Err(e) => {
                tracing::error!(update_id = %id, error = %e, "blob read failed");
                return Err(UpdateError::Blob(e));
            }
        };

        tracing::info!(update_id = %id, version = %record.version, size = record.file_size, "download started");
        Ok(PackageDownload {
            stream,
            filename: record.filename,
            size: record.file_size,
            version: record.version,
            checksum: record.checksum,
            content_type: ARCHIVE_CONTENT_TYPE,
        })
    }

    /// Stop offering a package. Idempotent.
    ///
    /// # Errors
    ///
    /// [`UpdateError::Forbidden`] for non-publishers, [`UpdateError::NotFound`]
    /// for unknown ids.
    pub async fn deactivate(
        &self,
        caller: &Caller,
        id: PackageId,
    ) -> Result<PackageInfo, UpdateError> {
        require_publisher(caller, "deactivate updates")?;

        let record = self.catalog.deactivate(id).await?;
        tracing::info!(update_id = %id, version = %record.version, "update deactivated");
        Ok(record.info())
    }

    /// Remove a package and its archive. Returns the deleted version.
    ///
    /// # Errors
    ///
    /// [`UpdateError::Forbidden`] for non-publishers, [`UpdateError::NotFound`]
    /// for unknown ids. A missing or undeletable blob is logged, not returned.
    pub async fn delete(&self, caller: &Caller, id: PackageId) -> Result<Version, UpdateError> {
        require_publisher(caller, "delete updates")?;

        let record = self.catalog.find_by_id(id).await?;

        match self.blobs.delete(&record.blob_ref).await {
            Ok(()) => {}
            Err(BlobError::NotFound(blob)) => {
                tracing::warn!(update_id = %id, %blob, "blob already gone, deleting record anyway");
            }
            Err(e) => {
                tracing::error!(
                    update_id = %id,
                    blob = %record.blob_ref,
                    error = %e,
                    "blob delete failed, deleting record anyway"
                );
            }
        }

        self.catalog.delete(id).await?;
        tracing::info!(update_id = %id, version = %record.version, "update deleted");
        Ok(record.version)
    }

    /// A single record, active or not.
    ///
    /// # Errors
    ///
    /// [`UpdateError::Forbidden`] for node callers, [`UpdateError::NotFound`]
    /// for unknown ids.
    pub async fn get(&self, caller: &Caller, id: PackageId) -> Result<PackageInfo, UpdateError> {
        require_reader(caller, "read updates")?;
        Ok(self.catalog.find_by_id(id).await?.info())
    }

    /// Every record, newest first.
    ///
    /// # Errors
    ///
    /// [`UpdateError::Forbidden`] for node callers, or a catalog failure.
    pub async fn list(&self, caller: &Caller) -> Result<Vec<PackageInfo>, UpdateError> {
        require_reader(caller, "list updates")?;
        let records = self.catalog.list().await?;
        Ok(records.iter().map(PackageRecord::info).collect())
    }

    /// Sweep orphan blobs older than `grace` and report dangling records.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Forbidden`] for non-publishers, or the storage
    /// error if the blob store or catalog cannot be read.
    pub async fn reconcile(
        &self,
        caller: &Caller,
        dry_run: bool,
        grace: Duration,
    ) -> Result<ReconcileReport, UpdateError> {
        require_publisher(caller, "reconcile storage")?;
        reconcile::reconcile(&self.catalog, self.blobs.as_ref(), dry_run, grace).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::archive::write_archive;
    use crate::blob::FsBlobStore;
    use crate::caller::Role;
    use crate::catalog::Catalog;
    use crate::error::ErrorClass;
    use crate::gate::TenantRegistry;
    use crate::blob::{BlobRef, StoredBlob};
    use async_trait::async_trait;
    use std::io;
    use std::time::SystemTime;
    use tempfile::{TempDir, tempdir};
    use tokio::io::{AsyncRead, AsyncReadExt};
    use updist_schema::{MANIFEST_ENTRY, ManifestError, PackageMetadata};

    const TENANTS: &str = r#"
        [[tenants]]
        id = "acme"
        [[tenants.licenses]]
        status = "active"

        [[tenants]]
        id = "closed"
        active = false

        [[tenants]]
        id = "unlicensed"

        [[tenants]]
        id = "expired"
        [[tenants.licenses]]
        status = "active"
        expires_at = "2001-01-01T00:00:00Z"
    "#;

    pub(crate) struct Fixture {
        pub(crate) _dir: TempDir,
        pub(crate) service: UpdateService,
        pub(crate) blobs: Arc<FsBlobStore>,
        pub(crate) catalog: CatalogHandle,
    }

    pub(crate) async fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let blobs = Arc::new(FsBlobStore::open(dir.path().join("blobs")).await.unwrap());
        let catalog = CatalogHandle::spawn_with(Catalog::open_in_memory().unwrap());
        let gate = Arc::new(TenantRegistry::from_toml(TENANTS).unwrap());
        let service = UpdateService::new(catalog.clone(), blobs.clone(), gate);
        Fixture {
            _dir: dir,
            service,
            blobs,
            catalog,
        }
    }

    pub(crate) fn archive(version: &str, minimum: &str) -> Bytes {
        let manifest = format!(
            r#"{{"version":"{version}","changelog":"release {version}","minimumClientVersion":"{minimum}","securityUpdate":true}}"#
        );
        Bytes::from(
            write_archive([
                (MANIFEST_ENTRY, manifest.as_bytes()),
                ("app/server.js", b"console.log('hi')".as_slice()),
            ])
            .unwrap(),
        )
    }

    /// A record for `version` pointing at `blob_ref`, built outside the upload path.
    pub(crate) fn record_at(version: &str, blob_ref: BlobRef, file_size: u64) -> PackageRecord {
        PackageRecord {
            id: PackageId::generate(),
            version: Version::parse(version).unwrap(),
            changelog: format!("release {version}"),
            filename: format!("update-{version}.zip"),
            file_size,
            blob_ref,
            checksum: Checksum::compute(version.as_bytes()),
            active: true,
            minimum_client_version: Version::parse("1.0.0").unwrap(),
            metadata: PackageMetadata::default(),
            created_at: now(),
        }
    }

    /// Blob store whose disk is full.
    struct FullDisk;

    #[async_trait]
    impl BlobStore for FullDisk {
        async fn put(
            &self,
            _reader: &mut (dyn AsyncRead + Send + Unpin),
        ) -> Result<StoredBlob, BlobError> {
            Err(BlobError::Io(io::Error::other("no space left on device")))
        }

        async fn get(&self, blob: &BlobRef) -> Result<BlobStream, BlobError> {
            Err(BlobError::NotFound(blob.clone()))
        }

        async fn delete(&self, blob: &BlobRef) -> Result<(), BlobError> {
            Err(BlobError::NotFound(blob.clone()))
        }

        async fn list(&self) -> Result<Vec<BlobRef>, BlobError> {
            Ok(Vec::new())
        }

        async fn modified(&self, blob: &BlobRef) -> Result<SystemTime, BlobError> {
            Err(BlobError::NotFound(blob.clone()))
        }
    }

    /// Filesystem store that lets a competing upload claim `version` while
    /// each blob is being written.
    struct ContendedStore {
        inner: Arc<FsBlobStore>,
        catalog: CatalogHandle,
        version: &'static str,
    }

    #[async_trait]
    impl BlobStore for ContendedStore {
        async fn put(
            &self,
            reader: &mut (dyn AsyncRead + Send + Unpin),
        ) -> Result<StoredBlob, BlobError> {
            let stored = self.inner.put(reader).await?;
            let winner = record_at(self.version, BlobRef::generate(), 1);
            self.catalog.create(winner).await.unwrap();
            Ok(stored)
        }

        async fn get(&self, blob: &BlobRef) -> Result<BlobStream, BlobError> {
            self.inner.get(blob).await
        }

        async fn delete(&self, blob: &BlobRef) -> Result<(), BlobError> {
            self.inner.delete(blob).await
        }

        async fn list(&self) -> Result<Vec<BlobRef>, BlobError> {
            self.inner.list().await
        }

        async fn modified(&self, blob: &BlobRef) -> Result<SystemTime, BlobError> {
            self.inner.modified(blob).await
        }
    }

    pub(crate) fn upload_of(bytes: Bytes) -> UploadRequest {
        UploadRequest {
            filename: "update.zip".into(),
            bytes,
            checksum: None,
        }
    }

    fn admin() -> Caller {
        Caller::local_admin()
    }

    async fn read_stream(mut stream: BlobStream) -> Vec<u8> {
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn upload_then_download_roundtrips_bytes_and_checksum() {
        let fx = fixture().await;
        let bytes = archive("1.2.0", "1.0.0");

        let info = fx.service.upload(&admin(), upload_of(bytes.clone())).await.unwrap();
        assert_eq!(info.version, "1.2.0");
        assert_eq!(info.file_size, bytes.len() as u64);
        assert_eq!(info.checksum, Checksum::compute(&bytes));
        assert!(info.checksum.as_str().starts_with("sha256:"));
        assert!(info.active);
        assert!(info.metadata.security_update);
        assert!(info.metadata.created_at.is_some());

        let download = fx.service.download(info.id).await.unwrap();
        assert_eq!(download.size, bytes.len() as u64);
        assert_eq!(download.content_type, "application/zip");
        assert_eq!(download.checksum, info.checksum);
        let body = read_stream(download.stream).await;
        assert_eq!(Checksum::compute(&body), info.checksum);
        assert_eq!(body, bytes.as_ref());
    }

    #[tokio::test]
    async fn duplicate_version_conflicts_and_keeps_one_record() {
        let fx = fixture().await;
        fx.service
            .upload(&admin(), upload_of(archive("1.2.0", "1.0.0")))
            .await
            .unwrap();

        let err = fx
            .service
            .upload(&admin(), upload_of(archive("1.2.0", "1.1.0")))
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::ConflictVersionExists(ref v) if v == "1.2.0"));
        assert_eq!(err.class(), ErrorClass::Conflict);

        assert_eq!(fx.service.list(&admin()).await.unwrap().len(), 1);
        assert_eq!(fx.blobs.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_uploads_of_one_version_have_one_winner() {
        let fx = fixture().await;

        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let service = fx.service.clone();
                tokio::spawn(async move {
                    service
                        .upload(&Caller::local_admin(), upload_of(archive("4.0.0", "1.0.0")))
                        .await
                })
            })
            .collect();

        let mut winners = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => winners += 1,
                Err(UpdateError::ConflictVersionExists(_)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(fx.catalog.list().await.unwrap().len(), 1);
        assert_eq!(fx.blobs.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upload_rejects_non_zip_before_reading() {
        let fx = fixture().await;
        let mut request = upload_of(archive("1.0.0", "1.0.0"));
        request.filename = "update.tar.gz".into();
        assert!(matches!(
            fx.service.upload(&admin(), request).await,
            Err(UpdateError::InvalidFileType)
        ));

        let request = upload_of(Bytes::from_static(b"not a zip at all"));
        assert!(matches!(
            fx.service.upload(&admin(), request).await,
            Err(UpdateError::InvalidFileType)
        ));
        assert!(fx.blobs.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upload_propagates_manifest_errors() {
        let fx = fixture().await;
        let bytes = Bytes::from(write_archive([("readme.txt", b"hi".as_slice())]).unwrap());
        assert!(matches!(
            fx.service.upload(&admin(), upload_of(bytes)).await,
            Err(UpdateError::Manifest(ManifestError::Missing))
        ));
    }

    #[tokio::test]
    async fn supplied_checksum_must_match() {
        let fx = fixture().await;
        let bytes = archive("1.0.0", "1.0.0");

        let mut request = upload_of(bytes.clone());
        request.checksum = Some(Checksum::compute(b"other bytes").to_string());
        assert!(matches!(
            fx.service.upload(&admin(), request).await,
            Err(UpdateError::ChecksumMismatch { .. })
        ));

        let mut request = upload_of(bytes.clone());
        request.checksum = Some("md5:abc".into());
        assert!(matches!(
            fx.service.upload(&admin(), request).await,
            Err(UpdateError::InvalidChecksum(_))
        ));

        let mut request = upload_of(bytes.clone());
        request.checksum = Some(format!("sha256:{}", Checksum::compute(&bytes).hex().to_uppercase()));
        fx.service.upload(&admin(), request).await.unwrap();
    }

    #[tokio::test]
    async fn failed_blob_write_creates_no_record() {
        let catalog = CatalogHandle::spawn_with(Catalog::open_in_memory().unwrap());
        let gate = Arc::new(TenantRegistry::from_toml(TENANTS).unwrap());
        let service = UpdateService::new(catalog.clone(), Arc::new(FullDisk), gate);

        let err = service
            .upload(&admin(), upload_of(archive("1.0.0", "1.0.0")))
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::StorageWriteFailed(BlobError::Io(_))));
        assert_eq!(err.class(), ErrorClass::Storage);

        assert!(service.list(&admin()).await.unwrap().is_empty());
        assert!(catalog.find_by_version("1.0.0".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn version_claimed_mid_upload_conflicts_and_drops_blob() {
        let dir = tempdir().unwrap();
        let inner = Arc::new(FsBlobStore::open(dir.path().join("blobs")).await.unwrap());
        let catalog = CatalogHandle::spawn_with(Catalog::open_in_memory().unwrap());
        let store = Arc::new(ContendedStore {
            inner: inner.clone(),
            catalog: catalog.clone(),
            version: "2.0.0",
        });
        let gate = Arc::new(TenantRegistry::from_toml(TENANTS).unwrap());
        let service = UpdateService::new(catalog.clone(), store, gate);

        let err = service
            .upload(&admin(), upload_of(archive("2.0.0", "1.0.0")))
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::ConflictVersionExists(ref v) if v == "2.0.0"));
        assert_eq!(err.class(), ErrorClass::Conflict);

        // only the competing record remains, and the losing blob is gone
        let records = catalog.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file_size, 1);
        assert!(inner.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_catalog_write_leaves_orphan_for_reconcile() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("catalog.db");
        let blobs = Arc::new(FsBlobStore::open(dir.path().join("blobs")).await.unwrap());
        let catalog = CatalogHandle::spawn(&db_path).unwrap();
        let gate = Arc::new(TenantRegistry::from_toml(TENANTS).unwrap());
        let service = UpdateService::new(catalog.clone(), blobs.clone(), gate);

        // every insert now fails after the blob is already stored
        rusqlite::Connection::open(&db_path)
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER refuse_inserts BEFORE INSERT ON packages
                 BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END;",
            )
            .unwrap();

        let err = service
            .upload(&admin(), upload_of(archive("3.0.0", "1.0.0")))
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::Catalog(CatalogError::Sqlite(_))));
        assert_eq!(err.class(), ErrorClass::Storage);
        assert!(service.list(&admin()).await.unwrap().is_empty());

        let orphans = blobs.list().await.unwrap();
        assert_eq!(orphans.len(), 1);

        let report = service.reconcile(&admin(), true, Duration::ZERO).await.unwrap();
        assert_eq!(report.orphan_blobs, orphans);
        assert!(report.dangling_records.is_empty());

        let report = service.reconcile(&admin(), false, Duration::ZERO).await.unwrap();
        assert_eq!(report.removed, 1);
        assert!(blobs.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn roles_are_enforced() {
        let fx = fixture().await;
        let support = Caller::new(Role::Support);
        let node = Caller::new(Role::Node);

        let err = fx
            .service
            .upload(&support, upload_of(archive("1.0.0", "1.0.0")))
            .await
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::Forbidden);

        assert!(fx.service.list(&support).await.unwrap().is_empty());
        assert!(matches!(
            fx.service.list(&node).await,
            Err(UpdateError::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn eligibility_scenarios() {
        let fx = fixture().await;

        let decision = fx.service.check_for_updates("acme", "1.0.0").await.unwrap();
        assert_eq!(decision.reason(), Some(WithheldReason::NoUpdatePublished));

        let info = fx
            .service
            .upload(&admin(), upload_of(archive("1.2.0", "1.1.0")))
            .await
            .unwrap();

        // newer package, compatible client
        match fx.service.check_for_updates("acme", "1.1.5").await.unwrap() {
            EligibilityDecision::Available(update) => {
                assert_eq!(update.update_id, info.id);
                assert_eq!(update.latest_version, "1.2.0");
                assert_eq!(update.current_version, "1.1.5");
                assert!(update.security_update);
            }
            other => panic!("expected an update, got {other:?}"),
        }

        // already on it, or ahead of it
        for current in ["1.2.0", "1.2.0-beta", "1.3.0"] {
            let decision = fx.service.check_for_updates("acme", current).await.unwrap();
            assert_eq!(decision.reason(), Some(WithheldReason::AlreadyCurrent), "{current}");
        }

        // client below the minimum
        match fx.service.check_for_updates("acme", "1.0.0").await.unwrap() {
            EligibilityDecision::Unavailable(w) => {
                assert_eq!(w.reason, WithheldReason::ClientTooOld);
                assert_eq!(w.minimum_client_version.unwrap(), "1.1.0");
                assert_eq!(w.latest_version.unwrap(), "1.2.0");
            }
            other => panic!("expected client-too-old, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn client_exactly_at_minimum_is_eligible() {
        let fx = fixture().await;
        let info = fx
            .service
            .upload(&admin(), upload_of(archive("1.2.0", "1.0.0")))
            .await
            .unwrap();

        match fx.service.check_for_updates("acme", "1.0.0").await.unwrap() {
            EligibilityDecision::Available(update) => {
                assert_eq!(update.update_id, info.id);
                assert_eq!(update.current_version, "1.0.0");
                assert_eq!(update.latest_version, "1.2.0");
                assert_eq!(update.minimum_client_version, "1.0.0");
            }
            other => panic!("expected an update, got {other:?}"),
        }

        // one step below the minimum is withheld
        fx.service
            .upload(&admin(), upload_of(archive("1.3.0", "1.0.1")))
            .await
            .unwrap();
        let decision = fx.service.check_for_updates("acme", "1.0.0").await.unwrap();
        assert_eq!(decision.reason(), Some(WithheldReason::ClientTooOld));
    }

    #[tokio::test]
    async fn version_comparison_is_numeric() {
        let fx = fixture().await;
        fx.service
            .upload(&admin(), upload_of(archive("1.10.0", "1.0.0")))
            .await
            .unwrap();

        let decision = fx.service.check_for_updates("acme", "1.9.0").await.unwrap();
        assert!(decision.is_available());
    }

    #[tokio::test]
    async fn gating_failures_are_terminal() {
        let fx = fixture().await;
        fx.service
            .upload(&admin(), upload_of(archive("2.0.0", "1.0.0")))
            .await
            .unwrap();

        let cases = [
            ("ghost", "TenantNotFound"),
            ("closed", "TenantInactive"),
            ("unlicensed", "NoActiveLicense"),
            ("expired", "LicenseExpired"),
        ];
        for (tenant, expected) in cases {
            let err = fx.service.check_for_updates(tenant, "1.0.0").await.unwrap_err();
            assert_eq!(err.class(), ErrorClass::Gating, "{tenant}");
            let matched = match &err {
                UpdateError::TenantNotFound(_) => "TenantNotFound",
                UpdateError::TenantInactive(_) => "TenantInactive",
                UpdateError::NoActiveLicense(_) => "NoActiveLicense",
                UpdateError::LicenseExpired(_) => "LicenseExpired",
                _ => "other",
            };
            assert_eq!(matched, expected);
        }
    }

    #[tokio::test]
    async fn reported_version_must_be_valid() {
        let fx = fixture().await;
        assert!(matches!(
            fx.service.check_for_updates("acme", "latest").await,
            Err(UpdateError::InvalidReportedVersion(_))
        ));
    }

    #[tokio::test]
    async fn deactivated_package_is_kept_but_not_served() {
        let fx = fixture().await;
        let old = fx
            .service
            .upload(&admin(), upload_of(archive("1.0.0", "1.0.0")))
            .await
            .unwrap();
        let new = fx
            .service
            .upload(&admin(), upload_of(archive("1.1.0", "1.0.0")))
            .await
            .unwrap();

        let info = fx.service.deactivate(&admin(), new.id).await.unwrap();
        assert!(!info.active);
        // idempotent
        assert!(!fx.service.deactivate(&admin(), new.id).await.unwrap().active);

        assert!(matches!(
            fx.service.download(new.id).await,
            Err(UpdateError::PackageInactive(_))
        ));
        assert!(!fx.catalog.find_by_id(new.id).await.unwrap().active);

        // the older active package is the target again
        match fx.service.check_for_updates("acme", "0.9.0").await.unwrap() {
            EligibilityDecision::Available(update) => assert_eq!(update.update_id, old.id),
            other => panic!("expected old package, got {other:?}"),
        }

        // and re-uploading the deactivated version is still a conflict
        assert!(matches!(
            fx.service
                .upload(&admin(), upload_of(archive("1.1.0", "1.0.0")))
                .await,
            Err(UpdateError::ConflictVersionExists(_))
        ));
    }

    #[tokio::test]
    async fn delete_removes_blob_and_record() {
        let fx = fixture().await;
        let info = fx
            .service
            .upload(&admin(), upload_of(archive("1.0.0", "1.0.0")))
            .await
            .unwrap();

        let version = fx.service.delete(&admin(), info.id).await.unwrap();
        assert_eq!(version, "1.0.0");

        assert!(fx.blobs.list().await.unwrap().is_empty());
        assert!(matches!(
            fx.service.download(info.id).await,
            Err(UpdateError::NotFound(_))
        ));
        assert!(matches!(
            fx.service.delete(&admin(), info.id).await,
            Err(UpdateError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_tolerates_missing_blob_and_download_reports_it() {
        let fx = fixture().await;
        let info = fx
            .service
            .upload(&admin(), upload_of(archive("1.0.0", "1.0.0")))
            .await
            .unwrap();

        let record = fx.catalog.find_by_id(info.id).await.unwrap();
        fx.blobs.delete(&record.blob_ref).await.unwrap();

        let err = fx.service.download(info.id).await.unwrap_err();
        assert!(matches!(err, UpdateError::BlobMissing { .. }));
        assert_eq!(err.class(), ErrorClass::Storage);

        fx.service.delete(&admin(), info.id).await.unwrap();
        assert!(fx.catalog.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_and_get_include_inactive() {
        let fx = fixture().await;
        let a = fx
            .service
            .upload(&admin(), upload_of(archive("1.0.0", "1.0.0")))
            .await
            .unwrap();
        let b = fx
            .service
            .upload(&admin(), upload_of(archive("1.1.0", "1.0.0")))
            .await
            .unwrap();
        fx.service.deactivate(&admin(), a.id).await.unwrap();

        let listed = fx.service.list(&admin()).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);

        let got = fx.service.get(&Caller::new(Role::Support), a.id).await.unwrap();
        assert!(!got.active);
    }
}
