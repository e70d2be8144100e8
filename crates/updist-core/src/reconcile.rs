//! Out-of-band storage reconciliation.
//!
//! Finds blobs no record points at (left by a catalog write that failed
//! after the blob write) and records whose blob is gone. An upload in flight
//! has its blob written before its record, so unreferenced blobs younger
//! than the grace period are reported but never deleted.

use std::collections::BTreeSet;
use std::time::{Duration, SystemTime};

use updist_schema::{PackageId, Version};

use crate::blob::{BlobError, BlobRef, BlobStore};
use crate::catalog::CatalogHandle;
use crate::error::UpdateError;

/// Default age an unreferenced blob must reach before it counts as an orphan.
pub const DEFAULT_ORPHAN_GRACE: Duration = Duration::from_secs(60 * 60);

/// What a sweep found, and what it removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Blobs without a catalog record, older than the grace period.
    pub orphan_blobs: Vec<BlobRef>,
    /// Unreferenced blobs still inside the grace period; possibly an upload in flight.
    pub recent_blobs: Vec<BlobRef>,
    /// Records whose blob is missing.
    pub dangling_records: Vec<(PackageId, Version)>,
    /// Orphan blobs actually deleted (zero on a dry run).
    pub removed: usize,
}

impl ReconcileReport {
    /// No orphans past the grace period and no dangling records.
    pub fn is_clean(&self) -> bool {
        self.orphan_blobs.is_empty() && self.dangling_records.is_empty()
    }
}

/// Compare the blob store against the catalog, deleting orphan blobs unless `dry_run`.
///
/// Unreferenced blobs modified within `grace` are left alone. Dangling
/// records are only reported; deleting them is an operator decision.
///
/// # Errors
///
/// Returns [`UpdateError::Blob`] if the store cannot be listed, or a catalog
/// error if the records cannot be read. Failures to delete a single orphan
/// are logged and skipped.
pub async fn reconcile(
    catalog: &CatalogHandle,
    blobs: &dyn BlobStore,
    dry_run: bool,
    grace: Duration,
) -> Result<ReconcileReport, UpdateError> {
    let stored: BTreeSet<BlobRef> = blobs
        .list()
        .await
        .map_err(UpdateError::Blob)?
        .into_iter()
        .collect();
    let referenced: BTreeSet<BlobRef> = catalog.blob_refs().await?.into_iter().collect();

    let mut report = ReconcileReport::default();
    let now = SystemTime::now();

    for blob in stored.difference(&referenced) {
        match blobs.modified(blob).await {
            Ok(modified) => {
                // a clock step backwards reads as age zero
                let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
                if age < grace {
                    tracing::debug!(%blob, age_secs = age.as_secs(), "unreferenced blob inside grace period");
                    report.recent_blobs.push(blob.clone());
                } else {
                    report.orphan_blobs.push(blob.clone());
                }
            }
            Err(BlobError::NotFound(_)) => {}
            Err(e) => {
                tracing::error!(%blob, error = %e, "cannot read blob age, leaving it");
                report.recent_blobs.push(blob.clone());
            }
        }
    }

    // Re-read after the age check so a record created meanwhile protects its blob
    let referenced: BTreeSet<BlobRef> = catalog.blob_refs().await?.into_iter().collect();
    report.orphan_blobs.retain(|blob| !referenced.contains(blob));

    for record in catalog.list().await? {
        if !stored.contains(&record.blob_ref) {
            tracing::warn!(
                update_id = %record.id,
                version = %record.version,
                blob = %record.blob_ref,
                "record points at a missing blob"
            );
            report.dangling_records.push((record.id, record.version));
        }
    }

    for orphan in &report.orphan_blobs {
        if dry_run {
            tracing::info!(blob = %orphan, "orphan blob (dry run)");
            continue;
        }
        match blobs.delete(orphan).await {
            Ok(()) | Err(BlobError::NotFound(_)) => {
                tracing::info!(blob = %orphan, "removed orphan blob");
                report.removed += 1;
            }
            Err(e) => {
                tracing::error!(blob = %orphan, error = %e, "failed to remove orphan blob");
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caller::Caller;
    use crate::service::tests::{archive, fixture, record_at, upload_of};
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn finds_and_removes_orphans() {
        let fx = fixture().await;
        let admin = Caller::local_admin();
        fx.service
            .upload(&admin, upload_of(archive("1.0.0", "1.0.0")))
            .await
            .unwrap();
        let orphan = fx.blobs.put(&mut b"stray".as_slice()).await.unwrap();

        let report = fx.service.reconcile(&admin, true, Duration::ZERO).await.unwrap();
        assert_eq!(report.orphan_blobs, vec![orphan.blob_ref.clone()]);
        assert_eq!(report.removed, 0);
        assert_eq!(fx.blobs.list().await.unwrap().len(), 2);

        let report = fx.service.reconcile(&admin, false, Duration::ZERO).await.unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(fx.blobs.list().await.unwrap().len(), 1);
        assert!(
            fx.service
                .reconcile(&admin, false, Duration::ZERO)
                .await
                .unwrap()
                .is_clean()
        );
    }

    #[tokio::test]
    async fn blob_written_before_its_record_survives_clean() {
        let fx = fixture().await;
        let admin = Caller::local_admin();

        // an upload has stored its blob but not yet created the record
        let stored = fx.blobs.put(&mut b"payload".as_slice()).await.unwrap();

        let report = fx
            .service
            .reconcile(&admin, false, DEFAULT_ORPHAN_GRACE)
            .await
            .unwrap();
        assert!(report.orphan_blobs.is_empty());
        assert_eq!(report.recent_blobs, vec![stored.blob_ref.clone()]);
        assert_eq!(report.removed, 0);
        assert!(report.is_clean());

        let record = record_at("9.0.0", stored.blob_ref, stored.size);
        let id = record.id;
        fx.catalog.create(record).await.unwrap();

        let download = fx.service.download(id).await.unwrap();
        let mut body = Vec::new();
        let mut stream = download.stream;
        stream.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"payload");
    }

    #[tokio::test]
    async fn reports_dangling_records() {
        let fx = fixture().await;
        let admin = Caller::local_admin();
        let info = fx
            .service
            .upload(&admin, upload_of(archive("2.0.0", "1.0.0")))
            .await
            .unwrap();
        let record = fx.catalog.find_by_id(info.id).await.unwrap();
        fx.blobs.delete(&record.blob_ref).await.unwrap();

        let report = fx.service.reconcile(&admin, false, Duration::ZERO).await.unwrap();
        assert_eq!(report.dangling_records.len(), 1);
        assert_eq!(report.dangling_records[0].0, info.id);
        assert!(report.orphan_blobs.is_empty());
    }
}
