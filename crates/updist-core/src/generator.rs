//! Package generator
//!
//! Builds an update archive from a manifest and a snapshot of the exercise
//! catalog, then publishes it through the regular upload path so generated
//! packages get exactly the same validation and conflict handling.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use updist_schema::{Checksum, EXERCISES_ENTRY, MANIFEST_ENTRY, ManifestDraft, PackageInfo};

use crate::archive::write_archive;
use crate::caller::Caller;
use crate::error::UpdateError;
use crate::exercises::{ExerciseExporter, ExportSnapshot};
use crate::service::{UpdateService, UploadRequest};

/// Minimum client version used when the request leaves it out.
pub const DEFAULT_MINIMUM_CLIENT_VERSION: &str = "1.0.0";

/// Parameters for a generated package.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Version to publish.
    pub version: String,
    /// Release notes; must not be blank.
    #[serde(default)]
    pub changelog: String,
    /// Defaults to [`DEFAULT_MINIMUM_CLIENT_VERSION`].
    #[serde(default)]
    pub minimum_client_version: Option<String>,
    /// Report exercise deletions newer than this.
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
}

/// A published generated package.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPackage {
    /// Receipt of the upload.
    pub package: PackageInfo,
    /// Exercises bundled.
    pub exercise_count: usize,
    /// Deletions reported.
    pub deletion_count: usize,
    /// Pass as `since` on the next generation.
    pub snapshot_timestamp: DateTime<Utc>,
}

/// Builds update archives from the exercise catalog and publishes them
/// through [`UpdateService::upload`].
pub struct PackageGenerator {
    service: UpdateService,
    exporter: Arc<dyn ExerciseExporter>,
}

impl fmt::Debug for PackageGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageGenerator").finish_non_exhaustive()
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Serialize the manifest and snapshot into an archive.
///
/// # Errors
///
/// Returns [`UpdateError::ArchiveBuild`] if serialization or zip writing fails.
pub fn build_archive(
    draft: &ManifestDraft,
    snapshot: &ExportSnapshot,
) -> Result<Vec<u8>, UpdateError> {
    let to_io = |e: serde_json::Error| UpdateError::ArchiveBuild(std::io::Error::from(e).into());
    let manifest = serde_json::to_vec_pretty(draft).map_err(to_io)?;
    let exercises = serde_json::to_vec_pretty(snapshot).map_err(to_io)?;

    Ok(write_archive([
        (MANIFEST_ENTRY, manifest.as_slice()),
        (EXERCISES_ENTRY, exercises.as_slice()),
    ])?)
}

impl PackageGenerator {
    /// Generator publishing through `service` with snapshots from `exporter`.
    pub fn new(service: UpdateService, exporter: Arc<dyn ExerciseExporter>) -> Self {
        Self { service, exporter }
    }

    /// Build and publish `update-<version>.zip`.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Forbidden`] for non-publishers, a collaborator
    /// error if the export fails, and any upload error, e.g. a blank
    /// changelog or an existing version.
    pub async fn generate(
        &self,
        caller: &Caller,
        request: GenerateRequest,
    ) -> Result<GeneratedPackage, UpdateError> {
        if !caller.role.can_publish() {
            return Err(UpdateError::Forbidden {
                role: caller.role,
                action: "generate updates",
            });
        }

        let draft = ManifestDraft {
            version: non_empty(&request.version),
            changelog: non_empty(&request.changelog),
            minimum_client_version: request
                .minimum_client_version
                .as_deref()
                .and_then(non_empty)
                .or_else(|| Some(DEFAULT_MINIMUM_CLIENT_VERSION.to_string())),
            created_at: Some(Utc::now().to_rfc3339()),
            ..ManifestDraft::default()
        };

        let snapshot = self.exporter.export_snapshot(request.since).await?;
        let bytes = build_archive(&draft, &snapshot)?;
        let checksum = Checksum::compute(&bytes);

        tracing::info!(
            version = %request.version.trim(),
            exercises = snapshot.items.len(),
            deletions = snapshot.deleted_ids.len(),
            size = bytes.len(),
            "generated update archive"
        );

        let package = self
            .service
            .upload(
                caller,
                UploadRequest {
                    filename: format!("update-{}.zip", request.version.trim()),
                    bytes: Bytes::from(bytes),
                    checksum: Some(checksum.to_string()),
                },
            )
            .await?;

        Ok(GeneratedPackage {
            package,
            exercise_count: snapshot.items.len(),
            deletion_count: snapshot.deleted_ids.len(),
            snapshot_timestamp: snapshot.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::read_manifest;
    use crate::caller::Role;
    use crate::exercises::{ExerciseCatalog, ExerciseItem, Tombstone};
    use crate::service::tests::fixture;
    use std::io::{Cursor, Read};
    use tokio::io::AsyncReadExt;
    use updist_schema::ManifestError;

    fn exporter() -> Arc<ExerciseCatalog> {
        Arc::new(ExerciseCatalog {
            items: vec![ExerciseItem {
                id: "ex-1".into(),
                topic: "phishing".into(),
                kind: "quiz".into(),
                difficulty: "beginner".into(),
                payload: serde_json::json!({"q": 1}),
                version: "1.0.0".into(),
                active: true,
            }],
            tombstones: vec![Tombstone {
                id: "gone".into(),
                deleted_at: "2026-01-01T00:00:00Z".parse().unwrap(),
            }],
        })
    }

    fn request(version: &str, changelog: &str) -> GenerateRequest {
        GenerateRequest {
            version: version.into(),
            changelog: changelog.into(),
            ..GenerateRequest::default()
        }
    }

    #[tokio::test]
    async fn generated_package_is_published_with_exercises() {
        let fx = fixture().await;
        let generator = PackageGenerator::new(fx.service.clone(), exporter());
        let admin = Caller::local_admin();

        let generated = generator
            .generate(&admin, request("2.0.0", "new exercises"))
            .await
            .unwrap();
        assert_eq!(generated.package.version, "2.0.0");
        assert_eq!(generated.package.filename, "update-2.0.0.zip");
        assert_eq!(generated.package.minimum_client_version, "1.0.0");
        assert_eq!(generated.exercise_count, 1);
        assert_eq!(generated.deletion_count, 1);

        let mut download = fx.service.download(generated.package.id).await.unwrap();
        let mut bytes = Vec::new();
        download.stream.read_to_end(&mut bytes).await.unwrap();
        assert_eq!(Checksum::compute(&bytes), generated.package.checksum);
        assert_eq!(read_manifest(&bytes).unwrap().changelog, "new exercises");

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut exercises = String::new();
        archive
            .by_name(EXERCISES_ENTRY)
            .unwrap()
            .read_to_string(&mut exercises)
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&exercises).unwrap();
        assert_eq!(value["exercises"][0]["centralId"], "ex-1");
        assert_eq!(value["deletions"][0], "gone");
    }

    #[tokio::test]
    async fn since_cursor_limits_deletions() {
        let fx = fixture().await;
        let generator = PackageGenerator::new(fx.service.clone(), exporter());

        let mut req = request("2.1.0", "notes");
        req.since = Some("2026-06-01T00:00:00Z".parse().unwrap());
        let generated = generator
            .generate(&Caller::local_admin(), req)
            .await
            .unwrap();
        assert_eq!(generated.deletion_count, 0);
    }

    #[tokio::test]
    async fn missing_changelog_fails_validation() {
        let fx = fixture().await;
        let generator = PackageGenerator::new(fx.service.clone(), exporter());

        let err = generator
            .generate(&Caller::local_admin(), request("3.0.0", "   "))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UpdateError::Manifest(ManifestError::Invalid { field: "changelog", .. })
        ));
        assert!(fx.catalog.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn generated_versions_conflict_like_uploads() {
        let fx = fixture().await;
        let generator = PackageGenerator::new(fx.service.clone(), exporter());
        let admin = Caller::local_admin();

        generator.generate(&admin, request("1.0.0", "a")).await.unwrap();
        assert!(matches!(
            generator.generate(&admin, request("1.0.0", "b")).await,
            Err(UpdateError::ConflictVersionExists(_))
        ));
    }

    #[tokio::test]
    async fn support_cannot_generate() {
        let fx = fixture().await;
        let generator = PackageGenerator::new(fx.service.clone(), exporter());
        assert!(matches!(
            generator
                .generate(&Caller::new(Role::Support), request("1.0.0", "a"))
                .await,
            Err(UpdateError::Forbidden { .. })
        ));
    }
}
