//! Exercise catalog export
//!
//! Generated update packages bundle a snapshot of the exercise catalog as
//! `exercises.json`. Deletions are reported as tombstones newer than a
//! caller-supplied `since` cursor; each snapshot's timestamp is the cursor
//! for the next one, so no export ever mutates shared state.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The exercise catalog could not be exported.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Catalog file exists but cannot be read.
    #[error("failed to read exercise catalog {path}: {source}")]
    Io {
        /// Catalog file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Catalog file is not valid JSON.
    #[error("failed to parse exercise catalog {path}: {source}")]
    Parse {
        /// Catalog file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// One exercise as shipped to nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseItem {
    /// Central catalog id.
    #[serde(rename = "centralId", alias = "id")]
    pub id: String,
    /// Training topic.
    pub topic: String,
    /// Exercise type, e.g. `quiz`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Difficulty label.
    pub difficulty: String,
    /// Type-specific content, passed through untouched.
    #[serde(rename = "payloadJSON", alias = "payload", default)]
    pub payload: serde_json::Value,
    /// Content version of this exercise.
    #[serde(default = "default_item_version")]
    pub version: String,
    /// Inactive items are left out of snapshots.
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_item_version() -> String {
    "1.0.0".to_string()
}

fn default_true() -> bool {
    true
}

/// A deleted exercise and when it was deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    /// Deleted exercise id.
    pub id: String,
    /// Deletion time.
    pub deleted_at: DateTime<Utc>,
}

/// Point-in-time export, serialized verbatim into `exercises.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSnapshot {
    /// `YYYYMMDD.HHMMSSmmm` of the export time; fixed width, so it sorts.
    #[serde(rename = "version")]
    pub export_version: String,
    /// Export time; pass it as `since` next time.
    pub timestamp: DateTime<Utc>,
    /// Active exercises.
    #[serde(rename = "exercises")]
    pub items: Vec<ExerciseItem>,
    /// Ids deleted after the requested cursor.
    #[serde(rename = "deletions")]
    pub deleted_ids: Vec<String>,
}

/// Source of exercise snapshots for the package generator.
#[async_trait]
pub trait ExerciseExporter: Send + Sync {
    /// Active items now, plus ids deleted after `since`.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError`] when the catalog source cannot be read.
    async fn export_snapshot(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<ExportSnapshot, ExportError>;
}

/// In-memory exercise catalog: items plus timestamped tombstones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExerciseCatalog {
    /// Every exercise, active or not.
    #[serde(default, alias = "exercises")]
    pub items: Vec<ExerciseItem>,
    /// Deletion history.
    #[serde(default, alias = "deletions")]
    pub tombstones: Vec<Tombstone>,
}

impl ExerciseCatalog {
    /// Snapshot at `now`: every active item, and tombstones strictly newer than `since`.
    pub fn snapshot(&self, since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> ExportSnapshot {
        let items: Vec<_> = self.items.iter().filter(|i| i.active).cloned().collect();
        let deleted_ids = self
            .tombstones
            .iter()
            .filter(|t| since.is_none_or(|cursor| t.deleted_at > cursor))
            .map(|t| t.id.clone())
            .collect();

        ExportSnapshot {
            export_version: now.format("%Y%m%d.%H%M%S%3f").to_string(),
            timestamp: now,
            items,
            deleted_ids,
        }
    }
}

#[async_trait]
impl ExerciseExporter for ExerciseCatalog {
    async fn export_snapshot(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<ExportSnapshot, ExportError> {
        Ok(self.snapshot(since, Utc::now()))
    }
}

/// Exporter reading a JSON catalog file on every export. A missing file is
/// an empty catalog.
#[derive(Debug, Clone)]
pub struct FileExerciseExporter {
    path: PathBuf,
}

impl FileExerciseExporter {
    /// Exporter over the catalog file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<ExerciseCatalog, ExportError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ExerciseCatalog::default()),
            Err(source) => {
                return Err(ExportError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_slice(&bytes).map_err(|source| ExportError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

#[async_trait]
impl ExerciseExporter for FileExerciseExporter {
    async fn export_snapshot(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<ExportSnapshot, ExportError> {
        let catalog = self.load().await?;
        let snapshot = catalog.snapshot(since, Utc::now());
        tracing::info!(
            items = snapshot.items.len(),
            deletions = snapshot.deleted_ids.len(),
            export_version = %snapshot.export_version,
            "exported exercise catalog"
        );
        Ok(snapshot)
    }
}
