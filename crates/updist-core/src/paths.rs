//! On-disk layout under the service home.

use dirs::home_dir;
use std::path::{Path, PathBuf};

/// `~/.updist`, or None if the user's home cannot be resolved.
///
/// An explicit `UPDIST_HOME` is resolved by [`crate::config::ServiceConfig`].
pub fn default_updist_home() -> Option<PathBuf> {
    home_dir().map(|h| h.join(".updist"))
}

/// `SQLite` catalog path: <home>/catalog.db
pub fn catalog_path(home: &Path) -> PathBuf {
    home.join("catalog.db")
}

/// Blob store root: <home>/blobs
pub fn blob_root(home: &Path) -> PathBuf {
    home.join("blobs")
}

/// Tenant registry: <home>/tenants.toml
pub fn registry_path(home: &Path) -> PathBuf {
    home.join("tenants.toml")
}

/// Exercise catalog: <home>/exercises.json
pub fn exercises_path(home: &Path) -> PathBuf {
    home.join("exercises.json")
}

/// Blob staging area: <blob root>/tmp (same volume as the blobs, so rename is atomic)
pub fn staging_dir(blob_root: &Path) -> PathBuf {
    blob_root.join("tmp")
}
