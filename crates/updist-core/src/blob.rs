//! Blob storage for update archives
//!
//! Archives are opaque byte streams addressed by a reference the store picks
//! at write time. The filesystem store shards them under a 2-char prefix
//! directory, like a content-addressed store, but the reference is random:
//! two uploads of identical bytes are two independent blobs, each owned by
//! exactly one catalog record.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::SystemTime;

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncRead;
use uuid::Uuid;

use crate::paths;

/// Blob store failure.
#[derive(Error, Debug)]
pub enum BlobError {
    /// No blob exists under this reference.
    #[error("blob not found: {0}")]
    NotFound(BlobRef),

    /// Underlying storage failed.
    #[error("blob I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Store-assigned blob reference. Meaningless outside the record that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobRef(String);

impl BlobRef {
    /// A fresh random reference (32 lowercase hex chars).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// The reference as stored in the catalog.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_well_formed(&self) -> bool {
        self.0.len() == 32
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

impl From<String> for BlobRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a successful [`BlobStore::put`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Reference to hand to `get`/`delete`.
    pub blob_ref: BlobRef,
    /// Number of bytes written.
    pub size: u64,
}

/// Sequential reader over a stored blob. Dropping it releases the handle.
pub type BlobStream = Pin<Box<dyn AsyncRead + Send>>;

/// Durable storage for archive bytes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist everything `reader` yields. Atomic from the caller's view: on
    /// error nothing is retrievable.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::Io`] if the bytes cannot be written.
    async fn put(&self, reader: &mut (dyn AsyncRead + Send + Unpin))
    -> Result<StoredBlob, BlobError>;

    /// Open a blob for streaming.
    ///
    /// # Errors
    ///
    /// [`BlobError::NotFound`] for unknown references.
    async fn get(&self, blob: &BlobRef) -> Result<BlobStream, BlobError>;

    /// Remove a blob.
    ///
    /// # Errors
    ///
    /// [`BlobError::NotFound`] for unknown references.
    async fn delete(&self, blob: &BlobRef) -> Result<(), BlobError>;

    /// Enumerate every stored blob.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::Io`] if the store cannot be read.
    async fn list(&self) -> Result<Vec<BlobRef>, BlobError>;

    /// When the blob was last written.
    ///
    /// # Errors
    ///
    /// [`BlobError::NotFound`] for unknown references.
    async fn modified(&self, blob: &BlobRef) -> Result<SystemTime, BlobError>;
}

/// Filesystem blob store: `<root>/<ab>/<abcdef...>`, staging in `<root>/tmp`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the root or its staging directory cannot be created.
    pub async fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(paths::staging_dir(&root)).await?;
        Ok(Self { root })
    }

    /// Store root.
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Path of a blob, or `None` for references this store never issues.
    fn blob_path(&self, blob: &BlobRef) -> Option<PathBuf> {
        blob.is_well_formed()
            .then(|| self.root.join(&blob.0[..2]).join(&blob.0))
    }

    async fn write_staged(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        staging: &std::path::Path,
        dest: &std::path::Path,
    ) -> io::Result<u64> {
        let mut file = File::create(staging).await?;
        let size = tokio::io::copy(reader, &mut file).await?;
        file.sync_all().await?;
        drop(file);

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(staging, dest).await?;
        Ok(size)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<StoredBlob, BlobError> {
        let blob_ref = BlobRef::generate();
        let dest = self
            .blob_path(&blob_ref)
            .ok_or_else(|| BlobError::NotFound(blob_ref.clone()))?;
        let staging = paths::staging_dir(&self.root).join(format!("{blob_ref}.partial"));

        match self.write_staged(reader, &staging, &dest).await {
            Ok(size) => {
                tracing::debug!(blob = %blob_ref, size, "blob stored");
                Ok(StoredBlob { blob_ref, size })
            }
            Err(e) => {
                let _ = fs::remove_file(&staging).await;
                Err(e.into())
            }
        }
    }

    async fn get(&self, blob: &BlobRef) -> Result<BlobStream, BlobError> {
        let path = self
            .blob_path(blob)
            .ok_or_else(|| BlobError::NotFound(blob.clone()))?;

        match File::open(&path).await {
            Ok(file) => Ok(Box::pin(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BlobError::NotFound(blob.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, blob: &BlobRef) -> Result<(), BlobError> {
        let path = self
            .blob_path(blob)
            .ok_or_else(|| BlobError::NotFound(blob.clone()))?;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BlobError::NotFound(blob.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<BlobRef>, BlobError> {
        let mut refs = Vec::new();
        let mut shards = fs::read_dir(&self.root).await?;

        while let Some(shard) = shards.next_entry().await? {
            let name = shard.file_name();
            let Some(prefix) = name.to_str() else { continue };
            if prefix.len() != 2 || !shard.file_type().await?.is_dir() {
                continue;
            }

            let mut entries = fs::read_dir(shard.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                let Ok(name) = entry.file_name().into_string() else {
                    continue;
                };
                let candidate = BlobRef(name);
                if candidate.is_well_formed() && candidate.0.starts_with(prefix) {
                    refs.push(candidate);
                }
            }
        }

        refs.sort();
        Ok(refs)
    }

    async fn modified(&self, blob: &BlobRef) -> Result<SystemTime, BlobError> {
        let path = self
            .blob_path(blob)
            .ok_or_else(|| BlobError::NotFound(blob.clone()))?;

        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.modified()?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BlobError::NotFound(blob.clone())),
            Err(e) => Err(e.into()),
        }
    }
}
