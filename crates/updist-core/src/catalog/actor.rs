//! Catalog Actor - Thread-safe access to SQLite
//!
//! `SQLite` connections are not `Sync`, so the catalog lives on a dedicated
//! background thread and async callers talk to it by message passing. The
//! actor serializes statements but keeps no state between requests.

use std::fmt;
use std::path::Path;
use std::sync::mpsc;
use std::thread;

use tokio::sync::oneshot;
use updist_schema::PackageId;

use super::db::Catalog;
use super::{CatalogError, PackageRecord};
use crate::blob::BlobRef;

type Reply<T> = oneshot::Sender<Result<T, CatalogError>>;

/// Requests understood by the catalog actor
///
/// Every request carries a `resp` channel for its reply.
pub enum CatalogEvent {
    /// Insert a new record
    Create {
        /// Record to insert
        record: Box<PackageRecord>,
        /// Reply channel
        resp: Reply<()>,
    },
    /// Look a record up by exact version string
    FindByVersion {
        /// Version string, compared exactly
        version: String,
        /// Reply channel
        resp: Reply<Option<PackageRecord>>,
    },
    /// Newest active record
    FindLatestActive {
        /// Reply channel
        resp: Reply<Option<PackageRecord>>,
    },
    /// Look a record up by id
    FindById {
        /// Record id
        id: PackageId,
        /// Reply channel
        resp: Reply<PackageRecord>,
    },
    /// All records, newest first
    List {
        /// Reply channel
        resp: Reply<Vec<PackageRecord>>,
    },
    /// Mark a record inactive
    Deactivate {
        /// Record id
        id: PackageId,
        /// Reply channel
        resp: Reply<PackageRecord>,
    },
    /// Remove a record
    Delete {
        /// Record id
        id: PackageId,
        /// Reply channel
        resp: Reply<()>,
    },
    /// Every referenced blob
    BlobRefs {
        /// Reply channel
        resp: Reply<Vec<BlobRef>>,
    },
}

impl fmt::Debug for CatalogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create { record, .. } => f
                .debug_struct("Create")
                .field("version", &record.version)
                .finish_non_exhaustive(),
            Self::FindByVersion { version, .. } => f
                .debug_struct("FindByVersion")
                .field("version", version)
                .finish_non_exhaustive(),
            Self::FindLatestActive { .. } => write!(f, "FindLatestActive"),
            Self::FindById { id, .. } => f
                .debug_struct("FindById")
                .field("id", id)
                .finish_non_exhaustive(),
            Self::List { .. } => write!(f, "List"),
            Self::Deactivate { id, .. } => f
                .debug_struct("Deactivate")
                .field("id", id)
                .finish_non_exhaustive(),
            Self::Delete { id, .. } => f
                .debug_struct("Delete")
                .field("id", id)
                .finish_non_exhaustive(),
            Self::BlobRefs { .. } => write!(f, "BlobRefs"),
        }
    }
}

/// A handle to the catalog actor that is Send + Sync and Clone.
///
/// The actor thread exits once every handle has been dropped.
#[derive(Clone)]
pub struct CatalogHandle {
    sender: mpsc::Sender<CatalogEvent>,
}

impl fmt::Debug for CatalogHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogHandle").finish_non_exhaustive()
    }
}

impl CatalogHandle {
    /// Open the catalog at `path` and spawn its actor thread
    ///
    /// # Errors
    ///
    /// Returns the open error; see [`Catalog::open_at`].
    pub fn spawn(path: &Path) -> Result<Self, CatalogError> {
        Ok(Self::spawn_with(Catalog::open_at(path)?))
    }

    /// Spawn an actor around an already-open catalog
    pub fn spawn_with(catalog: Catalog) -> Self {
        let (sender, receiver) = mpsc::channel();

        thread::spawn(move || {
            run_catalog_event_loop(catalog, receiver);
        });

        Self { sender }
    }

    /// Helper to send a request and wait for the response
    async fn request<T, F>(&self, f: F) -> Result<T, CatalogError>
    where
        F: FnOnce(Reply<T>) -> CatalogEvent,
    {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(f(tx))
            .map_err(|_| CatalogError::ActorDied)?;
        rx.await.map_err(|_| CatalogError::ActorDied)?
    }

    /// Insert a new record.
    ///
    /// # Errors
    ///
    /// [`CatalogError::DuplicateVersion`] if the version is taken, active or
    /// not; [`CatalogError::ActorDied`] if the actor is gone.
    pub async fn create(&self, record: PackageRecord) -> Result<(), CatalogError> {
        self.request(|resp| CatalogEvent::Create {
            record: Box::new(record),
            resp,
        })
        .await
    }

    /// Exact-string version lookup, active or not.
    ///
    /// # Errors
    ///
    /// Returns a database or actor failure.
    pub async fn find_by_version(
        &self,
        version: String,
    ) -> Result<Option<PackageRecord>, CatalogError> {
        self.request(|resp| CatalogEvent::FindByVersion { version, resp })
            .await
    }

    /// Most recently created active record, if any.
    ///
    /// # Errors
    ///
    /// Returns a database or actor failure.
    pub async fn find_latest_active(&self) -> Result<Option<PackageRecord>, CatalogError> {
        self.request(|resp| CatalogEvent::FindLatestActive { resp })
            .await
    }

    /// Look a record up by id.
    ///
    /// # Errors
    ///
    /// [`CatalogError::NotFound`] if no record has this id.
    pub async fn find_by_id(&self, id: PackageId) -> Result<PackageRecord, CatalogError> {
        self.request(|resp| CatalogEvent::FindById { id, resp })
            .await
    }

    /// Every record, newest first.
    ///
    /// # Errors
    ///
    /// Returns a database or actor failure.
    pub async fn list(&self) -> Result<Vec<PackageRecord>, CatalogError> {
        self.request(|resp| CatalogEvent::List { resp }).await
    }

    /// Mark a record inactive and return it. Deactivating twice is fine.
    ///
    /// # Errors
    ///
    /// [`CatalogError::NotFound`] if no record has this id.
    pub async fn deactivate(&self, id: PackageId) -> Result<PackageRecord, CatalogError> {
        self.request(|resp| CatalogEvent::Deactivate { id, resp })
            .await
    }

    /// Remove a record.
    ///
    /// # Errors
    ///
    /// [`CatalogError::NotFound`] if no record has this id.
    pub async fn delete(&self, id: PackageId) -> Result<(), CatalogError> {
        self.request(|resp| CatalogEvent::Delete { id, resp })
            .await
    }

    /// Blob reference of every record.
    ///
    /// # Errors
    ///
    /// Returns a database or actor failure.
    pub async fn blob_refs(&self) -> Result<Vec<BlobRef>, CatalogError> {
        self.request(|resp| CatalogEvent::BlobRefs { resp }).await
    }
}

/// The event loop running in the background thread
// The catalog and receiver are moved into this thread to give the actor
// exclusive ownership of the connection.
#[allow(clippy::needless_pass_by_value)]
fn run_catalog_event_loop(catalog: Catalog, receiver: mpsc::Receiver<CatalogEvent>) {
    while let Ok(event) = receiver.recv() {
        tracing::trace!(?event, "catalog request");
        match event {
            CatalogEvent::Create { record, resp } => {
                let _ = resp.send(catalog.create(&record));
            }
            CatalogEvent::FindByVersion { version, resp } => {
                let _ = resp.send(catalog.find_by_version(&version));
            }
            CatalogEvent::FindLatestActive { resp } => {
                let _ = resp.send(catalog.find_latest_active());
            }
            CatalogEvent::FindById { id, resp } => {
                let _ = resp.send(catalog.find_by_id(&id));
            }
            CatalogEvent::List { resp } => {
                let _ = resp.send(catalog.list());
            }
            CatalogEvent::Deactivate { id, resp } => {
                let _ = resp.send(catalog.deactivate(&id));
            }
            CatalogEvent::Delete { id, resp } => {
                let _ = resp.send(catalog.delete(&id));
            }
            CatalogEvent::BlobRefs { resp } => {
                let _ = resp.send(catalog.blob_refs());
            }
        }
    }
}
