//! `SQLite` package catalog
//!
//! The `version` column carries a UNIQUE constraint; that constraint, not a
//! lookup beforehand, decides which of two concurrent uploads wins.

use std::path::Path;

use chrono::DateTime;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use updist_schema::{Checksum, PackageId, Version};

use super::{CatalogError, PackageRecord};
use crate::blob::BlobRef;

const COLUMNS: &str = "id, version, changelog, filename, file_size, blob_ref, checksum, \
                       active, minimum_client_version, metadata, created_at";

/// Row as stored, before validation.
struct RawRecord {
    id: String,
    version: String,
    changelog: String,
    filename: String,
    file_size: i64,
    blob_ref: String,
    checksum: String,
    active: bool,
    minimum_client_version: String,
    metadata: String,
    created_at: i64,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            version: row.get(1)?,
            changelog: row.get(2)?,
            filename: row.get(3)?,
            file_size: row.get(4)?,
            blob_ref: row.get(5)?,
            checksum: row.get(6)?,
            active: row.get(7)?,
            minimum_client_version: row.get(8)?,
            metadata: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    fn into_record(self) -> Result<PackageRecord, CatalogError> {
        let corrupt = |what: &str, e: &dyn std::fmt::Display| {
            CatalogError::Corrupt(format!("{what} of row {}: {e}", self.id))
        };

        Ok(PackageRecord {
            id: self.id.parse().map_err(|e| corrupt("id", &e))?,
            version: Version::parse(&self.version).map_err(|e| corrupt("version", &e))?,
            checksum: Checksum::parse(&self.checksum).map_err(|e| corrupt("checksum", &e))?,
            minimum_client_version: Version::parse(&self.minimum_client_version)
                .map_err(|e| corrupt("minimum_client_version", &e))?,
            metadata: serde_json::from_str(&self.metadata).map_err(|e| corrupt("metadata", &e))?,
            created_at: DateTime::from_timestamp_micros(self.created_at)
                .ok_or_else(|| corrupt("created_at", &self.created_at))?,
            file_size: self.file_size as u64,
            active: self.active,
            changelog: self.changelog,
            filename: self.filename,
            blob_ref: BlobRef::from(self.blob_ref),
        })
    }
}

/// Package catalog backed by a single `SQLite` connection.
pub struct Catalog {
    conn: Connection,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog").finish_non_exhaustive()
    }
}

impl Catalog {
    /// Open or create the catalog at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Corrupt`] if the parent directory cannot be
    /// created, or [`CatalogError::Sqlite`] if the database cannot be opened.
    pub fn open_at(path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CatalogError::Corrupt(format!("cannot create {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path)?;

        // WAL lets readers proceed while a write is in flight
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Open a private in-memory catalog (for testing)
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Sqlite`] if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), CatalogError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS packages (
                id TEXT PRIMARY KEY,
                version TEXT NOT NULL UNIQUE,
                changelog TEXT NOT NULL,
                filename TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                blob_ref TEXT NOT NULL,
                checksum TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                minimum_client_version TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_packages_active_created
                ON packages(active, created_at);
            ",
        )?;
        Ok(())
    }

    /// Insert a new record.
    ///
    /// Returns [`CatalogError::DuplicateVersion`] when the version is taken,
    /// whether or not the existing record is active.
    ///
    /// # Errors
    ///
    /// Any other database failure is [`CatalogError::Sqlite`].
    pub fn create(&self, record: &PackageRecord) -> Result<(), CatalogError> {
        let metadata = serde_json::to_string(&record.metadata)
            .map_err(|e| CatalogError::Corrupt(format!("metadata: {e}")))?;

        let inserted = self.conn.execute(
            &format!("INSERT INTO packages ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
            params![
                record.id.to_string(),
                record.version.as_str(),
                record.changelog,
                record.filename,
                record.file_size as i64,
                record.blob_ref.as_str(),
                record.checksum.as_str(),
                record.active,
                record.minimum_client_version.as_str(),
                metadata,
                record.created_at.timestamp_micros(),
            ],
        );

        match inserted {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation
                    && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Err(CatalogError::DuplicateVersion(record.version.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Exact-string version lookup, active or not.
    ///
    /// # Errors
    ///
    /// Returns a database failure or an undecodable row.
    pub fn find_by_version(&self, version: &str) -> Result<Option<PackageRecord>, CatalogError> {
        self.query_one(
            &format!("SELECT {COLUMNS} FROM packages WHERE version = ?1"),
            params![version],
        )
    }

    /// Most recently published active record.
    ///
    /// # Errors
    ///
    /// Returns a database failure or an undecodable row.
    pub fn find_latest_active(&self) -> Result<Option<PackageRecord>, CatalogError> {
        self.query_one(
            &format!(
                "SELECT {COLUMNS} FROM packages WHERE active = 1 \
                 ORDER BY created_at DESC, rowid DESC LIMIT 1"
            ),
            params![],
        )
    }

    /// Record by id, active or not.
    ///
    /// # Errors
    ///
    /// [`CatalogError::NotFound`] if no record has this id.
    pub fn find_by_id(&self, id: &PackageId) -> Result<PackageRecord, CatalogError> {
        self.query_one(
            &format!("SELECT {COLUMNS} FROM packages WHERE id = ?1"),
            params![id.to_string()],
        )?
        .ok_or(CatalogError::NotFound(*id))
    }

    /// All records, newest first.
    ///
    /// # Errors
    ///
    /// Returns a database failure or an undecodable row.
    pub fn list(&self) -> Result<Vec<PackageRecord>, CatalogError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM packages ORDER BY created_at DESC, rowid DESC"
        ))?;

        let rows = stmt.query_map([], RawRecord::from_row)?;
        rows.map(|raw| raw?.into_record()).collect()
    }

    /// Mark a record inactive. Idempotent; returns the updated record.
    ///
    /// # Errors
    ///
    /// [`CatalogError::NotFound`] if no record has this id.
    pub fn deactivate(&self, id: &PackageId) -> Result<PackageRecord, CatalogError> {
        let updated = self.conn.execute(
            "UPDATE packages SET active = 0 WHERE id = ?1",
            params![id.to_string()],
        )?;

        if updated == 0 {
            return Err(CatalogError::NotFound(*id));
        }
        self.find_by_id(id)
    }

    /// Remove a record.
    ///
    /// # Errors
    ///
    /// [`CatalogError::NotFound`] if no record has this id.
    pub fn delete(&self, id: &PackageId) -> Result<(), CatalogError> {
        let deleted = self
            .conn
            .execute("DELETE FROM packages WHERE id = ?1", params![id.to_string()])?;

        if deleted == 0 {
            return Err(CatalogError::NotFound(*id));
        }
        Ok(())
    }

    /// Every blob reference the catalog points at.
    ///
    /// # Errors
    ///
    /// Returns a database failure.
    pub fn blob_refs(&self) -> Result<Vec<BlobRef>, CatalogError> {
        let mut stmt = self
            .conn
            .prepare("SELECT blob_ref FROM packages ORDER BY blob_ref")?;
        let refs = stmt.query_map([], |row| row.get::<_, String>(0))?;

        refs.map(|r| r.map(BlobRef::from).map_err(Into::into))
            .collect()
    }

    fn query_one(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Option<PackageRecord>, CatalogError> {
        self.conn
            .query_row(sql, params, RawRecord::from_row)
            .optional()?
            .map(RawRecord::into_record)
            .transpose()
    }
}
