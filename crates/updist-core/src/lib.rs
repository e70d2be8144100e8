//! Core library for updist.
//!
//! Accepts versioned update archives, stores them, decides whether a node
//! should update and streams archives back on demand.

pub mod archive;
pub mod blob;
pub mod caller;
pub mod catalog;
pub mod config;
pub mod error;
pub mod exercises;
pub mod gate;
pub mod generator;
pub mod paths;
pub mod reconcile;
pub mod service;

// Re-exports
pub use blob::{BlobError, BlobRef, BlobStore, BlobStream, FsBlobStore, StoredBlob};
pub use caller::{Caller, Role};
pub use catalog::{Catalog, CatalogError, CatalogHandle, PackageRecord};
pub use config::{ConfigError, ServiceConfig};
pub use error::{ErrorClass, UpdateError};
pub use exercises::{ExerciseExporter, ExportSnapshot, FileExerciseExporter};
pub use gate::{LicenseGate, RegistryLicenseGate, TenantStanding};
pub use generator::{GenerateRequest, GeneratedPackage, PackageGenerator};
pub use reconcile::ReconcileReport;
pub use service::{PackageDownload, UpdateService, UploadRequest};
