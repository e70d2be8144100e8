//! Wiring of the service graph from configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use updist_core::{
    CatalogHandle, FileExerciseExporter, FsBlobStore, PackageGenerator, RegistryLicenseGate,
    ServiceConfig, UpdateService,
};

/// Everything a command or the HTTP server needs.
#[derive(Debug, Clone)]
pub struct AppContext {
    /// Configuration the context was opened with.
    pub config: ServiceConfig,
    /// Update service over the on-disk stores.
    pub service: UpdateService,
    /// Package generator publishing through `service`.
    pub generator: Arc<PackageGenerator>,
}

impl AppContext {
    /// Open the catalog and blob store under the configured home.
    pub async fn open(config: ServiceConfig) -> Result<Self> {
        let blobs = FsBlobStore::open(config.blob_root())
            .await
            .with_context(|| format!("Failed to open blob store at {}", config.blob_root().display()))?;
        let catalog = CatalogHandle::spawn(&config.catalog_path()).with_context(|| {
            format!("Failed to open catalog at {}", config.catalog_path().display())
        })?;
        let gate = RegistryLicenseGate::new(&config.registry_path);
        let exporter = FileExerciseExporter::new(&config.exercises_path);

        let service = UpdateService::new(catalog, Arc::new(blobs), Arc::new(gate));
        let generator = Arc::new(PackageGenerator::new(service.clone(), Arc::new(exporter)));

        tracing::debug!(home = %config.home.display(), "context ready");
        Ok(Self {
            config,
            service,
            generator,
        })
    }
}

/// Load configuration from the environment, with `home` taking precedence over `UPDIST_HOME`.
pub fn load_config(home: Option<PathBuf>) -> Result<ServiceConfig> {
    ServiceConfig::from_lookup(|key| match (key, &home) {
        ("UPDIST_HOME", Some(home)) => Some(home.display().to_string()),
        _ => std::env::var(key).ok(),
    })
    .context("Invalid configuration")
}
