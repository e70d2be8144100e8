//! Tenant and license gate
//!
//! The update service only needs a yes/no (and a reason) for "may this
//! tenant receive updates right now". Tenant and license bookkeeping live
//! elsewhere; this crate ships a read-only TOML registry as the default
//! answer source:
//!
//! ```toml
//! [[tenants]]
//! id = "acme"
//! active = true
//!
//! [[tenants.licenses]]
//! status = "active"
//! expires_at = "2027-01-01T00:00:00Z"
//! ```

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

/// The gate could not answer.
#[derive(Error, Debug)]
pub enum GateError {
    /// Registry file exists but cannot be read.
    #[error("failed to read tenant registry {path}: {source}")]
    Io {
        /// Registry file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Registry file is not valid TOML for the registry schema.
    #[error("failed to parse tenant registry {path}: {source}")]
    Parse {
        /// Registry file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: toml::de::Error,
    },
}

/// Whether a tenant may receive updates, and if not, why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantStanding {
    /// Active tenant holding a current license.
    Licensed,
    /// No tenant with this id.
    UnknownTenant,
    /// Tenant exists but is switched off.
    Inactive,
    /// No license in `active` status.
    NoActiveLicense,
    /// Every active license is past its expiry.
    LicenseExpired,
}

/// Read-only view of tenant and license state.
#[async_trait]
pub trait LicenseGate: Send + Sync {
    /// Current standing of `tenant_id`. Unknown tenants are a standing, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`GateError`] when the backing source cannot be read.
    async fn tenant_status(&self, tenant_id: &str) -> Result<TenantStanding, GateError>;
}

/// License lifecycle state as written in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    /// In force, subject to `expires_at`.
    Active,
    /// Lapsed.
    Expired,
    /// Withdrawn.
    Revoked,
}

/// One license held by a tenant.
#[derive(Debug, Clone, Deserialize)]
pub struct LicenseEntry {
    /// Lifecycle state.
    pub status: LicenseStatus,
    /// No expiry means the license never lapses.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// One tenant in the registry.
#[derive(Debug, Clone, Deserialize)]
pub struct TenantEntry {
    /// Tenant id nodes report.
    pub id: String,
    /// Defaults to true.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Licenses in any state.
    #[serde(default)]
    pub licenses: Vec<LicenseEntry>,
}

fn default_true() -> bool {
    true
}

/// Parsed tenant registry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantRegistry {
    /// Every known tenant.
    #[serde(default)]
    pub tenants: Vec<TenantEntry>,
}

impl TenantRegistry {
    /// Parse a registry document.
    ///
    /// # Errors
    ///
    /// Returns the TOML error for malformed documents.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Standing of `tenant_id` at `now`.
    ///
    /// Checks run in order: tenant exists, tenant active, an `active`
    /// license exists, that license has not passed its expiry.
    pub fn evaluate(&self, tenant_id: &str, now: DateTime<Utc>) -> TenantStanding {
        let Some(tenant) = self.tenants.iter().find(|t| t.id == tenant_id) else {
            return TenantStanding::UnknownTenant;
        };
        if !tenant.active {
            return TenantStanding::Inactive;
        }

        let active: Vec<_> = tenant
            .licenses
            .iter()
            .filter(|l| l.status == LicenseStatus::Active)
            .collect();
        if active.is_empty() {
            return TenantStanding::NoActiveLicense;
        }

        if active
            .iter()
            .any(|l| l.expires_at.is_none_or(|expiry| expiry > now))
        {
            TenantStanding::Licensed
        } else {
            TenantStanding::LicenseExpired
        }
    }
}

#[async_trait]
impl LicenseGate for TenantRegistry {
    async fn tenant_status(&self, tenant_id: &str) -> Result<TenantStanding, GateError> {
        Ok(self.evaluate(tenant_id, Utc::now()))
    }
}

/// Gate backed by a registry file, re-read on every check so edits apply
/// without a restart. A missing file means no tenants.
#[derive(Debug, Clone)]
pub struct RegistryLicenseGate {
    path: PathBuf,
}

impl RegistryLicenseGate {
    /// Gate over the registry file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<TenantRegistry, GateError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "tenant registry missing, treating as empty");
                return Ok(TenantRegistry::default());
            }
            Err(source) => {
                return Err(GateError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        TenantRegistry::from_toml(&text).map_err(|source| GateError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

#[async_trait]
impl LicenseGate for RegistryLicenseGate {
    async fn tenant_status(&self, tenant_id: &str) -> Result<TenantStanding, GateError> {
        let registry = self.load().await?;
        Ok(registry.evaluate(tenant_id, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const REGISTRY: &str = r#"
        [[tenants]]
        id = "acme"

        [[tenants.licenses]]
        status = "active"
        expires_at = "2030-01-01T00:00:00Z"

        [[tenants]]
        id = "sleepy"
        active = false

        [[tenants.licenses]]
        status = "active"

        [[tenants]]
        id = "lapsed"

        [[tenants.licenses]]
        status = "revoked"

        [[tenants]]
        id = "stale"

        [[tenants.licenses]]
        status = "active"
        expires_at = "2020-01-01T00:00:00Z"
    "#;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn evaluates_each_standing() {
        let registry = TenantRegistry::from_toml(REGISTRY).unwrap();
        let now = at("2026-06-01T00:00:00Z");

        assert_eq!(registry.evaluate("acme", now), TenantStanding::Licensed);
        assert_eq!(registry.evaluate("nobody", now), TenantStanding::UnknownTenant);
        assert_eq!(registry.evaluate("sleepy", now), TenantStanding::Inactive);
        assert_eq!(registry.evaluate("lapsed", now), TenantStanding::NoActiveLicense);
        assert_eq!(registry.evaluate("stale", now), TenantStanding::LicenseExpired);
    }

    #[test]
    fn expiry_is_checked_against_now() {
        let registry = TenantRegistry::from_toml(REGISTRY).unwrap();
        assert_eq!(
            registry.evaluate("acme", at("2031-01-01T00:00:00Z")),
            TenantStanding::LicenseExpired
        );
    }

    #[tokio::test]
    async fn file_gate_reads_registry_and_tolerates_absence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tenants.toml");
        let gate = RegistryLicenseGate::new(&path);

        assert_eq!(
            gate.tenant_status("acme").await.unwrap(),
            TenantStanding::UnknownTenant
        );

        std::fs::write(&path, REGISTRY).unwrap();
        assert_eq!(gate.tenant_status("acme").await.unwrap(), TenantStanding::Licensed);

        std::fs::write(&path, "tenants = 3").unwrap();
        assert!(matches!(
            gate.tenant_status("acme").await,
            Err(GateError::Parse { .. })
        ));
    }
}
