//! Service configuration, loaded from `UPDIST_*` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::paths;
use crate::reconcile::DEFAULT_ORPHAN_GRACE;

/// Default listen address for `updist serve`.
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Default upper bound on an uploaded archive (512 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Configuration could not be loaded.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Neither `UPDIST_HOME` nor a user home directory is available.
    #[error("could not determine home directory; set UPDIST_HOME")]
    NoHome,

    /// A variable is set to a value that does not parse.
    #[error("{var}='{value}' is invalid: {reason}")]
    Invalid {
        /// Offending variable.
        var: &'static str,
        /// Value as read.
        value: String,
        /// Parser message.
        reason: String,
    },
}

/// Runtime configuration shared by the HTTP server and the local commands.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory holding the catalog database and blob store.
    pub home: PathBuf,
    /// HTTP listen address.
    pub bind: SocketAddr,
    /// Bearer token granting the super-admin role.
    pub admin_token: Option<String>,
    /// Bearer token granting the read-only support role.
    pub support_token: Option<String>,
    /// Tenant registry file consulted by the license gate.
    pub registry_path: PathBuf,
    /// Exercise catalog file consulted by the package generator.
    pub exercises_path: PathBuf,
    /// Largest accepted upload body.
    pub max_upload_bytes: usize,
    /// Minimum age of an unreferenced blob before `clean` deletes it.
    pub orphan_grace: Duration,
}

impl ServiceConfig {
    /// Defaults rooted at `home`.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            registry_path: paths::registry_path(&home),
            exercises_path: paths::exercises_path(&home),
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            admin_token: None,
            support_token: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            orphan_grace: DEFAULT_ORPHAN_GRACE,
            home,
        }
    }

    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// See [`ServiceConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset. Only `lookup` is consulted, never
    /// the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoHome`] when no home can be resolved, or
    /// [`ConfigError::Invalid`] for a malformed address, size or duration.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let home = match var("UPDIST_HOME") {
            Some(home) => PathBuf::from(home),
            None => paths::default_updist_home().ok_or(ConfigError::NoHome)?,
        };
        let mut config = Self::with_home(home);

        if let Some(bind) = var("UPDIST_BIND") {
            config.bind = bind.parse().map_err(|e: std::net::AddrParseError| {
                ConfigError::Invalid {
                    var: "UPDIST_BIND",
                    value: bind.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        if let Some(limit) = var("UPDIST_MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = limit.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Invalid {
                    var: "UPDIST_MAX_UPLOAD_BYTES",
                    value: limit.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        if let Some(secs) = var("UPDIST_ORPHAN_GRACE_SECS") {
            let secs: u64 = secs.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Invalid {
                    var: "UPDIST_ORPHAN_GRACE_SECS",
                    value: secs.clone(),
                    reason: e.to_string(),
                }
            })?;
            config.orphan_grace = Duration::from_secs(secs);
        }
        if let Some(path) = var("UPDIST_REGISTRY") {
            config.registry_path = PathBuf::from(path);
        }
        if let Some(path) = var("UPDIST_EXERCISES") {
            config.exercises_path = PathBuf::from(path);
        }
        config.admin_token = var("UPDIST_ADMIN_TOKEN");
        config.support_token = var("UPDIST_SUPPORT_TOKEN");

        Ok(config)
    }

    /// `SQLite` catalog location.
    pub fn catalog_path(&self) -> PathBuf {
        paths::catalog_path(&self.home)
    }

    /// Blob store root.
    pub fn blob_root(&self) -> PathBuf {
        paths::blob_root(&self.home)
    }
}
