//! The `version.json` manifest embedded in every update archive.
//!
//! [`ManifestDraft`] is the loose wire form: every field optional, exactly as
//! found in the archive. [`Manifest`] is the validated form the rest of the
//! system works with; the only way to get one is [`ManifestDraft::validate`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::MANIFEST_ENTRY;
use crate::types::PackageMetadata;
use crate::version::Version;

/// Manifest extraction and validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    /// The archive has no manifest entry at its root.
    #[error("archive must contain {MANIFEST_ENTRY} at its root")]
    Missing,

    /// The archive or the manifest entry could not be parsed.
    #[error("{MANIFEST_ENTRY} could not be parsed: {0}")]
    Malformed(String),

    /// A field is missing, empty, or does not satisfy its grammar.
    #[error("{MANIFEST_ENTRY} field '{field}' is invalid: {reason}")]
    Invalid {
        /// Wire name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Validated update manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Version published by this archive.
    pub version: Version,
    /// Release notes; never empty.
    pub changelog: String,
    /// Lowest client version able to apply this archive.
    pub minimum_client_version: Version,
    /// Target platform (e.g. `linux`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Target architecture (e.g. `x64`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    /// Contains breaking changes.
    pub breaking: bool,
    /// Ships security fixes.
    pub security_update: bool,
    /// Declared runtime dependencies.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    /// Authoring timestamp as declared by the publisher.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Manifest {
    /// Parse and validate manifest bytes.
    ///
    /// # Errors
    ///
    /// [`ManifestError::Malformed`] if the bytes are not UTF-8 JSON of the
    /// expected shape, [`ManifestError::Invalid`] if a field fails validation.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ManifestError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ManifestError::Malformed(format!("not UTF-8: {e}")))?;
        let draft: ManifestDraft =
            serde_json::from_str(text).map_err(|e| ManifestError::Malformed(e.to_string()))?;
        draft.validate()
    }

    /// The optional fields, as persisted alongside the package record.
    pub fn metadata(&self) -> PackageMetadata {
        PackageMetadata {
            platform: self.platform.clone(),
            architecture: self.architecture.clone(),
            breaking: self.breaking,
            security_update: self.security_update,
            dependencies: self.dependencies.clone(),
            created_at: self.created_at.clone(),
        }
    }
}

/// Unvalidated manifest, as read from or written to an archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDraft {
    /// See [`Manifest::version`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// See [`Manifest::changelog`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog: Option<String>,
    /// See [`Manifest::minimum_client_version`]; also read from `requiredNodeVersion`.
    #[serde(
        default,
        alias = "requiredNodeVersion",
        skip_serializing_if = "Option::is_none"
    )]
    pub minimum_client_version: Option<String>,
    /// Target platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Target architecture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    /// Contains breaking changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaking: Option<bool>,
    /// Ships security fixes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_update: Option<bool>,
    /// Declared runtime dependencies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<BTreeMap<String, String>>,
    /// Authoring timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl ManifestDraft {
    /// Check required fields and version grammar.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Invalid`] naming the first offending field.
    pub fn validate(self) -> Result<Manifest, ManifestError> {
        let version = required_version("version", self.version)?;
        let changelog = required_text("changelog", self.changelog)?;
        let minimum_client_version =
            required_version("minimumClientVersion", self.minimum_client_version)?;

        Ok(Manifest {
            version,
            changelog,
            minimum_client_version,
            platform: self.platform,
            architecture: self.architecture,
            breaking: self.breaking.unwrap_or(false),
            security_update: self.security_update.unwrap_or(false),
            dependencies: self.dependencies.unwrap_or_default(),
            created_at: self.created_at,
        })
    }
}

fn required_text(field: &'static str, value: Option<String>) -> Result<String, ManifestError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        Some(_) => Err(ManifestError::Invalid {
            field,
            reason: "must not be empty".to_string(),
        }),
        None => Err(ManifestError::Invalid {
            field,
            reason: "is required".to_string(),
        }),
    }
}

fn required_version(field: &'static str, value: Option<String>) -> Result<Version, ManifestError> {
    let raw = required_text(field, value)?;
    Version::parse(&raw).map_err(|e| ManifestError::Invalid {
        field,
        reason: e.to_string(),
    })
}
