//! Wire types shared by the service, the CLI and the HTTP API.
//!
//! Package ids, public package views, upload metadata and the eligibility
//! decision nodes receive. Field names serialize in camelCase.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::checksum::Checksum;
use crate::version::Version;

/// Identifier of a published package, handed to nodes by the eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(Uuid);

impl PackageId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl FromStr for PackageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::fmt::Display for PackageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Optional manifest fields kept alongside a package record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMetadata {
    /// Target platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Target architecture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    /// Contains breaking changes.
    #[serde(default)]
    pub breaking: bool,
    /// Ships security fixes.
    #[serde(default)]
    pub security_update: bool,
    /// Declared runtime dependencies.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    /// Authoring timestamp from the manifest, or the upload time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Public view of a published package. Never carries the blob reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    /// Package identifier.
    pub id: PackageId,
    /// Published version.
    pub version: Version,
    /// Release notes.
    pub changelog: String,
    /// Original archive filename.
    pub filename: String,
    /// Archive size in bytes.
    pub file_size: u64,
    /// `sha256:<hex>` of the archive bytes.
    pub checksum: Checksum,
    /// Lowest client version able to apply the package.
    pub minimum_client_version: Version,
    /// Whether nodes may still receive it.
    pub active: bool,
    /// Optional manifest fields.
    pub metadata: PackageMetadata,
    /// When the package was published.
    pub created_at: DateTime<Utc>,
}

/// Why a node is not offered an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WithheldReason {
    /// The catalog holds no active package.
    NoUpdatePublished,
    /// The node already runs the latest version (or a newer one).
    AlreadyCurrent,
    /// A newer package exists but requires a newer client runtime.
    ClientTooOld,
}

impl WithheldReason {
    /// Wire name of the reason.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoUpdatePublished => "no-update-published",
            Self::AlreadyCurrent => "already-current",
            Self::ClientTooOld => "client-too-old",
        }
    }
}

impl std::fmt::Display for WithheldReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The update a node is eligible for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableUpdate {
    /// Identifier to pass to the download endpoint.
    pub update_id: PackageId,
    /// Version the node reported.
    pub current_version: Version,
    /// Version on offer.
    pub latest_version: Version,
    /// Release notes.
    pub changelog: String,
    /// Archive size in bytes.
    pub file_size: u64,
    /// Archive checksum.
    pub checksum: Checksum,
    /// Lowest client version able to apply the package.
    pub minimum_client_version: Version,
    /// Contains breaking changes.
    pub breaking: bool,
    /// Ships security fixes.
    pub security_update: bool,
    /// When the package was published.
    pub created_at: DateTime<Utc>,
}

/// A withheld update and the reason for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithheldUpdate {
    /// Why nothing is offered.
    pub reason: WithheldReason,
    /// Version the node reported.
    pub current_version: Version,
    /// Latest active version, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<Version>,
    /// Client version the node must reach first (`client-too-old` only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_client_version: Option<Version>,
}

/// Outcome of an eligibility check.
///
/// Serializes flat, with an `available` discriminator:
/// `{"available": false, "reason": "already-current", ...}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EligibilityDecision {
    /// A newer package can be downloaded.
    Available(AvailableUpdate),
    /// Nothing to download.
    Unavailable(WithheldUpdate),
}

impl EligibilityDecision {
    /// Whether an update is on offer.
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// The reason an update was withheld, if it was.
    pub fn reason(&self) -> Option<WithheldReason> {
        match self {
            Self::Available(_) => None,
            Self::Unavailable(w) => Some(w.reason),
        }
    }
}

impl Serialize for EligibilityDecision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(untagged)]
        enum Body<'a> {
            Available(&'a AvailableUpdate),
            Unavailable(&'a WithheldUpdate),
        }

        #[derive(Serialize)]
        struct Wire<'a> {
            available: bool,
            #[serde(flatten)]
            body: Body<'a>,
        }

        let wire = match self {
            Self::Available(update) => Wire {
                available: true,
                body: Body::Available(update),
            },
            Self::Unavailable(withheld) => Wire {
                available: false,
                body: Body::Unavailable(withheld),
            },
        };
        wire.serialize(serializer)
    }
}
