//! Command implementations

pub mod check;
pub mod clean;
pub mod deactivate;
pub mod delete;
pub mod download;
pub mod generate;
pub mod hash;
pub mod info;
pub mod list;
pub mod serve;
pub mod upload;

use anyhow::{Context, Result};
use updist_schema::PackageId;

/// Parse an update id argument.
pub(crate) fn parse_id(id: &str) -> Result<PackageId> {
    id.trim()
        .parse()
        .with_context(|| format!("'{id}' is not a valid update id"))
}
