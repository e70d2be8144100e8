//! Generate command

use anyhow::Result;
use chrono::{DateTime, Utc};
use crossterm::style::Stylize;
use updist_core::{Caller, GenerateRequest};

use crate::context::AppContext;
use crate::ui::{Output, format_size};

/// Build an update from the exercise catalog and publish it.
pub async fn generate(
    ctx: &AppContext,
    version: String,
    changelog: String,
    min_client_version: Option<String>,
    since: Option<DateTime<Utc>>,
    out: Output,
) -> Result<()> {
    let generated = ctx
        .generator
        .generate(
            &Caller::local_admin(),
            GenerateRequest {
                version,
                changelog,
                minimum_client_version: min_client_version,
                since,
            },
        )
        .await?;

    if out.json(&generated)? {
        return Ok(());
    }
    out.success(&format!(
        "Generated {} ({})",
        generated.package.version.to_string().white().bold(),
        format_size(generated.package.file_size)
    ));
    out.field("id", &generated.package.id.to_string());
    out.field("exercises", &generated.exercise_count.to_string());
    out.field("deletions", &generated.deletion_count.to_string());
    out.field("next --since", &generated.snapshot_timestamp.to_rfc3339());
    Ok(())
}
