//! Upload command

use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;
use crossterm::style::Stylize;
use updist_core::{Caller, UploadRequest};

use crate::context::AppContext;
use crate::ui::{Output, format_size};

/// Publish a local archive as the super-admin.
pub async fn upload(
    ctx: &AppContext,
    file: &Path,
    checksum: Option<String>,
    out: Output,
) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let info = ctx
        .service
        .upload(
            &Caller::local_admin(),
            UploadRequest {
                filename,
                bytes: Bytes::from(bytes),
                checksum,
            },
        )
        .await?;

    if out.json(&info)? {
        return Ok(());
    }
    out.success(&format!(
        "Published {} ({})",
        info.version.to_string().white().bold(),
        format_size(info.file_size)
    ));
    out.field("id", &info.id.to_string());
    out.field("checksum", info.checksum.as_str());
    Ok(())
}
