//! Download command

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use updist_schema::ChecksumHasher;

use super::parse_id;
use crate::context::AppContext;
use crate::ui::{Output, format_size};

/// Stream an active update to disk, verifying its checksum before the file
/// appears at its final path.
pub async fn download(
    ctx: &AppContext,
    id: &str,
    output: Option<PathBuf>,
    out: Output,
) -> Result<()> {
    let mut download = ctx.service.download(parse_id(id)?).await?;
    let dest = output.unwrap_or_else(|| PathBuf::from(&download.filename));
    let mut partial = dest.clone().into_os_string();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    let mut file = tokio::fs::File::create(&partial)
        .await
        .with_context(|| format!("Failed to create {}", partial.display()))?;
    let mut hasher = ChecksumHasher::new();
    let mut written = 0u64;
    let mut buffer = vec![0u8; 64 * 1024];

    let copied: Result<()> = async {
        loop {
            let n = download.stream.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
            file.write_all(&buffer[..n]).await?;
            written += n as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
    .await;
    drop(file);

    let checksum = hasher.finalize();
    if let Err(e) = copied {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e.context("Download interrupted"));
    }
    if checksum != download.checksum {
        let _ = tokio::fs::remove_file(&partial).await;
        bail!(
            "Checksum mismatch for {}: expected {}, got {}",
            download.version,
            download.checksum,
            checksum
        );
    }

    tokio::fs::rename(&partial, &dest)
        .await
        .with_context(|| format!("Failed to move download to {}", dest.display()))?;
    tracing::debug!(path = %dest.display(), size = written, "download verified");

    if !out.json(&json!({
        "path": dest.display().to_string(),
        "version": download.version,
        "size": written,
        "checksum": checksum,
    }))? {
        out.success(&format!(
            "Saved {} to {} ({})",
            download.version,
            dest.display(),
            format_size(written)
        ));
    }
    Ok(())
}
