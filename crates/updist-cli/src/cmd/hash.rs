//! Hash command

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use updist_schema::{Checksum, ChecksumHasher};

use crate::ui::Output;

#[derive(Serialize)]
struct FileChecksum {
    path: String,
    checksum: Checksum,
}

/// Print the `sha256:<hex>` checksum of each file, in the form uploads expect.
pub async fn hash(files: &[PathBuf], out: Output) -> Result<()> {
    let mut results = Vec::with_capacity(files.len());
    for file in files {
        let checksum = compute_file_checksum(file)
            .await
            .with_context(|| format!("Failed to hash {}", file.display()))?;
        results.push(FileChecksum {
            path: file.display().to_string(),
            checksum,
        });
    }

    if out.json(&results)? {
        return Ok(());
    }
    for result in results {
        println!("{} {}", result.checksum, result.path);
    }
    Ok(())
}

/// Streaming SHA-256 of a file.
pub(crate) async fn compute_file_checksum(path: &std::path::Path) -> Result<Checksum> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = ChecksumHasher::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize())
}
