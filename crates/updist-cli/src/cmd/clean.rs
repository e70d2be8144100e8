//! Clean command

use anyhow::Result;
use crossterm::style::Stylize;
use serde_json::json;
use updist_core::Caller;

use crate::context::AppContext;
use crate::ui::Output;

/// Remove orphan blobs and report records whose archive is gone.
///
/// Unreferenced blobs younger than the configured grace period are kept.
pub async fn clean(ctx: &AppContext, dry_run: bool, out: Output) -> Result<()> {
    let grace = ctx.config.orphan_grace;
    let report = ctx
        .service
        .reconcile(&Caller::local_admin(), dry_run, grace)
        .await?;

    let dangling: Vec<_> = report
        .dangling_records
        .iter()
        .map(|(id, version)| json!({ "id": id, "version": version }))
        .collect();
    let orphans: Vec<_> = report.orphan_blobs.iter().map(ToString::to_string).collect();
    let recent: Vec<_> = report.recent_blobs.iter().map(ToString::to_string).collect();
    if out.json(&json!({
        "dryRun": dry_run,
        "graceSecs": grace.as_secs(),
        "orphanBlobs": orphans,
        "recentBlobs": recent,
        "danglingRecords": dangling,
        "removed": report.removed,
    }))? {
        return Ok(());
    }

    if !report.recent_blobs.is_empty() {
        out.info(&format!(
            "Kept {} unreferenced blobs younger than {}s (uploads may be in flight)",
            report.recent_blobs.len(),
            grace.as_secs()
        ));
    }
    if report.is_clean() {
        out.success("Storage is consistent");
        return Ok(());
    }

    for blob in &report.orphan_blobs {
        let verb = if dry_run { "Would remove" } else { "Orphan" };
        println!("  {} {}", verb.dark_grey(), blob);
    }
    if dry_run {
        out.info(&format!("{} orphan blobs (dry run)", report.orphan_blobs.len()));
    } else if !report.orphan_blobs.is_empty() {
        out.success(&format!("Removed {} orphan blobs", report.removed));
    }

    for (id, version) in &report.dangling_records {
        out.warning(&format!("{version} ({id}) has no archive in storage"));
    }
    if !report.dangling_records.is_empty() {
        out.info("Run 'updist delete <id>' to remove records with missing archives");
    }
    Ok(())
}
