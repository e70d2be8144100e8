//! Delete command

use anyhow::Result;
use crossterm::style::Stylize;
use serde_json::json;
use updist_core::Caller;

use super::parse_id;
use crate::context::AppContext;
use crate::ui::Output;

/// Remove an update and its archive.
pub async fn delete(ctx: &AppContext, id: &str, out: Output) -> Result<()> {
    let id = parse_id(id)?;
    let version = ctx.service.delete(&Caller::local_admin(), id).await?;

    if !out.json(&json!({ "id": id, "version": version }))? {
        out.success(&format!("Deleted {}", version.to_string().white().bold()));
    }
    Ok(())
}
