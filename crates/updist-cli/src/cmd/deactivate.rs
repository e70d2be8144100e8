//! Deactivate command

use anyhow::Result;
use crossterm::style::Stylize;
use updist_core::Caller;

use super::parse_id;
use crate::context::AppContext;
use crate::ui::Output;

/// Stop offering an update. The record and archive are kept.
pub async fn deactivate(ctx: &AppContext, id: &str, out: Output) -> Result<()> {
    let info = ctx
        .service
        .deactivate(&Caller::local_admin(), parse_id(id)?)
        .await?;

    if !out.json(&info)? {
        out.success(&format!(
            "Deactivated {}",
            info.version.to_string().white().bold()
        ));
    }
    Ok(())
}
