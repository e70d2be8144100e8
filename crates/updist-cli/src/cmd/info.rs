//! Info command

use anyhow::Result;
use updist_core::Caller;

use super::parse_id;
use crate::context::AppContext;
use crate::ui::Output;

/// Show one update, active or not.
pub async fn info(ctx: &AppContext, id: &str, out: Output) -> Result<()> {
    let info = ctx.service.get(&Caller::local_admin(), parse_id(id)?).await?;

    if !out.json(&info)? {
        out.package_details(&info);
    }
    Ok(())
}
