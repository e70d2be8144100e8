//! List command

use anyhow::Result;
use crossterm::style::Stylize;
use updist_core::Caller;

use crate::context::AppContext;
use crate::ui::Output;

/// List every published update, newest first.
pub async fn list(ctx: &AppContext, out: Output) -> Result<()> {
    let packages = ctx.service.list(&Caller::local_admin()).await?;

    if out.json(&packages)? {
        return Ok(());
    }
    if packages.is_empty() {
        println!("No updates published.");
        println!("Run 'updist upload <archive.zip>' to publish one.");
        return Ok(());
    }

    println!();
    println!("{}", "Published updates".dark_grey());
    println!();
    for info in &packages {
        out.package_row(info);
    }
    println!();
    let active = packages.iter().filter(|p| p.active).count();
    println!(
        "{}",
        format!("{} updates total, {} active", packages.len(), active).dark_grey()
    );
    Ok(())
}
