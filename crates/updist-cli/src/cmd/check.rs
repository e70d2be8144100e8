//! Check command

use anyhow::Result;
use crossterm::style::Stylize;
use updist_schema::EligibilityDecision;

use crate::context::AppContext;
use crate::ui::{Output, format_size};

/// Run the eligibility check for a tenant as a node would.
pub async fn check(ctx: &AppContext, tenant: &str, version: &str, out: Output) -> Result<()> {
    let decision = ctx.service.check_for_updates(tenant, version).await?;

    if out.json(&decision)? {
        return Ok(());
    }
    match decision {
        EligibilityDecision::Available(update) => {
            out.success(&format!(
                "Update available: {} -> {}",
                update.current_version,
                update.latest_version.to_string().green().bold()
            ));
            out.field("id", &update.update_id.to_string());
            out.field("size", &format_size(update.file_size));
            out.field("checksum", update.checksum.as_str());
            if update.breaking {
                out.warning("This update contains breaking changes");
            }
            if update.security_update {
                out.info("This update ships security fixes");
            }
        }
        EligibilityDecision::Unavailable(withheld) => {
            out.info(&format!(
                "No update for {}: {}",
                withheld.current_version,
                withheld.reason.as_str()
            ));
            if let Some(latest) = &withheld.latest_version {
                out.field("latest", latest.as_str());
            }
            if let Some(min) = &withheld.minimum_client_version {
                out.field("requires", &format!(">= {min}"));
            }
        }
    }
    Ok(())
}
