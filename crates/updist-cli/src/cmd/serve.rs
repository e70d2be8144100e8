//! Serve command

use std::net::SocketAddr;

use anyhow::Result;

use crate::context::AppContext;
use crate::http;

/// Run the HTTP server until ctrl-c.
pub async fn serve(mut ctx: AppContext, bind: Option<SocketAddr>) -> Result<()> {
    if let Some(bind) = bind {
        ctx.config.bind = bind;
    }
    if ctx.config.admin_token.is_none() {
        tracing::warn!("UPDIST_ADMIN_TOKEN is not set; admin endpoints will reject every request");
    }
    http::serve(ctx).await
}
