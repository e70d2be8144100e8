//! HTTP server
//!
//! Admin routes under `/admin` require a bearer token mapped to a role in
//! [`ServiceConfig`](updist_core::ServiceConfig). Node routes under
//! `/update` are open: eligibility is gated by tenant license, not by caller.

mod auth;
mod error;
mod routes;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::net::TcpListener;

use crate::context::AppContext;

pub use auth::AuthCaller;
pub use error::ApiError;

/// Shared handler state.
pub type AppState = Arc<AppContext>;

/// Build the application router.
pub fn router(ctx: AppContext) -> Router {
    // Multipart framing on top of the archive itself
    let body_limit = ctx.config.max_upload_bytes.saturating_add(64 * 1024);

    Router::new()
        .route("/health", get(routes::health))
        .route("/admin/update/upload", post(routes::upload))
        .route("/admin/update/generate", post(routes::generate))
        .route("/admin/updates", get(routes::list))
        .route(
            "/admin/update/:id",
            get(routes::get_update).delete(routes::delete),
        )
        .route("/admin/update/:id/deactivate", post(routes::deactivate))
        .route("/update/check", get(routes::check))
        .route("/update/download/:id", get(routes::download))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(Arc::new(ctx))
}

/// Bind and serve until ctrl-c.
pub async fn serve(ctx: AppContext) -> Result<()> {
    let addr = ctx.config.bind;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!(%addr, home = %ctx.config.home.display(), "update server listening");

    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("update server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
