//! The HTTP facade over the replay pipeline.
//!
//! Thin by design: every route delegates to the pipeline host or the
//! resolution entry points. Long-running control actions (trigger,
//! re-trigger, push) respond immediately and run in a background task; the
//! status endpoint is how callers watch progress.

pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use replay_pipeline::HttpPipeline;

pub use routes::router;

/// Bind and serve the facade until the process ends.
///
/// # Errors
///
/// Bind and accept failures.
pub async fn serve(pipeline: Arc<HttpPipeline>, addr: SocketAddr) -> std::io::Result<()> {
    let app: Router = router(pipeline);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "replay facade listening");
    axum::serve(listener, app).await
}
