//! Read-only REST API over a finished run.
//!
//! Provides two GET endpoints:
//! - `/summary`: run configuration and cost summary
//! - `/record`: step results with optional inclusive range filtering

mod handlers;
mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tracing::info;

use crate::sim::cost::CostSummary;
use crate::sim::record::AnnualRecord;
use crate::sim::types::DispatchConfig;

pub use types::{ErrorResponse, RecordQuery, SummaryResponse};

/// Immutable application state shared across all request handlers.
///
/// Built once after the run completes and wrapped in `Arc`; no locks are
/// needed since nothing is mutated.
pub struct AppState {
    pub config: DispatchConfig,
    pub summary: CostSummary,
    pub record: AnnualRecord,
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/summary", get(handlers::get_summary))
        .route("/record", get(handlers::get_record))
        .with_state(state)
}

/// Binds to the given address and serves the API until the process ends.
///
/// # Errors
///
/// Returns an `io::Error` if the listener cannot bind or the server fails.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, router(state)).await
}
