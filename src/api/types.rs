//! API response and query types.

use serde::{Deserialize, Serialize};

use crate::sim::cost::CostSummary;
use crate::sim::types::DispatchConfig;

/// `GET /summary` body.
#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub config: DispatchConfig,
    pub summary: CostSummary,
    /// Number of recorded steps.
    pub steps_recorded: usize,
}

/// Optional range query parameters for the record endpoint.
#[derive(Debug, Deserialize)]
pub struct RecordQuery {
    /// Start step (inclusive).
    pub from: Option<usize>,
    /// End step (inclusive).
    pub to: Option<usize>,
}

/// Error response body for 400-class errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
