//! Error types for forecast loading, model building, solving, and the rolling run.
//!
//! Per-step infeasibility and timeouts are not errors: they are recorded as a
//! [`SolveStatus`](crate::sim::types::SolveStatus) and the run continues. Only
//! the variants in this module abort anything.

use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use thiserror::Error;

/// Failures while loading or constructing a forecast series.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("failed to open forecast file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed forecast row {row}: {source}")]
    Parse {
        row: usize,
        #[source]
        source: csv::Error,
    },
    #[error("forecast is empty")]
    Empty,
    #[error("forecast period selects no points")]
    EmptyPeriod,
    #[error("forecast row {row}: expected timestamp {expected}, found {found}")]
    Gap {
        row: usize,
        expected: NaiveDateTime,
        found: NaiveDateTime,
    },
    #[error("forecast row {row}: invalid {field} {value} (demand and PV must be finite and >= 0, price finite)")]
    InvalidValue {
        row: usize,
        field: &'static str,
        value: f64,
    },
    #[error("daily profiles must all have {expected} points (got {field} with {found})")]
    ProfileLength {
        field: &'static str,
        expected: usize,
        found: usize,
    },
}

/// A window whose inputs cannot be turned into a well-posed program.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("forecast window is empty")]
    EmptyWindow,
    #[error("window offset {offset}: invalid {field} {value} (demand and PV must be finite and >= 0, price finite)")]
    InvalidInput {
        offset: usize,
        field: &'static str,
        value: f64,
    },
    #[error("initial soc {soc_kwh} kWh is outside [0, {capacity_kwh}] kWh")]
    InitialSoc { soc_kwh: f64, capacity_kwh: f64 },
}

impl ModelError {
    /// Input named in the snapshot, in the `name[offset]` form used for
    /// program rows.
    pub fn offending(&self) -> Option<String> {
        match self {
            Self::EmptyWindow => None,
            Self::InvalidInput { offset, field, .. } => Some(format!("{field}[{offset}]")),
            Self::InitialSoc { .. } => Some("soc".to_string()),
        }
    }
}

/// Adapter-level failures. These are fatal for the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("malformed program at {location}: {reason}")]
    MalformedModel { location: String, reason: String },
    #[error("failed to spawn solver worker: {0}")]
    Spawn(String),
    #[error("solver worker exited without reporting a result")]
    WorkerLost,
    #[error("solver returned {found} values for {expected} variables")]
    ValueCount { expected: usize, found: usize },
}

/// Inputs of the step that failed, for post-mortem inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintSnapshot {
    /// Battery energy before the failed step (kWh).
    pub soc_kwh: f64,
    /// Number of forecast points in the window that was being built.
    pub window_len: usize,
    /// Demand at the first window step (kW).
    pub demand_kw: f64,
    /// PV availability at the first window step (kW).
    pub pv_kw: f64,
    /// Energy price at the first window step.
    pub price_per_kwh: f64,
    /// Constraint or variable that failed, when known.
    pub offending: Option<String>,
}

impl fmt::Display for ConstraintSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "soc={:.3}kWh window={} demand={:.3}kW pv={:.3}kW price={:.4}",
            self.soc_kwh, self.window_len, self.demand_kw, self.pv_kw, self.price_per_kwh
        )?;
        if let Some(name) = &self.offending {
            write!(f, " offending={name}")?;
        }
        Ok(())
    }
}

/// Root cause of a fatal step failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepFailure {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Solver(#[from] SolverError),
}

/// Errors surfaced by the rolling controller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunError {
    #[error("forecast covers {available} steps but the run needs {required}")]
    ForecastTooShort { required: usize, available: usize },
    #[error("horizon must be at least one step")]
    ZeroHorizon,
    #[error("step {step} ({timestamp}) failed: {cause} [{snapshot}]")]
    StepFailed {
        step: usize,
        timestamp: NaiveDateTime,
        #[source]
        cause: StepFailure,
        snapshot: Box<ConstraintSnapshot>,
    },
    #[error("run aborted earlier at step {step}")]
    Aborted { step: usize },
}
