//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::cell::Cell;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
use rolling_dispatch::error::SolverError;
use rolling_dispatch::forecast::SeriesForecast;
use rolling_dispatch::sim::program::LinearProgram;
use rolling_dispatch::sim::solver::{SolveOutcome, Solver};
use rolling_dispatch::sim::types::{BatterySpec, DispatchConfig, SolveStatus};

/// 2024-04-01 00:00, the start of the billing year.
pub fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 4, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Half-hourly constant series.
pub fn constant_forecast(n: usize, demand_kw: f64, pv_kw: f64, price: f64) -> SeriesForecast {
    SeriesForecast::constant(start(), ChronoDuration::minutes(30), n, demand_kw, pv_kw, price)
        .unwrap()
}

/// Small run with the default battery and tariff.
pub fn small_config(total_steps: usize, horizon: usize) -> DispatchConfig {
    DispatchConfig {
        total_steps,
        horizon,
        solver_budget: Duration::from_secs(30),
        progress_every: 0,
        ..DispatchConfig::default()
    }
}

/// Default battery starting empty.
pub fn empty_battery() -> BatterySpec {
    BatterySpec {
        initial_soc_kwh: 0.0,
        ..BatterySpec::default()
    }
}

/// Reports the same status for every window, without values.
pub struct FixedStatus(pub SolveStatus);

impl Solver for FixedStatus {
    fn solve(&self, _: &LinearProgram, _: Duration) -> Result<SolveOutcome, SolverError> {
        Ok(SolveOutcome::without_values(self.0, Duration::ZERO))
    }
}

/// Wraps a solver and returns an adapter error on call `fail_at`.
pub struct FailOnCall<S> {
    pub inner: S,
    pub fail_at: usize,
    pub calls: Cell<usize>,
}

impl<S> FailOnCall<S> {
    pub fn new(inner: S, fail_at: usize) -> Self {
        Self {
            inner,
            fail_at,
            calls: Cell::new(0),
        }
    }
}

impl<S: Solver> Solver for FailOnCall<S> {
    fn solve(&self, program: &LinearProgram, budget: Duration) -> Result<SolveOutcome, SolverError> {
        let n = self.calls.get();
        self.calls.set(n + 1);
        if n == self.fail_at {
            return Err(SolverError::WorkerLost);
        }
        self.inner.solve(program, budget)
    }
}

/// Solves optimally, then relabels the outcome as a timeout that still
/// carries its incumbent.
pub struct TimeoutWithIncumbent<S>(pub S);

impl<S: Solver> Solver for TimeoutWithIncumbent<S> {
    fn solve(&self, program: &LinearProgram, budget: Duration) -> Result<SolveOutcome, SolverError> {
        let mut outcome = self.0.solve(program, budget)?;
        outcome.status = SolveStatus::Timeout;
        Ok(outcome)
    }
}

pub fn assert_close(actual: f64, expected: f64, tol: f64) {
    assert!(
        (actual - expected).abs() <= tol,
        "expected {expected}, got {actual} (tol {tol})"
    );
}
