//! Rolling (receding-horizon) controller.
//!
//! Each step walks `Building -> Solving -> Applying -> Recording -> Advancing`:
//! build the window program from the current soc, solve it under the time
//! budget, commit only the first window step (or the fallback), append the
//! result, then fold it into the system state.

use std::fmt;

use chrono::Duration as ChronoDuration;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{ConstraintSnapshot, RunError, SolverError, StepFailure};
use crate::forecast::{ForecastFeed, ForecastPoint, ForecastWindow};

use super::clock::Clock;
use super::fallback::fallback_dispatch;
use super::model::{WindowModel, build_window};
use super::power_balance::balance_residual_kw;
use super::record::AnnualRecord;
use super::solver::{DEFAULT_TOLERANCE, Solver};
use super::state::SystemState;
use super::types::{Dispatch, DispatchConfig, SolveStatus, StepResult};

/// Where the controller is in its per-step cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Ready,
    Building,
    Solving,
    Applying,
    Recording,
    Advancing,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Drives the full run over a forecast feed with a solver backend.
///
/// Generic over the feed and the solver for static dispatch; tests swap in
/// scripted solvers. The controller is the only owner of the
/// [`SystemState`] and the [`AnnualRecord`].
pub struct RollingController<F: ForecastFeed, S: Solver> {
    config: DispatchConfig,
    forecast: F,
    solver: S,
    clock: Clock,
    state: SystemState,
    record: AnnualRecord,
    phase: Phase,
}

impl<F: ForecastFeed, S: Solver> RollingController<F, S> {
    /// Creates a controller positioned at step 0.
    ///
    /// # Errors
    ///
    /// [`RunError::ZeroHorizon`] for a zero horizon and
    /// [`RunError::ForecastTooShort`] when the feed has fewer than
    /// `total_steps` points.
    pub fn new(config: DispatchConfig, forecast: F, solver: S) -> Result<Self, RunError> {
        if config.horizon == 0 {
            return Err(RunError::ZeroHorizon);
        }
        if forecast.len() < config.total_steps {
            return Err(RunError::ForecastTooShort {
                required: config.total_steps,
                available: forecast.len(),
            });
        }
        let start = forecast.point(0).map(|p| p.timestamp).unwrap_or_default();
        let step = ChronoDuration::seconds((config.dt_hours * 3600.0).round() as i64);
        let clock = Clock::new(start, step, config.total_steps);
        let state = SystemState::new(config.battery.initial_soc_kwh);
        let record = AnnualRecord::with_capacity(config.total_steps);
        let phase = if config.total_steps == 0 {
            Phase::Done
        } else {
            Phase::Ready
        };
        Ok(Self {
            config,
            forecast,
            solver,
            clock,
            state,
            record,
            phase,
        })
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &SystemState {
        &self.state
    }

    /// Steps recorded so far; stays readable after a failure.
    pub fn record(&self) -> &AnnualRecord {
        &self.record
    }

    pub fn into_record(self) -> AnnualRecord {
        self.record
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Runs one step.
    ///
    /// Returns `Ok(None)` once every step has run. Infeasible, timed-out and
    /// errored solves are recorded with their status and the fallback
    /// action; only adapter or model-building failures return `Err`, after
    /// which the controller stays `Failed`.
    pub fn step(&mut self) -> Result<Option<&StepResult>, RunError> {
        match self.phase {
            Phase::Done => return Ok(None),
            Phase::Failed => {
                return Err(RunError::Aborted {
                    step: self.state.step(),
                });
            }
            _ => {}
        }
        let Some(k) = self.clock.tick() else {
            self.phase = Phase::Done;
            return Ok(None);
        };

        self.enter(Phase::Building);
        let soc = self.state.soc_kwh();
        let horizon = self.config.horizon.min(self.config.total_steps - k);
        let window = self.forecast.window(k, horizon);
        let Some(&point) = window.first() else {
            let ts = self.clock.timestamp(k);
            let snapshot = snapshot(soc, &window, None, None);
            return Err(self.abort(k, ts, crate::error::ModelError::EmptyWindow.into(), snapshot));
        };
        let window_len = window.len();
        let model = match build_window(&self.config, soc, &window) {
            Ok(model) => model,
            Err(e) => {
                let snapshot = snapshot(soc, &window, Some(&point), e.offending());
                return Err(self.abort(k, point.timestamp, e.into(), snapshot));
            }
        };

        self.phase = Phase::Solving;
        let outcome = match self.solver.solve(&model.program, self.config.solver_budget) {
            Ok(outcome) => outcome,
            Err(e) => {
                let offending = match &e {
                    SolverError::MalformedModel { location, .. } => Some(location.clone()),
                    _ => None,
                };
                let snapshot = ConstraintSnapshot {
                    soc_kwh: soc,
                    window_len,
                    demand_kw: point.demand_kw,
                    pv_kw: point.pv_kw,
                    price_per_kwh: point.price_per_kwh,
                    offending,
                };
                return Err(self.abort(k, point.timestamp, e.into(), snapshot));
            }
        };

        self.phase = Phase::Applying;
        let expected = model.program.variables().len();
        if let Some(found) = outcome.values.as_ref().map(Vec::len).filter(|&n| n != expected) {
            let snapshot = snapshot(soc, &window, Some(&point), None);
            let cause = SolverError::ValueCount { expected, found };
            return Err(self.abort(k, point.timestamp, cause.into(), snapshot));
        }
        let usable = outcome.is_usable();
        let committed = match outcome.values {
            Some(mut values) if usable => {
                self.accept(k, &model, &point, soc, &mut values, outcome.status)
            }
            _ => None,
        };
        let applied = match committed {
            Some(applied) => applied,
            None => {
                let status = match outcome.status {
                    SolveStatus::Optimal => SolveStatus::Error,
                    _ if usable => SolveStatus::Error,
                    other => other,
                };
                warn!(
                    step = k,
                    timestamp = %point.timestamp,
                    status = %status,
                    "no usable solution; buying full demand"
                );
                Applied {
                    status,
                    dispatch: fallback_dispatch(&point, &self.config.grid),
                    purchase_cap_kw: None,
                    soc_kwh: soc,
                }
            }
        };
        let result = self.result_for(k, &point, applied, window_len);
        debug!(elapsed_ms = outcome.elapsed.as_millis() as u64, "{result}");

        self.enter(Phase::Recording);
        self.record.push(result);

        self.enter(Phase::Advancing);
        if let Some(recorded) = self.record.last() {
            self.state.absorb(recorded, self.config.dt_hours);
        }
        self.log_progress();

        self.phase = if self.clock.is_done() {
            Phase::Done
        } else {
            Phase::Ready
        };
        Ok(self.record.last())
    }

    /// Runs every remaining step.
    ///
    /// On a fatal step error the partial record is kept and can be read
    /// through [`record`](Self::record).
    #[instrument(skip(self), fields(total_steps = self.config.total_steps, horizon = self.config.horizon))]
    pub fn run(&mut self) -> Result<&AnnualRecord, RunError> {
        info!("rolling run started");
        while self.step()?.is_some() {}
        info!(
            steps = self.record.len(),
            peak_purchase_kw = self.state.peak_purchase_kw(),
            "rolling run finished"
        );
        Ok(&self.record)
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
    }

    fn result_for(
        &self,
        k: usize,
        point: &ForecastPoint,
        applied: Applied,
        window_len: usize,
    ) -> StepResult {
        let Applied {
            status,
            dispatch,
            purchase_cap_kw,
            soc_kwh,
        } = applied;
        StepResult {
            step: k,
            timestamp: point.timestamp,
            status,
            demand_kw: point.demand_kw,
            pv_available_kw: point.pv_kw,
            pv_used_kw: dispatch.pv_used_kw,
            pv_curtailed_kw: (point.pv_kw - dispatch.pv_used_kw).max(0.0),
            purchase_kw: dispatch.purchase_kw,
            sale_kw: dispatch.sale_kw,
            charge_kw: dispatch.charge_kw,
            discharge_kw: dispatch.discharge_kw,
            soc_kwh,
            price_per_kwh: point.price_per_kwh,
            purchase_cap_kw,
            window_len,
        }
    }

    /// Checks a solver's values against the window program and the power
    /// balance of the first step. `None` means the step takes the fallback.
    fn accept(
        &self,
        k: usize,
        model: &WindowModel,
        point: &ForecastPoint,
        soc_before: f64,
        values: &mut [f64],
        status: SolveStatus,
    ) -> Option<Applied> {
        if let Err(variable) = model.program.snap(values, DEFAULT_TOLERANCE) {
            warn!(step = k, %variable, "solution leaves its bounds; using fallback");
            return None;
        }
        if let Some((constraint, residual)) = model.program.worst_violation(values) {
            if residual > DEFAULT_TOLERANCE {
                warn!(
                    step = k,
                    constraint,
                    residual,
                    "solution violates the window program; using fallback"
                );
                return None;
            }
        }
        let dispatch = model.first_dispatch(values);
        let residual = balance_residual_kw(
            point.demand_kw,
            &dispatch,
            &self.config.battery,
            &self.config.grid,
        );
        if residual.abs() > self.config.balance_tolerance_kw {
            warn!(step = k, residual, "committed step does not balance; using fallback");
            return None;
        }
        // Stored energy must move by exactly what the first step charges.
        let soc_kwh = model.first_soc(values);
        let drift = soc_kwh - (soc_before + dispatch.soc_delta_kwh(self.config.dt_hours));
        if drift.abs() > DEFAULT_TOLERANCE * (1.0 + soc_before.abs()) {
            warn!(step = k, drift, "soc does not follow the committed flows; using fallback");
            return None;
        }
        debug!(step = k, objective = model.program.objective_value(values), "window accepted");
        Some(Applied {
            status,
            dispatch,
            purchase_cap_kw: Some(model.cap_value(values)),
            soc_kwh,
        })
    }

    fn log_progress(&self) {
        let every = self.config.progress_every;
        let done = self.record.len();
        if every > 0 && done % every == 0 {
            let optimal = self.record.count_status(SolveStatus::Optimal);
            info!(
                step = done,
                total = self.clock.total(),
                soc_kwh = self.state.soc_kwh(),
                peak_purchase_kw = self.state.peak_purchase_kw(),
                optimal,
                "progress"
            );
        }
    }

    fn abort(
        &mut self,
        step: usize,
        timestamp: chrono::NaiveDateTime,
        cause: StepFailure,
        snapshot: ConstraintSnapshot,
    ) -> RunError {
        self.phase = Phase::Failed;
        error!(step, %timestamp, %cause, %snapshot, "rolling run aborted");
        RunError::StepFailed {
            step,
            timestamp,
            cause,
            snapshot: Box::new(snapshot),
        }
    }
}

/// What a step commits: an accepted first-step decision or the fallback.
struct Applied {
    status: SolveStatus,
    dispatch: Dispatch,
    /// `None` for fallback steps.
    purchase_cap_kw: Option<f64>,
    /// Stored energy after the step.
    soc_kwh: f64,
}

fn snapshot(
    soc_kwh: f64,
    window: &ForecastWindow<'_>,
    point: Option<&ForecastPoint>,
    offending: Option<String>,
) -> ConstraintSnapshot {
    ConstraintSnapshot {
        soc_kwh,
        window_len: window.len(),
        demand_kw: point.map_or(f64::NAN, |p| p.demand_kw),
        pv_kw: point.map_or(f64::NAN, |p| p.pv_kw),
        price_per_kwh: point.map_or(f64::NAN, |p| p.price_per_kwh),
        offending,
    }
}
