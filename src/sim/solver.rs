//! Solver adapter: solves a [`LinearProgram`] under a wall-clock budget.
//!
//! [`GoodLpSolver`] translates the program into `good_lp` and solves it with
//! the pure-Rust `microlp` backend on a worker thread. The caller waits at
//! most the budget; a worker that overruns keeps running until it finishes
//! and its result is dropped. Only one worker exists at a time.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use good_lp::{
    Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable, constraint,
    microlp, variable,
};
use tracing::{debug, warn};

use crate::error::SolverError;

use super::program::{LinearProgram, Sense, VarKind};
use super::types::SolveStatus;

/// Tolerance for snapping values onto bounds and for accepting constraint
/// residuals (scaled by `1 + |rhs|`).
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Result of one solve call.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    /// One value per program variable; present for `Optimal` and for
    /// `Timeout` with an incumbent.
    pub values: Option<Vec<f64>>,
    pub elapsed: Duration,
}

impl SolveOutcome {
    pub fn optimal(values: Vec<f64>, elapsed: Duration) -> Self {
        Self {
            status: SolveStatus::Optimal,
            values: Some(values),
            elapsed,
        }
    }

    pub fn without_values(status: SolveStatus, elapsed: Duration) -> Self {
        Self {
            status,
            values: None,
            elapsed,
        }
    }

    /// Whether this outcome carries a decision that may be committed.
    pub fn is_usable(&self) -> bool {
        matches!(self.status, SolveStatus::Optimal | SolveStatus::Timeout) && self.values.is_some()
    }
}

/// A black-box optimizer.
///
/// Implementations must return within roughly `budget`, must not change the
/// objective, and report adapter-level failures as `Err`. Infeasibility and
/// numeric trouble are statuses, not errors.
pub trait Solver {
    fn solve(&self, program: &LinearProgram, budget: Duration)
    -> Result<SolveOutcome, SolverError>;
}

impl<S: Solver + ?Sized> Solver for &S {
    fn solve(
        &self,
        program: &LinearProgram,
        budget: Duration,
    ) -> Result<SolveOutcome, SolverError> {
        (**self).solve(program, budget)
    }
}

impl<S: Solver + ?Sized> Solver for Box<S> {
    fn solve(
        &self,
        program: &LinearProgram,
        budget: Duration,
    ) -> Result<SolveOutcome, SolverError> {
        (**self).solve(program, budget)
    }
}

/// `good_lp` + `microlp` backend.
///
/// microlp has no native time limit, so an overrun worker is left to
/// finish on its own. It keeps the single worker slot until it exits;
/// solves requested in the meantime report `Infeasible` without spawning.
#[derive(Debug)]
pub struct GoodLpSolver {
    tolerance: f64,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Default for GoodLpSolver {
    fn default() -> Self {
        Self::with_tolerance(DEFAULT_TOLERANCE)
    }
}

impl GoodLpSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        Self {
            tolerance,
            worker: Mutex::new(None),
        }
    }


    fn finish(&self, program: &LinearProgram, mut values: Vec<f64>, elapsed: Duration) -> SolveOutcome {
        if let Err(var) = program.snap(&mut values, self.tolerance) {
            warn!(variable = %var, "solver returned a value outside its bounds");
            return SolveOutcome::without_values(SolveStatus::Error, elapsed);
        }
        if let Some((name, residual)) = program.worst_violation(&values) {
            if residual > self.tolerance {
                warn!(constraint = name, residual, "solver returned a violated constraint");
                return SolveOutcome::without_values(SolveStatus::Error, elapsed);
            }
        }
        SolveOutcome::optimal(values, elapsed)
    }
}

impl Solver for GoodLpSolver {
    fn solve(
        &self,
        program: &LinearProgram,
        budget: Duration,
    ) -> Result<SolveOutcome, SolverError> {
        program.validate()?;

        let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.take() {
            if !previous.is_finished() {
                *slot = Some(previous);
                warn!("previous solve still running; skipping this window");
                return Ok(SolveOutcome::without_values(
                    SolveStatus::Infeasible,
                    Duration::ZERO,
                ));
            }
            let _ = previous.join();
        }

        let started = Instant::now();
        let (tx, rx) = mpsc::channel();
        let owned = program.clone();
        let handle = thread::Builder::new()
            .name("lp-solve".into())
            .spawn(move || {
                // The receiver is gone when the budget expired first.
                let _ = tx.send(solve_with_microlp(&owned));
            })
            .map_err(|e| SolverError::Spawn(e.to_string()))?;

        let received = rx.recv_timeout(budget);
        if matches!(received, Err(RecvTimeoutError::Timeout)) {
            *slot = Some(handle);
        } else {
            let _ = handle.join();
        }

        match received {
            Ok(Ok(values)) => Ok(self.finish(program, values, started.elapsed())),
            Ok(Err(ResolutionError::Infeasible)) => Ok(SolveOutcome::without_values(
                SolveStatus::Infeasible,
                started.elapsed(),
            )),
            Ok(Err(e)) => {
                debug!(error = %e, "backend failed on a well-formed program");
                Ok(SolveOutcome::without_values(
                    SolveStatus::Error,
                    started.elapsed(),
                ))
            }
            // microlp exposes no incumbent, so an overrun has nothing to commit.
            Err(RecvTimeoutError::Timeout) => {
                warn!(budget_ms = budget.as_millis() as u64, "solve exceeded its time budget");
                Ok(SolveOutcome::without_values(
                    SolveStatus::Infeasible,
                    started.elapsed(),
                ))
            }
            Err(RecvTimeoutError::Disconnected) => Err(SolverError::WorkerLost),
        }
    }
}

fn solve_with_microlp(program: &LinearProgram) -> Result<Vec<f64>, ResolutionError> {
    let mut problem = ProblemVariables::new();
    let handles: Vec<Variable> = program
        .variables()
        .iter()
        .map(|v| {
            let mut def = variable().name(v.name.clone());
            if v.kind == VarKind::Binary {
                def = def.binary();
            }
            if v.lower.is_finite() {
                def = def.min(v.lower);
            }
            if v.upper.is_finite() {
                def = def.max(v.upper);
            }
            problem.add(def)
        })
        .collect();

    let to_expr = |terms: &[(super::program::VarId, f64)]| -> Expression {
        let mut e = Expression::from(0.0);
        for &(var, coef) in terms {
            e += coef * handles[var.index()];
        }
        e
    };

    let objective = to_expr(&program.objective().terms);
    let mut model = problem.minimise(objective).using(microlp);
    for c in program.constraints() {
        let lhs = to_expr(&c.expr.terms);
        let rhs = c.rhs;
        model = model.with(match c.sense {
            Sense::Le => constraint!(lhs <= rhs),
            Sense::Ge => constraint!(lhs >= rhs),
            Sense::Eq => constraint!(lhs == rhs),
        });
    }

    let solution = model.solve()?;
    Ok(handles.iter().map(|&h| solution.value(h)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::program::LinearExpr;

    const BUDGET: Duration = Duration::from_secs(30);

    fn busy(solver: &GoodLpSolver) -> bool {
        solver
            .worker
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    #[test]
    fn solves_small_lp_to_optimality() {
        // min x + 2y  s.t. x + y >= 3, y >= 1
        let mut p = LinearProgram::new();
        let x = p.add_continuous("x", 0.0, f64::INFINITY);
        let y = p.add_continuous("y", 1.0, f64::INFINITY);
        p.add_constraint(
            "sum",
            LinearExpr::new().with(x, 1.0).with(y, 1.0),
            Sense::Ge,
            3.0,
        );
        p.set_objective(LinearExpr::new().with(x, 1.0).with(y, 2.0));

        let out = GoodLpSolver::new().solve(&p, BUDGET).unwrap();
        assert_eq!(out.status, SolveStatus::Optimal);
        let v = out.values.unwrap();
        assert!((v[0] - 2.0).abs() < 1e-6);
        assert!((v[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn reports_infeasible_as_status() {
        let mut p = LinearProgram::new();
        let x = p.add_continuous("x", 0.0, 1.0);
        p.add_constraint("too_big", LinearExpr::new().with(x, 1.0), Sense::Eq, 5.0);
        p.set_objective(LinearExpr::new().with(x, 1.0));

        let out = GoodLpSolver::new().solve(&p, BUDGET).unwrap();
        assert_eq!(out.status, SolveStatus::Infeasible);
        assert!(out.values.is_none());
        assert!(!out.is_usable());
    }

    #[test]
    fn binary_variable_takes_integral_value() {
        // min -x + 0.5 z  s.t. x <= 4 z, x <= 3
        let mut p = LinearProgram::new();
        let x = p.add_continuous("x", 0.0, 3.0);
        let z = p.add_binary("z");
        p.add_constraint(
            "link",
            LinearExpr::new().with(x, 1.0).with(z, -4.0),
            Sense::Le,
            0.0,
        );
        p.set_objective(LinearExpr::new().with(x, -1.0).with(z, 0.5));

        let out = GoodLpSolver::new().solve(&p, BUDGET).unwrap();
        let v = out.values.unwrap();
        assert_eq!(v[1], 1.0);
        assert!((v[0] - 3.0).abs() < 1e-6);
    }

    #[test]
    fn malformed_program_is_an_error() {
        let mut p = LinearProgram::new();
        p.add_continuous("crossed", 1.0, 0.0);
        let err = GoodLpSolver::new().solve(&p, BUDGET).unwrap_err();
        assert!(matches!(err, SolverError::MalformedModel { .. }));
    }

    #[test]
    fn busy_worker_slot_skips_the_solve() {
        let mut p = LinearProgram::new();
        let x = p.add_continuous("x", 1.0, 2.0);
        p.set_objective(LinearExpr::new().with(x, 1.0));

        let solver = GoodLpSolver::new();
        let (release, wait) = mpsc::channel::<()>();
        let stuck = thread::spawn(move || {
            let _ = wait.recv();
        });
        *solver.worker.lock().unwrap() = Some(stuck);
        assert!(busy(&solver));

        let out = solver.solve(&p, BUDGET).unwrap();
        assert_eq!(out.status, SolveStatus::Infeasible);
        assert!(out.values.is_none());
        assert!(busy(&solver));

        release.send(()).unwrap();
        while busy(&solver) {
            thread::sleep(Duration::from_millis(1));
        }
        let out = solver.solve(&p, BUDGET).unwrap();
        assert_eq!(out.status, SolveStatus::Optimal);
        assert!(!busy(&solver));
    }

    #[test]
    fn completed_solve_leaves_the_slot_free() {
        let mut p = LinearProgram::new();
        let x = p.add_continuous("x", 0.0, 5.0);
        p.set_objective(LinearExpr::new().with(x, -1.0));

        let solver = GoodLpSolver::new();
        for _ in 0..3 {
            assert_eq!(solver.solve(&p, BUDGET).unwrap().status, SolveStatus::Optimal);
            assert!(solver.worker.lock().unwrap().is_none());
        }
    }

    #[test]
    fn usable_requires_values() {
        let o = SolveOutcome::without_values(SolveStatus::Timeout, Duration::ZERO);
        assert!(!o.is_usable());
        let o = SolveOutcome {
            status: SolveStatus::Timeout,
            values: Some(vec![1.0]),
            elapsed: Duration::ZERO,
        };
        assert!(o.is_usable());
    }
}
