//! Backend-agnostic linear / mixed-integer program.
//!
//! The model builder produces a [`LinearProgram`]; a [`Solver`](super::solver::Solver)
//! translates it into whatever backend it wraps. Keeping the program as plain
//! owned data lets it cross a thread boundary and be inspected in tests.

use std::fmt;

use crate::error::SolverError;

/// Index of a variable within its program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Continuous,
    Binary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
    /// Lower bound; may be `-inf`.
    pub lower: f64,
    /// Upper bound; may be `+inf`.
    pub upper: f64,
}

/// Constraint relation between the expression and the right-hand side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Le,
    Ge,
    Eq,
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Eq => "==",
        })
    }
}

/// `Σ coef · var`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    pub terms: Vec<(VarId, f64)>,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, var: VarId, coef: f64) -> Self {
        self.terms.push((var, coef));
        self
    }

    pub fn add(&mut self, var: VarId, coef: f64) {
        self.terms.push((var, coef));
    }

    /// Value of the expression at `values`.
    pub fn eval(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|&(v, c)| c * values.get(v.0).copied().unwrap_or(0.0))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub name: String,
    pub expr: LinearExpr,
    pub sense: Sense,
    pub rhs: f64,
}

impl Constraint {
    /// Amount by which `values` violate this constraint (0 when satisfied).
    pub fn violation(&self, values: &[f64]) -> f64 {
        let lhs = self.expr.eval(values);
        match self.sense {
            Sense::Le => (lhs - self.rhs).max(0.0),
            Sense::Ge => (self.rhs - lhs).max(0.0),
            Sense::Eq => (lhs - self.rhs).abs(),
        }
    }
}

/// A minimization problem.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearProgram {
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
    objective: LinearExpr,
}

impl LinearProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_continuous(&mut self, name: impl Into<String>, lower: f64, upper: f64) -> VarId {
        self.push_var(name.into(), VarKind::Continuous, lower, upper)
    }

    pub fn add_binary(&mut self, name: impl Into<String>) -> VarId {
        self.push_var(name.into(), VarKind::Binary, 0.0, 1.0)
    }

    fn push_var(&mut self, name: String, kind: VarKind, lower: f64, upper: f64) -> VarId {
        self.variables.push(Variable {
            name,
            kind,
            lower,
            upper,
        });
        VarId(self.variables.len() - 1)
    }

    pub fn add_constraint(
        &mut self,
        name: impl Into<String>,
        expr: LinearExpr,
        sense: Sense,
        rhs: f64,
    ) {
        self.constraints.push(Constraint {
            name: name.into(),
            expr,
            sense,
            rhs,
        });
    }

    pub fn set_objective(&mut self, objective: LinearExpr) {
        self.objective = objective;
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.0]
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &LinearExpr {
        &self.objective
    }

    pub fn has_integers(&self) -> bool {
        self.variables.iter().any(|v| v.kind == VarKind::Binary)
    }

    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.objective.eval(values)
    }

    /// Checks that every id is in range, every number is finite, and no
    /// variable has crossed bounds.
    pub fn validate(&self) -> Result<(), SolverError> {
        for v in &self.variables {
            if v.lower.is_nan() || v.upper.is_nan() || v.lower == f64::INFINITY {
                return Err(malformed(&v.name, "bound is not a number"));
            }
            if v.lower > v.upper {
                return Err(malformed(
                    &v.name,
                    format!("lower bound {} exceeds upper bound {}", v.lower, v.upper),
                ));
            }
        }
        self.check_expr("objective", &self.objective)?;
        for c in &self.constraints {
            self.check_expr(&c.name, &c.expr)?;
            if !c.rhs.is_finite() {
                return Err(malformed(&c.name, format!("right-hand side is {}", c.rhs)));
            }
        }
        Ok(())
    }

    fn check_expr(&self, location: &str, expr: &LinearExpr) -> Result<(), SolverError> {
        for &(var, coef) in &expr.terms {
            if var.0 >= self.variables.len() {
                return Err(malformed(
                    location,
                    format!("variable index {} out of range", var.0),
                ));
            }
            if !coef.is_finite() {
                return Err(malformed(
                    location,
                    format!("coefficient {coef} on {}", self.variables[var.0].name),
                ));
            }
        }
        Ok(())
    }

    /// Pulls values that sit within `tol` outside a bound back onto it and
    /// rounds binaries. Returns the name of the first variable that is
    /// further out than `tol`.
    pub fn snap(&self, values: &mut [f64], tol: f64) -> Result<(), String> {
        for (v, x) in self.variables.iter().zip(values.iter_mut()) {
            if !x.is_finite() {
                return Err(v.name.clone());
            }
            if *x < v.lower {
                if v.lower - *x > tol {
                    return Err(v.name.clone());
                }
                *x = v.lower;
            } else if *x > v.upper {
                if *x - v.upper > tol {
                    return Err(v.name.clone());
                }
                *x = v.upper;
            }
            if v.kind == VarKind::Binary {
                let r = x.round();
                if (*x - r).abs() > tol {
                    return Err(v.name.clone());
                }
                *x = r;
            }
        }
        Ok(())
    }

    /// Largest constraint violation, scaled by `1 + |rhs|`, and its name.
    pub fn worst_violation(&self, values: &[f64]) -> Option<(&str, f64)> {
        self.constraints
            .iter()
            .map(|c| (c.name.as_str(), c.violation(values) / (1.0 + c.rhs.abs())))
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

fn malformed(location: &str, reason: impl Into<String>) -> SolverError {
    SolverError::MalformedModel {
        location: location.to_string(),
        reason: reason.into(),
    }
}
