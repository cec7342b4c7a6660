//! Core dispatch types: run configuration, per-step decisions, and results.

use std::fmt;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::cost::Tariff;

/// Hours in a non-leap year; basis for amortizing the annual basic charge.
pub const HOURS_PER_YEAR: f64 = 8760.0;

/// Run-wide configuration handed to the rolling controller at construction.
///
/// Built once from a scenario file (see [`crate::config`]) or directly in
/// code. Nothing reads configuration from global state.
///
/// # Examples
///
/// ```
/// use rolling_dispatch::sim::types::DispatchConfig;
///
/// let cfg = DispatchConfig::default();
/// assert_eq!(cfg.total_steps, 17_520);
/// assert_eq!(cfg.horizon, 48);
/// assert_eq!(cfg.dt_hours, 0.5);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct DispatchConfig {
    /// Number of steps in the run (T).
    pub total_steps: usize,
    /// Look-ahead window length in steps (H).
    pub horizon: usize,
    /// Step duration in hours (Δ).
    pub dt_hours: f64,
    pub battery: BatterySpec,
    pub grid: GridSpec,
    pub tariff: Tariff,
    pub objective: ObjectiveSpec,
    /// Wall-clock budget for a single window solve.
    pub solver_budget: Duration,
    /// Emit a progress log line every this many steps (0 disables).
    pub progress_every: usize,
    /// Largest power-balance residual accepted on a committed step (kW).
    pub balance_tolerance_kw: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            total_steps: 17_520,
            horizon: 48,
            dt_hours: 0.5,
            battery: BatterySpec::default(),
            grid: GridSpec::default(),
            tariff: Tariff::default(),
            objective: ObjectiveSpec::default(),
            solver_budget: Duration::from_secs(10),
            progress_every: 100,
            balance_tolerance_kw: 1e-4,
        }
    }
}

impl DispatchConfig {
    /// Weight on the purchase-cap proxy for a window of `window_len` steps.
    pub fn cap_weight(&self, window_len: usize) -> f64 {
        match self.objective.cap_weight {
            CapWeight::Fixed(w) => w,
            CapWeight::Amortized => {
                let window_hours = window_len as f64 * self.dt_hours;
                self.tariff.basic_per_kw_year() * window_hours / HOURS_PER_YEAR
            }
        }
    }
}

/// Battery parameters. Charge and discharge limits are battery-side powers.
#[derive(Debug, Clone, Serialize)]
pub struct BatterySpec {
    /// Usable capacity (kWh). Zero disables the battery.
    pub capacity_kwh: f64,
    /// Rated charge power, battery side (kW).
    pub max_charge_kw: f64,
    /// Rated discharge power, battery side (kW).
    pub max_discharge_kw: f64,
    /// Grid-to-cell efficiency; the grid side draws `charge / eta_charge`.
    pub eta_charge: f64,
    /// Cell-to-grid efficiency; the grid side receives `discharge * eta_discharge`.
    pub eta_discharge: f64,
    /// Stored energy at step 0 (kWh).
    pub initial_soc_kwh: f64,
    /// Lower operating bound as a fraction of capacity.
    pub soc_min_frac: f64,
    /// Upper operating bound as a fraction of capacity.
    pub soc_max_frac: f64,
    /// Forbid charging and discharging in the same step (adds binaries).
    pub exclusive_charge_discharge: bool,
}

impl Default for BatterySpec {
    fn default() -> Self {
        Self {
            capacity_kwh: 860.0,
            max_charge_kw: 400.0,
            max_discharge_kw: 400.0,
            eta_charge: 0.98,
            eta_discharge: 0.98,
            initial_soc_kwh: 430.0,
            soc_min_frac: 0.0,
            soc_max_frac: 1.0,
            exclusive_charge_discharge: true,
        }
    }
}

impl BatterySpec {
    /// Operating soc range in kWh.
    pub fn soc_bounds_kwh(&self) -> (f64, f64) {
        (
            self.capacity_kwh * self.soc_min_frac,
            self.capacity_kwh * self.soc_max_frac,
        )
    }

    /// A battery without capacity never moves energy.
    pub fn is_present(&self) -> bool {
        self.capacity_kwh > 0.0
    }

    /// No battery at all.
    pub fn none() -> Self {
        Self {
            capacity_kwh: 0.0,
            max_charge_kw: 0.0,
            max_discharge_kw: 0.0,
            initial_soc_kwh: 0.0,
            ..Self::default()
        }
    }
}

/// Grid connection parameters.
#[derive(Debug, Clone, Serialize)]
pub struct GridSpec {
    /// Permit exporting power. When `false`, sale is fixed to zero.
    pub allow_reverse_flow: bool,
    /// Export limit when reverse flow is allowed (kW); `None` is unbounded.
    pub max_sale_kw: Option<f64>,
    /// Price received per exported kWh.
    pub sell_price_per_kwh: f64,
    /// Upper bound on the purchase-cap proxy (kW); `None` is unbounded.
    pub max_purchase_kw: Option<f64>,
    /// Demand-side conversion efficiency; the served load is `demand / alpha`.
    pub demand_efficiency: f64,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            allow_reverse_flow: false,
            max_sale_kw: None,
            sell_price_per_kwh: 0.0,
            max_purchase_kw: None,
            demand_efficiency: 1.0,
        }
    }
}

impl GridSpec {
    /// Grid-side load for a raw demand value.
    pub fn served_demand_kw(&self, demand_kw: f64) -> f64 {
        demand_kw / self.demand_efficiency
    }
}

/// How the per-window purchase-cap proxy is priced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapWeight {
    /// Annual basic charge per kW scaled to the window's duration.
    Amortized,
    /// Constant weight per kW regardless of window length.
    Fixed(f64),
}

/// Objective shaping parameters.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectiveSpec {
    pub cap_weight: CapWeight,
    /// Reward per kWh-step of stored energy, used to break ties between
    /// storing and curtailing free energy. Must stay far below any price.
    pub soc_tie_break: f64,
}

impl Default for ObjectiveSpec {
    fn default() -> Self {
        Self {
            cap_weight: CapWeight::Amortized,
            soc_tie_break: 1e-6,
        }
    }
}

/// Outcome class of one window solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Timeout,
    Error,
}

impl SolveStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Optimal => "optimal",
            Self::Infeasible => "infeasible",
            Self::Timeout => "timeout",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision committed for a single step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Dispatch {
    pub pv_used_kw: f64,
    pub purchase_kw: f64,
    pub sale_kw: f64,
    pub charge_kw: f64,
    pub discharge_kw: f64,
}

impl Dispatch {
    /// Change in stored energy over one step (kWh).
    pub fn soc_delta_kwh(&self, dt_hours: f64) -> f64 {
        (self.charge_kw - self.discharge_kw) * dt_hours
    }
}

/// Recorded outcome of one step. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub step: usize,
    pub timestamp: NaiveDateTime,
    pub status: SolveStatus,
    pub demand_kw: f64,
    pub pv_available_kw: f64,
    pub pv_used_kw: f64,
    pub pv_curtailed_kw: f64,
    pub purchase_kw: f64,
    pub sale_kw: f64,
    pub charge_kw: f64,
    pub discharge_kw: f64,
    /// Stored energy after the step (kWh).
    pub soc_kwh: f64,
    pub price_per_kwh: f64,
    /// Window purchase-cap proxy; absent when the fallback was applied.
    pub purchase_cap_kw: Option<f64>,
    /// Number of forecast steps the window actually covered.
    pub window_len: usize,
}

impl StepResult {
    pub fn is_optimal(&self) -> bool {
        self.status == SolveStatus::Optimal
    }

    pub fn dispatch(&self) -> Dispatch {
        Dispatch {
            pv_used_kw: self.pv_used_kw,
            purchase_kw: self.purchase_kw,
            sale_kw: self.sale_kw,
            charge_kw: self.charge_kw,
            discharge_kw: self.discharge_kw,
        }
    }
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "k={:05} {} [{}] demand={:.2}kW pv={:.2}/{:.2}kW buy={:.2}kW sell={:.2}kW \
             ch={:.2}kW dis={:.2}kW soc={:.2}kWh",
            self.step,
            self.timestamp.format("%Y-%m-%d %H:%M"),
            self.status,
            self.demand_kw,
            self.pv_used_kw,
            self.pv_available_kw,
            self.purchase_kw,
            self.sale_kw,
            self.charge_kw,
            self.discharge_kw,
            self.soc_kwh,
        )
    }
}
