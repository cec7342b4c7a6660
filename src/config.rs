//! TOML-based scenario configuration and preset definitions.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use thiserror::Error;

use crate::error::ForecastError;
use crate::forecast::{SeriesForecast, SyntheticForecast};
use crate::sim::cost::{DEFAULT_FUEL_ADJUSTMENT, Tariff};
use crate::sim::types::{
    BatterySpec, CapWeight, DispatchConfig, GridSpec, ObjectiveSpec,
};

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the baseline scenario. Load from
/// TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default, then convert with
/// [`ScenarioConfig::dispatch_config`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Run length, step and horizon.
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub battery: BatteryConfig,
    /// Grid connection limits and prices.
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub tariff: TariffConfig,
    /// Per-window solve settings.
    #[serde(default)]
    pub solver: SolverConfig,
    /// Where demand, PV and price come from.
    #[serde(default)]
    pub forecast: ForecastConfig,
}

/// Run length and timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Number of steps to run (17,520 = one year of half hours).
    pub total_steps: usize,
    /// Step duration in minutes.
    pub step_minutes: u32,
    /// Look-ahead window in steps.
    pub horizon: usize,
    /// Timestamp of step 0 (synthetic forecasts only).
    pub start: NaiveDateTime,
    /// Master random seed.
    pub seed: u64,
    /// Progress log interval in steps (0 disables).
    pub progress_every: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            total_steps: 17_520,
            step_minutes: 30,
            horizon: 48,
            start: NaiveDate::from_ymd_opt(2024, 4, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
            seed: 42,
            progress_every: 100,
        }
    }
}

/// Battery storage parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatteryConfig {
    /// Usable capacity (kWh); 0 disables the battery.
    pub capacity_kwh: f64,
    /// Rated charge power, battery side (kW).
    pub max_charge_kw: f64,
    /// Rated discharge power, battery side (kW).
    pub max_discharge_kw: f64,
    /// Charge efficiency (0.0-1.0].
    pub eta_charge: f64,
    /// Discharge efficiency (0.0-1.0].
    pub eta_discharge: f64,
    /// Initial state of charge as a fraction of capacity.
    pub initial_soc: f64,
    /// Lower soc bound as a fraction of capacity.
    pub soc_min: f64,
    /// Upper soc bound as a fraction of capacity.
    pub soc_max: f64,
    /// Forbid simultaneous charge and discharge.
    pub exclusive_charge_discharge: bool,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            capacity_kwh: 860.0,
            max_charge_kw: 400.0,
            max_discharge_kw: 400.0,
            eta_charge: 0.98,
            eta_discharge: 0.98,
            initial_soc: 0.5,
            soc_min: 0.0,
            soc_max: 1.0,
            exclusive_charge_discharge: true,
        }
    }
}

/// Grid connection parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    pub allow_reverse_flow: bool,
    /// Export limit (kW); unbounded when absent.
    pub max_sale_kw: Option<f64>,
    pub sell_price_per_kwh: f64,
    /// Upper bound on the window purchase cap (kW); unbounded when absent.
    pub max_purchase_kw: Option<f64>,
    /// Demand-side conversion efficiency (0.0-1.0].
    pub demand_efficiency: f64,
}

impl Default for GridConfig {
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

/// Tariff parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TariffConfig {
    pub basic_rate_per_kw_month: f64,
    pub basic_discount: f64,
    pub fixed_rate_per_kwh: f64,
    pub renewable_levy_per_kwh: f64,
    /// Twelve monthly values, January first.
    pub fuel_adjustment_per_kwh: Vec<f64>,
    /// Fixed cap-proxy weight per kW; amortized from the basic charge when absent.
    pub cap_weight: Option<f64>,
}

impl Default for TariffConfig {
    fn default() -> Self {
        let t = Tariff::default();
        Self {
            basic_rate_per_kw_month: t.basic_rate_per_kw_month,
            basic_discount: t.basic_discount,
            fixed_rate_per_kwh: t.fixed_rate_per_kwh,
            renewable_levy_per_kwh: t.renewable_levy_per_kwh,
            fuel_adjustment_per_kwh: DEFAULT_FUEL_ADJUSTMENT.to_vec(),
            cap_weight: None,
        }
    }
}

/// Per-window solve settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    /// Wall-clock budget per window (seconds).
    pub time_budget_secs: f64,
    /// Reward per kWh-step of stored energy.
    pub soc_tie_break: f64,
    /// Largest accepted power-balance residual (kW).
    pub balance_tolerance_kw: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            time_budget_secs: 10.0,
            soc_tie_break: 1e-6,
            balance_tolerance_kw: 1e-4,
        }
    }
}

/// Forecast source.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastConfig {
    /// `"synthetic"` or `"csv"`.
    pub source: String,
    /// CSV path, relative to the working directory.
    pub csv_path: Option<PathBuf>,
    pub demand_base_kw: f64,
    pub demand_amp_kw: f64,
    pub demand_peak_hour: f64,
    pub demand_noise_kw: f64,
    pub pv_peak_kw: f64,
    pub sunrise_hour: f64,
    pub sunset_hour: f64,
    pub pv_seasonal_swing: f64,
    pub pv_noise_std: f64,
    pub price_base: f64,
    pub price_peak_lift: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            source: "synthetic".to_string(),
            csv_path: None,
            demand_base_kw: 300.0,
            demand_amp_kw: 120.0,
            demand_peak_hour: 14.0,
            demand_noise_kw: 15.0,
            pv_peak_kw: 500.0,
            sunrise_hour: 6.0,
            sunset_hour: 18.0,
            pv_seasonal_swing: 0.4,
            pv_noise_std: 0.1,
            price_base: 12.0,
            price_peak_lift: 0.8,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.horizon"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl ScenarioConfig {
    /// Returns the baseline scenario: 860 kWh / 400 kW battery, no reverse flow.
    pub fn baseline() -> Self {
        Self::default()
    }

    /// Same site without storage.
    pub fn no_battery() -> Self {
        Self {
            battery: BatteryConfig {
                capacity_kwh: 0.0,
                max_charge_kw: 0.0,
                max_discharge_kw: 0.0,
                initial_soc: 0.0,
                ..BatteryConfig::default()
            },
            ..Self::default()
        }
    }

    /// Export allowed up to the PV peak at a modest feed-in price.
    pub fn reverse_flow() -> Self {
        Self {
            grid: GridConfig {
                allow_reverse_flow: true,
                max_sale_kw: Some(500.0),
                sell_price_per_kwh: 8.0,
                ..GridConfig::default()
            },
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "no_battery", "reverse_flow"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "no_battery" => Ok(Self::no_battery()),
            "reverse_flow" => Ok(Self::reverse_flow()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, field: &str, message: &str| {
            if !ok {
                errors.push(ConfigError::new(field, message));
            }
        };

        let s = &self.simulation;
        check(s.total_steps > 0, "simulation.total_steps", "must be > 0");
        check(s.step_minutes > 0, "simulation.step_minutes", "must be > 0");
        check(s.horizon > 0, "simulation.horizon", "must be > 0");

        let b = &self.battery;
        check(b.capacity_kwh >= 0.0, "battery.capacity_kwh", "must be >= 0");
        check(b.max_charge_kw >= 0.0, "battery.max_charge_kw", "must be >= 0");
        check(b.max_discharge_kw >= 0.0, "battery.max_discharge_kw", "must be >= 0");
        check(
            b.eta_charge > 0.0 && b.eta_charge <= 1.0,
            "battery.eta_charge",
            "must be in (0.0, 1.0]",
        );
        check(
            b.eta_discharge > 0.0 && b.eta_discharge <= 1.0,
            "battery.eta_discharge",
            "must be in (0.0, 1.0]",
        );
        check(
            (0.0..=1.0).contains(&b.soc_min) && (0.0..=1.0).contains(&b.soc_max) && b.soc_min <= b.soc_max,
            "battery.soc_min",
            "must satisfy 0.0 <= soc_min <= soc_max <= 1.0",
        );
        check(
            (b.soc_min..=b.soc_max).contains(&b.initial_soc),
            "battery.initial_soc",
            "must be within [soc_min, soc_max]",
        );

        let g = &self.grid;
        check(
            g.demand_efficiency > 0.0 && g.demand_efficiency <= 1.0,
            "grid.demand_efficiency",
            "must be in (0.0, 1.0]",
        );
        check(
            g.max_sale_kw.is_none_or(|v| v >= 0.0),
            "grid.max_sale_kw",
            "must be >= 0",
        );
        check(
            g.max_purchase_kw.is_none_or(|v| v >= 0.0),
            "grid.max_purchase_kw",
            "must be >= 0",
        );

        let t = &self.tariff;
        check(
            t.fuel_adjustment_per_kwh.len() == 12,
            "tariff.fuel_adjustment_per_kwh",
            "must have 12 monthly values",
        );
        check(t.basic_rate_per_kw_month >= 0.0, "tariff.basic_rate_per_kw_month", "must be >= 0");
        check(t.cap_weight.is_none_or(|w| w >= 0.0), "tariff.cap_weight", "must be >= 0");

        let sv = &self.solver;
        check(
            sv.time_budget_secs.is_finite() && sv.time_budget_secs > 0.0,
            "solver.time_budget_secs",
            "must be > 0",
        );
        check(sv.soc_tie_break >= 0.0, "solver.soc_tie_break", "must be >= 0");
        check(
            sv.balance_tolerance_kw > 0.0,
            "solver.balance_tolerance_kw",
            "must be > 0",
        );

        let f = &self.forecast;
        match f.source.as_str() {
            "synthetic" => check(
                f.sunrise_hour < f.sunset_hour,
                "forecast.sunrise_hour",
                "must be < forecast.sunset_hour",
            ),
            "csv" => check(
                f.csv_path.is_some(),
                "forecast.csv_path",
                "is required when source = \"csv\"",
            ),
            _ => check(false, "forecast.source", "must be \"synthetic\" or \"csv\""),
        }

        errors
    }

    /// Step duration in hours.
    pub fn dt_hours(&self) -> f64 {
        f64::from(self.simulation.step_minutes) / 60.0
    }

    /// Converts the scenario into the controller's run configuration.
    pub fn dispatch_config(&self) -> DispatchConfig {
        let b = &self.battery;
        let g = &self.grid;
        let t = &self.tariff;
        let mut fuel = DEFAULT_FUEL_ADJUSTMENT;
        if t.fuel_adjustment_per_kwh.len() == 12 {
            fuel.copy_from_slice(&t.fuel_adjustment_per_kwh);
        }

        DispatchConfig {
            total_steps: self.simulation.total_steps,
            horizon: self.simulation.horizon,
            dt_hours: self.dt_hours(),
            battery: BatterySpec {
                capacity_kwh: b.capacity_kwh,
                max_charge_kw: b.max_charge_kw,
                max_discharge_kw: b.max_discharge_kw,
                eta_charge: b.eta_charge,
                eta_discharge: b.eta_discharge,
                initial_soc_kwh: b.initial_soc * b.capacity_kwh,
                soc_min_frac: b.soc_min,
                soc_max_frac: b.soc_max,
                exclusive_charge_discharge: b.exclusive_charge_discharge,
            },
            grid: GridSpec {
                allow_reverse_flow: g.allow_reverse_flow,
                max_sale_kw: g.max_sale_kw,
                sell_price_per_kwh: g.sell_price_per_kwh,
                max_purchase_kw: g.max_purchase_kw,
                demand_efficiency: g.demand_efficiency,
            },
            tariff: Tariff {
                basic_rate_per_kw_month: t.basic_rate_per_kw_month,
                basic_discount: t.basic_discount,
                fixed_rate_per_kwh: t.fixed_rate_per_kwh,
                renewable_levy_per_kwh: t.renewable_levy_per_kwh,
                fuel_adjustment_per_kwh: fuel,
            },
            objective: ObjectiveSpec {
                cap_weight: t.cap_weight.map_or(CapWeight::Amortized, CapWeight::Fixed),
                soc_tie_break: self.solver.soc_tie_break,
            },
            solver_budget: Duration::from_secs_f64(self.solver.time_budget_secs),
            progress_every: self.simulation.progress_every,
            balance_tolerance_kw: self.solver.balance_tolerance_kw,
        }
    }

    /// Synthetic generator parameters for this scenario.
    pub fn synthetic_forecast(&self) -> SyntheticForecast {
        let f = &self.forecast;
        SyntheticForecast {
            start: self.simulation.start,
            step: chrono::Duration::minutes(i64::from(self.simulation.step_minutes)),
            total_steps: self.simulation.total_steps,
            seed: self.simulation.seed,
            demand_base_kw: f.demand_base_kw,
            demand_amp_kw: f.demand_amp_kw,
            demand_peak_hour: f.demand_peak_hour,
            demand_noise_kw: f.demand_noise_kw,
            pv_peak_kw: f.pv_peak_kw,
            sunrise_hour: f.sunrise_hour,
            sunset_hour: f.sunset_hour,
            pv_seasonal_swing: f.pv_seasonal_swing,
            pv_noise_std: f.pv_noise_std,
            price_base: f.price_base,
            price_peak_lift: f.price_peak_lift,
        }
    }

    /// Loads or generates the forecast series the scenario names.
    ///
    /// `csv_override` takes precedence over `forecast.csv_path`.
    pub fn load_forecast(&self, csv_override: Option<&Path>) -> Result<SeriesForecast, ForecastError> {
        let step = chrono::Duration::minutes(i64::from(self.simulation.step_minutes));
        let csv = csv_override.or_else(|| {
            (self.forecast.source == "csv")
                .then_some(self.forecast.csv_path.as_deref())
                .flatten()
        });
        match csv {
            Some(path) => SeriesForecast::from_csv_path(path, step),
            None => self.synthetic_forecast().generate(),
        }
    }
}
