//! Post-run cost accounting under two tariff plans.
//!
//! Computed post-hoc from the annual record so the reported figures always
//! match the committed steps. The realized peak here is the authoritative
//! contract power; the per-window cap proxy is only an optimization device.

use std::collections::BTreeMap;
use std::fmt;

use chrono::Datelike;
use serde::Serialize;
use tracing::warn;

use super::types::{DispatchConfig, SolveStatus, StepResult};

/// Default per-month fuel adjustment (currency/kWh), January first.
pub const DEFAULT_FUEL_ADJUSTMENT: [f64; 12] = [
    -8.76, -8.59, -8.56, -8.85, -9.02, -7.47, -5.69, -5.69, -9.60, -9.47, -8.06, -5.83,
];

/// Two-part tariff parameters shared by both plans.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tariff {
    /// Basic charge per kW of contract power per month.
    pub basic_rate_per_kw_month: f64,
    /// Multiplier applied to the basic charge (e.g. power-factor discount).
    pub basic_discount: f64,
    /// Energy rate of the fixed-price plan (per kWh).
    pub fixed_rate_per_kwh: f64,
    /// Levy added per purchased kWh in both plans.
    pub renewable_levy_per_kwh: f64,
    /// Fixed-plan fuel adjustment per kWh by calendar month, January first.
    pub fuel_adjustment_per_kwh: [f64; 12],
}

impl Default for Tariff {
    fn default() -> Self {
        Self {
            basic_rate_per_kw_month: 2829.60,
            basic_discount: 0.85,
            fixed_rate_per_kwh: 21.51,
            renewable_levy_per_kwh: 3.98,
            fuel_adjustment_per_kwh: DEFAULT_FUEL_ADJUSTMENT,
        }
    }
}

impl Tariff {
    /// Discounted basic charge per kW per month.
    pub fn basic_per_kw_month(&self) -> f64 {
        self.basic_rate_per_kw_month * self.basic_discount
    }

    /// Discounted basic charge per kW over a year.
    pub fn basic_per_kw_year(&self) -> f64 {
        self.basic_per_kw_month() * 12.0
    }

    /// Fuel adjustment for calendar `month` (1-12).
    pub fn fuel_adjustment(&self, month: u32) -> f64 {
        self.fuel_adjustment_per_kwh[(month.clamp(1, 12) - 1) as usize]
    }
}

/// Cost components of one plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PlanCost {
    pub basic: f64,
    pub energy: f64,
    pub fuel_adjustment: f64,
    pub renewable_levy: f64,
    /// Credited against the total.
    pub sale_revenue: f64,
    pub total: f64,
}

impl PlanCost {
    fn finish(mut self) -> Self {
        self.total =
            self.basic + self.energy + self.fuel_adjustment + self.renewable_levy - self.sale_revenue;
        self
    }
}

/// Usage within one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonthlyUsage {
    pub year: i32,
    pub month: u32,
    pub steps: usize,
    pub purchased_kwh: f64,
    pub peak_purchase_kw: f64,
    /// Purchase cost at the realized market prices, before levy.
    pub market_energy_cost: f64,
}

/// Step counts by solve status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub optimal: usize,
    pub infeasible: usize,
    pub timeout: usize,
    pub error: usize,
}

impl StatusCounts {
    fn add(&mut self, status: SolveStatus) {
        match status {
            SolveStatus::Optimal => self.optimal += 1,
            SolveStatus::Infeasible => self.infeasible += 1,
            SolveStatus::Timeout => self.timeout += 1,
            SolveStatus::Error => self.error += 1,
        }
    }
}

/// Whether every step was solved to optimality.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Optimality {
    FullyOptimal,
    Degraded { optimal_ratio: f64 },
}

/// End-of-run cost comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostSummary {
    pub steps: usize,
    /// Maximum purchase over the whole record (kW).
    pub peak_purchase_kw: f64,
    pub demand_kwh: f64,
    pub purchased_kwh: f64,
    pub sold_kwh: f64,
    pub pv_available_kwh: f64,
    pub pv_used_kwh: f64,
    pub pv_curtailed_kwh: f64,
    /// Fixed-price plan.
    pub fixed_plan: PlanCost,
    /// Market-linked plan.
    pub market_plan: PlanCost,
    /// `market_plan.total - fixed_plan.total`.
    pub difference: f64,
    /// PV used over demand energy.
    pub pv_self_sufficiency: f64,
    /// PV used over PV available.
    pub pv_utilization: f64,
    pub optimal_ratio: f64,
    pub status_counts: StatusCounts,
    pub optimality: Optimality,
    pub monthly: Vec<MonthlyUsage>,
}

impl CostSummary {
    /// Computes the summary from the complete record.
    ///
    /// # Arguments
    ///
    /// * `record` - Recorded steps in order
    /// * `config` - Supplies the step duration, tariff and sell price
    pub fn from_record(record: &[StepResult], config: &DispatchConfig) -> Self {
        let dt = config.dt_hours;
        let tariff = &config.tariff;

        let mut months: BTreeMap<(i32, u32), MonthlyUsage> = BTreeMap::new();
        let mut counts = StatusCounts::default();
        let mut peak = 0.0_f64;
        let mut demand = 0.0;
        let mut purchased = 0.0;
        let mut sold = 0.0;
        let mut pv_available = 0.0;
        let mut pv_used = 0.0;
        let mut pv_curtailed = 0.0;

        for r in record {
            counts.add(r.status);
            peak = peak.max(r.purchase_kw);
            demand += r.demand_kw * dt;
            purchased += r.purchase_kw * dt;
            sold += r.sale_kw * dt;
            pv_available += r.pv_available_kw * dt;
            pv_used += r.pv_used_kw * dt;
            pv_curtailed += r.pv_curtailed_kw * dt;

            let (year, month) = (r.timestamp.year(), r.timestamp.month());
            let m = months.entry((year, month)).or_insert(MonthlyUsage {
                year,
                month,
                steps: 0,
                purchased_kwh: 0.0,
                peak_purchase_kw: 0.0,
                market_energy_cost: 0.0,
            });
            m.steps += 1;
            m.purchased_kwh += r.purchase_kw * dt;
            m.peak_purchase_kw = m.peak_purchase_kw.max(r.purchase_kw);
            m.market_energy_cost += r.purchase_kw * r.price_per_kwh * dt;
        }

        let monthly: Vec<MonthlyUsage> = months.into_values().collect();
        let basic = peak * tariff.basic_per_kw_month() * monthly.len() as f64;
        let levy = purchased * tariff.renewable_levy_per_kwh;
        let sale_revenue = sold * config.grid.sell_price_per_kwh;

        let fixed_plan = PlanCost {
            basic,
            energy: purchased * tariff.fixed_rate_per_kwh,
            fuel_adjustment: monthly
                .iter()
                .map(|m| m.purchased_kwh * tariff.fuel_adjustment(m.month))
                .sum(),
            renewable_levy: levy,
            sale_revenue,
            total: 0.0,
        }
        .finish();
        let market_plan = PlanCost {
            basic,
            energy: monthly.iter().map(|m| m.market_energy_cost).sum(),
            fuel_adjustment: 0.0,
            renewable_levy: levy,
            sale_revenue,
            total: 0.0,
        }
        .finish();

        let steps = record.len();
        let optimal_ratio = ratio(counts.optimal as f64, steps as f64);
        let optimality = if steps > 0 && counts.optimal == steps {
            Optimality::FullyOptimal
        } else {
            Optimality::Degraded { optimal_ratio }
        };
        if let Optimality::Degraded { optimal_ratio } = optimality {
            warn!(
                optimal_ratio,
                infeasible = counts.infeasible,
                timeout = counts.timeout,
                error = counts.error,
                "cost summary includes non-optimal steps"
            );
        }

        Self {
            steps,
            peak_purchase_kw: peak,
            demand_kwh: demand,
            purchased_kwh: purchased,
            sold_kwh: sold,
            pv_available_kwh: pv_available,
            pv_used_kwh: pv_used,
            pv_curtailed_kwh: pv_curtailed,
            difference: market_plan.total - fixed_plan.total,
            fixed_plan,
            market_plan,
            pv_self_sufficiency: ratio(pv_used, demand),
            pv_utilization: ratio(pv_used, pv_available),
            optimal_ratio,
            status_counts: counts,
            optimality,
            monthly,
        }
    }

    pub fn is_fully_optimal(&self) -> bool {
        self.optimality == Optimality::FullyOptimal
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}

impl fmt::Display for CostSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Cost Summary ---")?;
        writeln!(f, "Steps:                 {}", self.steps)?;
        writeln!(f, "Peak purchase:         {:.2} kW", self.peak_purchase_kw)?;
        writeln!(f, "Purchased energy:      {:.2} kWh", self.purchased_kwh)?;
        writeln!(f, "Sold energy:           {:.2} kWh", self.sold_kwh)?;
        writeln!(
            f,
            "PV used / available:   {:.2} / {:.2} kWh",
            self.pv_used_kwh, self.pv_available_kwh
        )?;
        writeln!(f, "PV self-sufficiency:   {:.2}%", 100.0 * self.pv_self_sufficiency)?;
        writeln!(f, "PV utilization:        {:.2}%", 100.0 * self.pv_utilization)?;
        writeln!(
            f,
            "Fixed plan total:      {:.0} (basic {:.0}, energy {:.0}, fuel {:.0}, levy {:.0})",
            self.fixed_plan.total,
            self.fixed_plan.basic,
            self.fixed_plan.energy,
            self.fixed_plan.fuel_adjustment,
            self.fixed_plan.renewable_levy
        )?;
        writeln!(
            f,
            "Market plan total:     {:.0} (basic {:.0}, energy {:.0}, levy {:.0})",
            self.market_plan.total,
            self.market_plan.basic,
            self.market_plan.energy,
            self.market_plan.renewable_levy
        )?;
        writeln!(f, "Difference (mkt-fix):  {:.0}", self.difference)?;
        write!(
            f,
            "Optimal steps:         {}/{} ({:.2}%)",
            self.status_counts.optimal,
            self.steps,
            100.0 * self.optimal_ratio
        )?;
        if !self.is_fully_optimal() {
            write!(
                f,
                "\nWARNING: {} infeasible, {} timeout, {} error steps used the fallback; \
                 costs are not those of a fully optimal run",
                self.status_counts.infeasible, self.status_counts.timeout, self.status_counts.error
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_result(
        month: u32,
        purchase_kw: f64,
        price: f64,
        status: SolveStatus,
    ) -> StepResult {
        StepResult {
            step: 0,
            timestamp: NaiveDate::from_ymd_opt(2024, month, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            status,
            demand_kw: purchase_kw,
            pv_available_kw: 10.0,
            pv_used_kw: 5.0,
            pv_curtailed_kw: 5.0,
            purchase_kw,
            sale_kw: 0.0,
            charge_kw: 0.0,
            discharge_kw: 0.0,
            soc_kwh: 0.0,
            price_per_kwh: price,
            purchase_cap_kw: None,
            window_len: 1,
        }
    }

    fn cfg() -> DispatchConfig {
        DispatchConfig {
            dt_hours: 1.0,
            ..DispatchConfig::default()
        }
    }

    #[test]
    fn peak_is_exact_record_maximum() {
        let rs = vec![
            make_result(4, 10.0, 5.0, SolveStatus::Optimal),
            make_result(4, 37.25, 5.0, SolveStatus::Optimal),
            make_result(5, 12.0, 5.0, SolveStatus::Optimal),
        ];
        let s = CostSummary::from_record(&rs, &cfg());
        assert_eq!(s.peak_purchase_kw, 37.25);
        assert_eq!(s.monthly.len(), 2);
        assert_eq!(s.monthly[0].peak_purchase_kw, 37.25);
        assert_eq!(s.monthly[1].peak_purchase_kw, 12.0);
    }

    #[test]
    fn basic_charge_uses_annual_peak_each_month() {
        let rs = vec![
            make_result(4, 100.0, 0.0, SolveStatus::Optimal),
            make_result(5, 50.0, 0.0, SolveStatus::Optimal),
        ];
        let s = CostSummary::from_record(&rs, &cfg());
        let expected = 100.0 * 2829.60 * 0.85 * 2.0;
        assert!((s.fixed_plan.basic - expected).abs() < 1e-6);
        assert_eq!(s.fixed_plan.basic, s.market_plan.basic);
    }

    #[test]
    fn fixed_plan_components() {
        // 10 kWh in April: energy 215.1, fuel 10 * -8.85, levy 39.8
        let rs = vec![make_result(4, 10.0, 7.0, SolveStatus::Optimal)];
        let s = CostSummary::from_record(&rs, &cfg());
        assert!((s.fixed_plan.energy - 215.1).abs() < 1e-9);
        assert!((s.fixed_plan.fuel_adjustment - -88.5).abs() < 1e-9);
        assert!((s.fixed_plan.renewable_levy - 39.8).abs() < 1e-9);
        let total = s.fixed_plan.basic + 215.1 - 88.5 + 39.8;
        assert!((s.fixed_plan.total - total).abs() < 1e-6);
    }

    #[test]
    fn market_plan_uses_realized_prices_without_fuel() {
        let rs = vec![
            make_result(4, 10.0, 7.0, SolveStatus::Optimal),
            make_result(4, 20.0, 3.0, SolveStatus::Optimal),
        ];
        let s = CostSummary::from_record(&rs, &cfg());
        assert!((s.market_plan.energy - 130.0).abs() < 1e-9);
        assert_eq!(s.market_plan.fuel_adjustment, 0.0);
        assert!((s.difference - (s.market_plan.total - s.fixed_plan.total)).abs() < 1e-9);
    }

    #[test]
    fn pv_ratios() {
        let rs = vec![make_result(4, 20.0, 1.0, SolveStatus::Optimal)];
        let s = CostSummary::from_record(&rs, &cfg());
        assert!((s.pv_utilization - 0.5).abs() < 1e-12);
        assert!((s.pv_self_sufficiency - 0.25).abs() < 1e-12);
    }

    #[test]
    fn infeasible_step_degrades_summary() {
        let rs = vec![
            make_result(4, 10.0, 1.0, SolveStatus::Optimal),
            make_result(4, 10.0, 1.0, SolveStatus::Infeasible),
            make_result(4, 10.0, 1.0, SolveStatus::Optimal),
            make_result(4, 10.0, 1.0, SolveStatus::Timeout),
        ];
        let s = CostSummary::from_record(&rs, &cfg());
        assert_eq!(s.optimality, Optimality::Degraded { optimal_ratio: 0.5 });
        assert!(!s.is_fully_optimal());
        assert_eq!(s.status_counts.infeasible, 1);
        assert_eq!(s.status_counts.timeout, 1);
        assert!(s.to_string().contains("WARNING"));
    }

    #[test]
    fn all_optimal_is_fully_optimal() {
        let rs = vec![make_result(4, 10.0, 1.0, SolveStatus::Optimal); 3];
        let s = CostSummary::from_record(&rs, &cfg());
        assert!(s.is_fully_optimal());
        assert_eq!(s.optimal_ratio, 1.0);
        assert!(!s.to_string().contains("WARNING"));
    }

    #[test]
    fn empty_record_is_not_fully_optimal() {
        let s = CostSummary::from_record(&[], &cfg());
        assert_eq!(s.steps, 0);
        assert_eq!(s.peak_purchase_kw, 0.0);
        assert!(!s.is_fully_optimal());
    }

    #[test]
    fn optimality_serializes_with_tag() {
        let v = serde_json::to_value(Optimality::Degraded { optimal_ratio: 0.9 }).unwrap();
        assert_eq!(v["kind"], "degraded");
        assert_eq!(v["optimal_ratio"], 0.9);
    }
}
