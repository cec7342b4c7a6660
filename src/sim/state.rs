//! The single mutable system state carried across rolling steps.

use serde::Serialize;

use super::types::StepResult;

/// Cumulative energy totals over the steps absorbed so far (kWh).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EnergyCounters {
    pub demand_kwh: f64,
    pub purchased_kwh: f64,
    pub sold_kwh: f64,
    pub pv_available_kwh: f64,
    pub pv_used_kwh: f64,
    pub pv_curtailed_kwh: f64,
    pub charged_kwh: f64,
    pub discharged_kwh: f64,
}

/// Battery energy, step index, realized peak and counters.
///
/// Fields are private: the only mutation is [`SystemState::absorb`], which
/// the rolling controller calls once per step after recording it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemState {
    step: usize,
    soc_kwh: f64,
    peak_purchase_kw: f64,
    counters: EnergyCounters,
}

impl SystemState {
    pub fn new(initial_soc_kwh: f64) -> Self {
        Self {
            step: 0,
            soc_kwh: initial_soc_kwh,
            peak_purchase_kw: 0.0,
            counters: EnergyCounters::default(),
        }
    }

    /// Index of the next step to run.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn soc_kwh(&self) -> f64 {
        self.soc_kwh
    }

    /// Largest purchase committed so far (kW).
    pub fn peak_purchase_kw(&self) -> f64 {
        self.peak_purchase_kw
    }

    pub fn counters(&self) -> &EnergyCounters {
        &self.counters
    }

    /// Folds a recorded step into the state and moves to the next index.
    pub(crate) fn absorb(&mut self, result: &StepResult, dt_hours: f64) {
        debug_assert_eq!(result.step, self.step, "steps must be absorbed in order");
        self.soc_kwh = result.soc_kwh;
        self.peak_purchase_kw = self.peak_purchase_kw.max(result.purchase_kw);

        let c = &mut self.counters;
        c.demand_kwh += result.demand_kw * dt_hours;
        c.purchased_kwh += result.purchase_kw * dt_hours;
        c.sold_kwh += result.sale_kw * dt_hours;
        c.pv_available_kwh += result.pv_available_kw * dt_hours;
        c.pv_used_kwh += result.pv_used_kw * dt_hours;
        c.pv_curtailed_kwh += result.pv_curtailed_kw * dt_hours;
        c.charged_kwh += result.charge_kw * dt_hours;
        c.discharged_kwh += result.discharge_kw * dt_hours;

        self.step += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::types::SolveStatus;
    use chrono::NaiveDate;

    fn result(step: usize, purchase: f64, soc: f64) -> StepResult {
        StepResult {
            step,
            timestamp: NaiveDate::from_ymd_opt(2024, 4, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            status: SolveStatus::Optimal,
            demand_kw: 100.0,
            pv_available_kw: 20.0,
            pv_used_kw: 10.0,
            pv_curtailed_kw: 10.0,
            purchase_kw: purchase,
            sale_kw: 0.0,
            charge_kw: 0.0,
            discharge_kw: 0.0,
            soc_kwh: soc,
            price_per_kwh: 20.0,
            purchase_cap_kw: Some(purchase),
            window_len: 48,
        }
    }

    #[test]
    fn absorb_advances_and_tracks_peak() {
        let mut s = SystemState::new(50.0);
        s.absorb(&result(0, 90.0, 40.0), 0.5);
        s.absorb(&result(1, 70.0, 30.0), 0.5);
        assert_eq!(s.step(), 2);
        assert_eq!(s.soc_kwh(), 30.0);
        assert_eq!(s.peak_purchase_kw(), 90.0);
        assert_eq!(s.counters().purchased_kwh, 80.0);
        assert_eq!(s.counters().pv_curtailed_kwh, 10.0);
    }

    #[test]
    fn fresh_state_is_at_step_zero() {
        let s = SystemState::new(430.0);
        assert_eq!(s.step(), 0);
        assert_eq!(s.soc_kwh(), 430.0);
        assert_eq!(*s.counters(), EnergyCounters::default());
    }
}
