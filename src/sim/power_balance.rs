//! Site power balance.

use super::types::{BatterySpec, Dispatch, GridSpec};

/// Residual of the site power balance for one step (kW).
///
/// Supply side is `pv_used + purchase - sale + discharge * eta_d - charge / eta_c`;
/// the load side is `demand / alpha`. Zero means the step balances exactly.
///
/// # Arguments
///
/// * `demand_kw` - Raw demand for the step
/// * `dispatch` - Committed decision
/// * `battery` - Supplies the charge and discharge efficiencies
/// * `grid` - Supplies the demand-side efficiency
pub fn balance_residual_kw(
    demand_kw: f64,
    dispatch: &Dispatch,
    battery: &BatterySpec,
    grid: &GridSpec,
) -> f64 {
    let supply = dispatch.pv_used_kw + dispatch.purchase_kw - dispatch.sale_kw
        + dispatch.discharge_kw * battery.eta_discharge
        - dispatch.charge_kw / battery.eta_charge;
    supply - grid.served_demand_kw(demand_kw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purchase_only_balances() {
        let d = Dispatch {
            purchase_kw: 100.0,
            ..Dispatch::default()
        };
        let r = balance_residual_kw(100.0, &d, &BatterySpec::default(), &GridSpec::default());
        assert_eq!(r, 0.0);
    }

    #[test]
    fn charging_draws_more_than_stored() {
        // 400 kW into the cells needs 400 / 0.98 from PV
        let d = Dispatch {
            pv_used_kw: 400.0 / 0.98,
            charge_kw: 400.0,
            ..Dispatch::default()
        };
        let r = balance_residual_kw(0.0, &d, &BatterySpec::default(), &GridSpec::default());
        assert!(r.abs() < 1e-9);
    }

    #[test]
    fn discharge_delivers_less_than_drawn() {
        let d = Dispatch {
            purchase_kw: 2.0,
            discharge_kw: 100.0,
            ..Dispatch::default()
        };
        let r = balance_residual_kw(100.0, &d, &BatterySpec::default(), &GridSpec::default());
        assert!(r.abs() < 1e-9);
    }

    #[test]
    fn unmet_demand_is_negative() {
        let d = Dispatch {
            purchase_kw: 40.0,
            ..Dispatch::default()
        };
        let r = balance_residual_kw(50.0, &d, &BatterySpec::default(), &GridSpec::default());
        assert_eq!(r, -10.0);
    }
}
