//! Deterministic action for steps without a usable solution.

use crate::forecast::ForecastPoint;

use super::types::{Dispatch, GridSpec};

/// Meets demand entirely through purchase, ignoring the cap proxy.
///
/// PV is not used (all of it counts as curtailed), the battery is idle and
/// nothing is sold, so soc stays where it was.
pub fn fallback_dispatch(point: &ForecastPoint, grid: &GridSpec) -> Dispatch {
    Dispatch {
        pv_used_kw: 0.0,
        purchase_kw: grid.served_demand_kw(point.demand_kw),
        sale_kw: 0.0,
        charge_kw: 0.0,
        discharge_kw: 0.0,
    }
}
