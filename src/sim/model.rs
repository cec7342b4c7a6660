//! Model builder: turns the current soc and a forecast window into a program.
//!
//! Per window step `t` the program carries purchase, sale, PV used, charge,
//! discharge and soc variables, plus an optional binary mode. One
//! window-scoped purchase-cap variable stands in for the contract power and
//! is priced by the amortized basic charge.

use crate::error::ModelError;
use crate::forecast::ForecastWindow;

use super::program::{LinearExpr, LinearProgram, Sense, VarId};
use super::types::{Dispatch, DispatchConfig};

/// Variable handles for one built window.
#[derive(Debug, Clone)]
pub struct WindowVars {
    pub pv_used: Vec<VarId>,
    pub purchase: Vec<VarId>,
    pub sale: Vec<VarId>,
    pub charge: Vec<VarId>,
    pub discharge: Vec<VarId>,
    /// Stored energy at the end of each window step.
    pub soc: Vec<VarId>,
    /// `1` = charging allowed, `0` = discharging allowed.
    pub mode: Option<Vec<VarId>>,
    pub cap: VarId,
}

/// A built window program and the handles needed to read a solution back.
#[derive(Debug, Clone)]
pub struct WindowModel {
    pub program: LinearProgram,
    pub vars: WindowVars,
    /// Weight applied to the cap proxy in this window.
    pub cap_weight: f64,
}

impl WindowModel {
    pub fn len(&self) -> usize {
        self.vars.purchase.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.purchase.is_empty()
    }

    /// Decision for the first window step; the rest is advisory.
    ///
    /// `values` must hold one entry per program variable.
    pub fn first_dispatch(&self, values: &[f64]) -> Dispatch {
        let v = &self.vars;
        Dispatch {
            pv_used_kw: values[v.pv_used[0].index()],
            purchase_kw: values[v.purchase[0].index()],
            sale_kw: values[v.sale[0].index()],
            charge_kw: values[v.charge[0].index()],
            discharge_kw: values[v.discharge[0].index()],
        }
    }

    pub fn cap_value(&self, values: &[f64]) -> f64 {
        values[self.vars.cap.index()]
    }

    /// Stored energy at the end of the first window step.
    pub fn first_soc(&self, values: &[f64]) -> f64 {
        values[self.vars.soc[0].index()]
    }
}

/// Builds the window program starting from `soc_kwh`.
pub fn build_window(
    cfg: &DispatchConfig,
    soc_kwh: f64,
    window: &ForecastWindow<'_>,
) -> Result<WindowModel, ModelError> {
    if window.is_empty() {
        return Err(ModelError::EmptyWindow);
    }
    let bat = &cfg.battery;
    let grid = &cfg.grid;
    if !soc_kwh.is_finite() || soc_kwh < -1e-9 || soc_kwh > bat.capacity_kwh + 1e-9 {
        return Err(ModelError::InitialSoc {
            soc_kwh,
            capacity_kwh: bat.capacity_kwh,
        });
    }
    for (offset, p) in window.iter().enumerate() {
        for (field, value, non_negative) in [
            ("demand_kw", p.demand_kw, true),
            ("pv_kw", p.pv_kw, true),
            ("price_per_kwh", p.price_per_kwh, false),
        ] {
            if !value.is_finite() || (non_negative && value < 0.0) {
                return Err(ModelError::InvalidInput {
                    offset,
                    field,
                    value,
                });
            }
        }
    }

    let n = window.len();
    let dt = cfg.dt_hours;
    let (soc_lo, soc_hi) = bat.soc_bounds_kwh();
    let (charge_max, discharge_max) = if bat.is_present() {
        (bat.max_charge_kw, bat.max_discharge_kw)
    } else {
        (0.0, 0.0)
    };
    let sale_max = if grid.allow_reverse_flow {
        grid.max_sale_kw.unwrap_or(f64::INFINITY)
    } else {
        0.0
    };
    let use_mode = bat.exclusive_charge_discharge && bat.is_present();

    let mut p = LinearProgram::new();
    let cap = p.add_continuous(
        "purchase_cap",
        0.0,
        grid.max_purchase_kw.unwrap_or(f64::INFINITY),
    );

    let mut vars = WindowVars {
        pv_used: Vec::with_capacity(n),
        purchase: Vec::with_capacity(n),
        sale: Vec::with_capacity(n),
        charge: Vec::with_capacity(n),
        discharge: Vec::with_capacity(n),
        soc: Vec::with_capacity(n),
        mode: use_mode.then(|| Vec::with_capacity(n)),
        cap,
    };

    for (t, point) in window.iter().enumerate() {
        let pv_used = p.add_continuous(format!("pv_used[{t}]"), 0.0, point.pv_kw);
        let purchase = p.add_continuous(format!("purchase[{t}]"), 0.0, f64::INFINITY);
        let sale = p.add_continuous(format!("sale[{t}]"), 0.0, sale_max);
        let charge = p.add_continuous(format!("charge[{t}]"), 0.0, charge_max);
        let discharge = p.add_continuous(format!("discharge[{t}]"), 0.0, discharge_max);
        let soc = p.add_continuous(format!("soc[{t}]"), soc_lo, soc_hi);

        // demand / alpha = pv_used + purchase - sale + eta_d * discharge - charge / eta_c
        p.add_constraint(
            format!("balance[{t}]"),
            LinearExpr::new()
                .with(pv_used, 1.0)
                .with(purchase, 1.0)
                .with(sale, -1.0)
                .with(discharge, bat.eta_discharge)
                .with(charge, -1.0 / bat.eta_charge),
            Sense::Eq,
            grid.served_demand_kw(point.demand_kw),
        );

        // soc[t] = soc[t-1] + (charge - discharge) * dt
        let mut dynamics = LinearExpr::new()
            .with(soc, 1.0)
            .with(charge, -dt)
            .with(discharge, dt);
        let rhs = match vars.soc.last() {
            Some(&prev) => {
                dynamics.add(prev, -1.0);
                0.0
            }
            None => soc_kwh,
        };
        p.add_constraint(format!("soc[{t}]"), dynamics, Sense::Eq, rhs);

        p.add_constraint(
            format!("cap[{t}]"),
            LinearExpr::new().with(purchase, 1.0).with(cap, -1.0),
            Sense::Le,
            0.0,
        );

        if !grid.allow_reverse_flow {
            p.add_constraint(
                format!("no_reverse[{t}]"),
                LinearExpr::new().with(sale, 1.0),
                Sense::Eq,
                0.0,
            );
        }

        if let Some(modes) = vars.mode.as_mut() {
            let z = p.add_binary(format!("mode[{t}]"));
            p.add_constraint(
                format!("charge_mode[{t}]"),
                LinearExpr::new().with(charge, 1.0).with(z, -charge_max),
                Sense::Le,
                0.0,
            );
            p.add_constraint(
                format!("discharge_mode[{t}]"),
                LinearExpr::new().with(discharge, 1.0).with(z, discharge_max),
                Sense::Le,
                discharge_max,
            );
            modes.push(z);
        }

        vars.pv_used.push(pv_used);
        vars.purchase.push(purchase);
        vars.sale.push(sale);
        vars.charge.push(charge);
        vars.discharge.push(discharge);
        vars.soc.push(soc);
    }

    let cap_weight = cfg.cap_weight(n);
    let mut objective = LinearExpr::new().with(cap, cap_weight);
    for (t, point) in window.iter().enumerate() {
        objective.add(vars.purchase[t], point.price_per_kwh * dt);
        if grid.allow_reverse_flow {
            objective.add(vars.sale[t], -grid.sell_price_per_kwh * dt);
        }
        if cfg.objective.soc_tie_break > 0.0 {
            objective.add(vars.soc[t], -cfg.objective.soc_tie_break);
        }
    }
    p.set_objective(objective);

    Ok(WindowModel {
        program: p,
        vars,
        cap_weight,
    })
}
