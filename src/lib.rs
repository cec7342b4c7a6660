//! Receding-horizon battery, PV and grid dispatch under a two-part tariff.
//!
//! Each step builds a window optimization over the forecast, solves it,
//! commits only the first interval and rolls forward. The finished record
//! is priced under a fixed and a market energy plan.

pub mod config;
pub mod error;
pub mod forecast;
pub mod io;
/// Window model, solver adapter, rolling controller and cost accounting.
pub mod sim;
pub mod telemetry;

#[cfg(feature = "api")]
pub mod api;
