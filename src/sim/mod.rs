/// Step clock on the fixed time grid.
pub mod clock;
pub mod controller;
pub mod cost;
/// Deterministic fallback for unsolved steps.
pub mod fallback;
pub mod model;
pub mod power_balance;
pub mod program;
/// Append-only step record.
pub mod record;
pub mod solver;
pub mod state;
pub mod types;
