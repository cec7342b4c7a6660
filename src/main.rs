//! Rolling dispatch entry point: CLI wiring, forecast loading and output export.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;
use clap::Parser;
use tracing::{error, info};

use rolling_dispatch::config::ScenarioConfig;
use rolling_dispatch::forecast::ForecastFeed;
use rolling_dispatch::io::export::{export_csv, export_summary_json};
use rolling_dispatch::sim::controller::RollingController;
use rolling_dispatch::sim::cost::CostSummary;
use rolling_dispatch::sim::solver::GoodLpSolver;
use rolling_dispatch::sim::types::StepResult;
use rolling_dispatch::telemetry;

/// Receding-horizon battery/PV/grid dispatch under a two-part tariff.
#[derive(Debug, Parser)]
#[command(name = "rolling-dispatch", version, about)]
struct Cli {
    /// Load scenario from a TOML config file.
    #[arg(long, conflicts_with = "preset")]
    scenario: Option<PathBuf>,

    /// Use a built-in preset (baseline, no_battery, reverse_flow).
    #[arg(long)]
    preset: Option<String>,

    /// Read demand, PV and price from a CSV instead of the scenario source.
    #[arg(long)]
    forecast: Option<PathBuf>,

    /// Run only forecast points stamped at or after this time (e.g. 2024-07-01T00:00:00).
    #[arg(long)]
    from: Option<NaiveDateTime>,

    /// Run only forecast points stamped before this time.
    #[arg(long)]
    to: Option<NaiveDateTime>,

    /// Override the number of steps to run.
    #[arg(long)]
    steps: Option<usize>,

    /// Override the look-ahead window in steps.
    #[arg(long)]
    horizon: Option<usize>,

    /// Override the synthetic forecast seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Write the per-step record as CSV.
    #[arg(long)]
    record_out: Option<PathBuf>,

    /// Write the cost summary as JSON.
    #[arg(long)]
    summary_out: Option<PathBuf>,

    /// Print every step result to stdout.
    #[arg(long)]
    verbose_steps: bool,

    /// Start the REST API server after the run.
    #[cfg(feature = "api")]
    #[arg(long)]
    serve: bool,

    /// API server port.
    #[cfg(feature = "api")]
    #[arg(long, default_value_t = 3000)]
    port: u16,
}

fn load_scenario(cli: &Cli) -> Result<ScenarioConfig> {
    // --scenario takes priority, then --preset, then the baseline
    let mut scenario = if let Some(ref path) = cli.scenario {
        ScenarioConfig::from_toml_file(path)?
    } else if let Some(ref name) = cli.preset {
        ScenarioConfig::from_preset(name)?
    } else {
        ScenarioConfig::baseline()
    };

    if let Some(steps) = cli.steps {
        scenario.simulation.total_steps = steps;
    }
    if let Some(horizon) = cli.horizon {
        scenario.simulation.horizon = horizon;
    }
    if let Some(seed) = cli.seed {
        scenario.simulation.seed = seed;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        let joined: Vec<String> = errors.iter().map(ToString::to_string).collect();
        bail!("invalid scenario:\n  {}", joined.join("\n  "));
    }
    Ok(scenario)
}

fn write_outputs(cli: &Cli, record: &[StepResult], summary: &CostSummary) -> Result<()> {
    if let Some(ref path) = cli.record_out {
        export_csv(record, path)
            .with_context(|| format!("failed to write record CSV to {}", path.display()))?;
        eprintln!("Record written to {}", path.display());
    }
    if let Some(ref path) = cli.summary_out {
        export_summary_json(summary, path)
            .with_context(|| format!("failed to write summary JSON to {}", path.display()))?;
        eprintln!("Summary written to {}", path.display());
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let scenario = load_scenario(cli)?;
    let mut config = scenario.dispatch_config();

    let mut forecast = scenario
        .load_forecast(cli.forecast.as_deref())
        .context("failed to load forecast")?;
    if cli.from.is_some() || cli.to.is_some() {
        forecast = forecast
            .period(cli.from, cli.to)
            .context("failed to select forecast period")?;
        // without --steps the period sets the run length
        if cli.steps.is_none() {
            config.total_steps = forecast.len();
        }
    }
    forecast.truncate(config.total_steps);
    info!(
        points = forecast.len(),
        horizon = config.horizon,
        "forecast loaded"
    );

    let mut controller = RollingController::new(config.clone(), forecast, GoodLpSolver::new())?;
    let failure = controller.run().err();

    let record = controller.record();
    let summary = CostSummary::from_record(record.as_slice(), &config);

    if cli.verbose_steps {
        for r in record {
            println!("{r}");
        }
    }
    println!("\n{summary}");

    write_outputs(cli, record.as_slice(), &summary)?;

    if let Some(e) = failure {
        error!(recorded = record.len(), "run stopped early");
        eprintln!("error: {e}");
        return Ok(ExitCode::FAILURE);
    }

    #[cfg(feature = "api")]
    if cli.serve {
        use std::net::SocketAddr;
        use std::sync::Arc;

        let state = Arc::new(rolling_dispatch::api::AppState {
            config,
            summary,
            record: controller.into_record(),
        });
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
        let rt = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;
        rt.block_on(rolling_dispatch::api::serve(state, addr))
            .context("API server failed")?;
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    telemetry::init_tracing("info");
    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
