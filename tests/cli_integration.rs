//! Runs the binary end to end on short horizons.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_rolling-dispatch"))
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("rolling-dispatch-{}-{name}", std::process::id()))
}

#[test]
fn preset_run_writes_record_and_summary() {
    let record = temp_path("record.csv");
    let summary = temp_path("summary.json");

    let output = bin()
        .args(["--preset", "baseline", "--steps", "12", "--horizon", "4"])
        .arg("--record-out")
        .arg(&record)
        .arg("--summary-out")
        .arg(&summary)
        .output()
        .expect("failed to run binary");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--- Cost Summary ---"));

    let csv = fs::read_to_string(&record).unwrap();
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with("timestamp,demand_kw,"));
    assert_eq!(lines.count(), 12);

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&summary).unwrap()).unwrap();
    assert_eq!(json["steps"], 12);

    let _ = fs::remove_file(record);
    let _ = fs::remove_file(summary);
}

#[test]
fn scenario_file_runs() {
    let output = bin()
        .args(["--scenario", "scenarios/two_days_export.toml", "--steps", "8"])
        .output()
        .expect("failed to run binary");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn csv_forecast_overrides_synthetic_source() {
    let forecast = temp_path("forecast.csv");
    let mut body = String::from("timestamp,demand_kw,pv_kw,price_per_kwh\n");
    for k in 0..6 {
        body.push_str(&format!("2024-04-01T{:02}:{:02}:00,100,0,20\n", k / 2, (k % 2) * 30));
    }
    fs::write(&forecast, body).unwrap();

    let output = bin()
        .args(["--steps", "6", "--horizon", "3"])
        .arg("--forecast")
        .arg(&forecast)
        .output()
        .expect("failed to run binary");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let _ = fs::remove_file(forecast);
}

#[test]
fn short_csv_forecast_is_rejected() {
    let forecast = temp_path("short.csv");
    fs::write(
        &forecast,
        "timestamp,demand_kw,pv_kw,price_per_kwh\n2024-04-01T00:00:00,10,0,20\n",
    )
    .unwrap();

    let output = bin()
        .args(["--steps", "4"])
        .arg("--forecast")
        .arg(&forecast)
        .output()
        .expect("failed to run binary");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("forecast covers 1 steps but the run needs 4"));

    let _ = fs::remove_file(forecast);
}

#[test]
fn invalid_scenario_is_rejected() {
    let output = bin()
        .args(["--preset", "baseline", "--horizon", "0"])
        .output()
        .expect("failed to run binary");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("simulation.horizon"));
}

#[test]
fn unknown_preset_is_rejected() {
    let output = bin()
        .args(["--preset", "nope"])
        .output()
        .expect("failed to run binary");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown preset"));
}

#[test]
fn from_and_to_select_the_run_period() {
    let record = temp_path("period.csv");

    let output = bin()
        .args([
            "--preset",
            "baseline",
            "--from",
            "2024-04-02T00:00:00",
            "--to",
            "2024-04-02T02:00:00",
            "--horizon",
            "2",
        ])
        .arg("--record-out")
        .arg(&record)
        .output()
        .expect("failed to run binary");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let csv = fs::read_to_string(&record).unwrap();
    let rows: Vec<&str> = csv.lines().skip(1).collect();
    assert_eq!(rows.len(), 4);
    assert!(rows[0].starts_with("2024-04-02"), "first row: {}", rows[0]);

    let _ = fs::remove_file(record);
}

#[test]
fn empty_period_fails() {
    let output = bin()
        .args(["--preset", "baseline", "--from", "2030-01-01T00:00:00"])
        .output()
        .expect("failed to run binary");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("selects no points"), "stderr: {stderr}");
}
