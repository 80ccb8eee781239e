use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::{NamedTempFile, TempDir};

const CANONICAL_DATA: &str = "angle,target_x,target_y,bullet_speed\n\
                              -16.9,1,0,17.0\n\
                              -10,2,0,17.0\n\
                              -5.8,3,0,17.0\n\
                              -2.83,4,0,17.0\n\
                              -0.38,5,0,17.0\n";

fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_drag-fit"))
        .args(args)
        .env_remove("DRAG_FIT_DATA")
        .output()
        .expect("Failed to execute command")
}

fn data_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(CANONICAL_DATA.as_bytes()).unwrap();
    file
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_cli_info_command() {
    let output = run_cli(&["info"]);

    assert!(output.status.success(), "Command should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("DRAG FIT"));
    assert!(stdout.contains("RKF 7(8)"));
}

#[test]
fn test_cli_calibrate_table() {
    let data = data_file();
    let output = run_cli(&["calibrate", "--data", path_str(data.path())]);

    assert!(output.status.success(), "Command should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Optimization successful. Final error: "));
    assert!(stdout.contains("CALIBRATION RESULTS"));
    assert!(stdout.contains("Mean error"));
}

#[test]
fn test_cli_calibrate_json() {
    let data = data_file();
    let output = run_cli(&["calibrate", "--data", path_str(data.path()), "--output", "json"]);

    assert!(output.status.success(), "Command should succeed");
    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("Output should be valid JSON");
    assert_eq!(json["converged"], serde_json::Value::Bool(true));
    assert_eq!(json["report"]["entries"].as_array().unwrap().len(), 5);
    assert!(json["report"]["mean_error"].as_f64().unwrap() < 0.05);
}

#[test]
fn test_cli_calibrate_csv() {
    let data = data_file();
    let output = run_cli(&["calibrate", "--data", path_str(data.path()), "-o", "csv"]);

    assert!(output.status.success(), "Command should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut lines = stdout.lines();
    assert!(lines.next().unwrap().starts_with("angle_deg,target_x"));
    assert_eq!(lines.count(), 5);
}

#[test]
fn test_cli_missing_data_exits_cleanly() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nothing.csv");
    let output = run_cli(&["calibrate", "--data", path_str(&missing)]);

    assert!(output.status.success(), "Missing data is not an error");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No data points loaded. Exiting."));
}

#[test]
fn test_cli_malformed_data_exits_cleanly() {
    let mut data = NamedTempFile::new().unwrap();
    data.write_all(b"angle,target_x,target_y,bullet_speed\n-10,two,0,17\n")
        .unwrap();
    let output = run_cli(&["calibrate", "--data", path_str(data.path())]);

    assert!(output.status.success(), "Unreadable data is not an error");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No data points loaded. Exiting."));
}

#[test]
fn test_cli_data_from_environment() {
    let data = data_file();
    let output = Command::new(env!("CARGO_BIN_EXE_drag-fit"))
        .args(["calibrate"])
        .env("DRAG_FIT_DATA", data.path())
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Optimization successful"));
}

#[test]
fn test_cli_invalid_bounds_fail() {
    let data = data_file();
    let output = run_cli(&[
        "calibrate",
        "--data",
        path_str(data.path()),
        "--cd-min",
        "10",
        "--cd-max",
        "1",
    ]);

    assert!(!output.status.success(), "Inverted bounds should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid bounds"));
}

#[test]
fn test_cli_calibrate_with_plots() {
    let data = data_file();
    let dir = TempDir::new().unwrap();
    let plot_dir = dir.path().join("plots");
    let output = run_cli(&[
        "calibrate",
        "--data",
        path_str(data.path()),
        "--plot-dir",
        path_str(&plot_dir),
        "--title",
        "Range test",
    ]);

    assert!(output.status.success(), "Command should succeed");
    assert!(plot_dir.join("trajectories.svg").exists());
    assert!(plot_dir.join("error_histogram.svg").exists());
}

#[test]
fn test_cli_simulate_with_target() {
    let output = run_cli(&[
        "simulate",
        "--speed",
        "17",
        "--angle",
        "-10",
        "--cd",
        "0.0086",
        "--target-x",
        "2",
        "-o",
        "json",
    ]);

    assert!(output.status.success(), "Command should succeed");
    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("Output should be valid JSON");
    assert_eq!(json["landing"]["event_fired"], serde_json::Value::Bool(true));
    assert!((json["landing"]["x"].as_f64().unwrap() - 2.0).abs() < 1e-6);
    assert_eq!(json["trajectory"].as_array().unwrap().len(), 20);
}

#[test]
fn test_cli_simulate_table() {
    let output = run_cli(&["simulate", "--speed", "17", "--angle", "5", "--t-max", "0.5"]);

    assert!(output.status.success(), "Command should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("TRAJECTORY RESULTS"));
    assert!(stdout.contains("no"));
}
