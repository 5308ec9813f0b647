//! Scenario replay and command-line tests
//!
//! Covers:
//! - Replaying a scenario keeps going past failing steps
//! - Loading scenarios from disk
//! - The mzap-policy binary with text and JSON output

mod helpers;

use std::path::Path;
use std::process::Command;

use helpers::{VehicleBuilder, VEHICLE_TOML};
use mzap_common::{OutputDevices, SessionId, Zones};
use mzap_policy::Scenario;

const CABIN_USB_SCENARIO: &str = r#"
[[steps]]
op = "connect"
device = { output = "USB_DEVICE" }
address = "card=1;device=3"

[[steps]]
op = "set_zone_devices"
zone = "CABIN"
devices = "SPEAKER | USB_DEVICE"

[[steps]]
op = "play"
stream = "MUSIC"
session = 7

[[steps]]
op = "set_zone_devices"
zone = "BACKSEAT1"
devices = "SPEAKER"

[[steps]]
op = "stop"
stream = "MUSIC"
session = 7

[[steps]]
op = "release"
session = 7
"#;

fn write_file(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn policy_command() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_mzap-policy"));
    command
        .env_remove("MZAP_POLICY_SCENARIO")
        .env_remove("MZAP_POLICY_CONFIG")
        .env("RUST_LOG", "error");
    command
}

#[test]
fn test_scenario_continues_past_failures() {
    let mut manager = VehicleBuilder::new().build();
    let scenario = Scenario::from_toml_str(CABIN_USB_SCENARIO).unwrap();

    let reports = scenario.run(&mut manager);

    let outcome: Vec<bool> = reports.iter().map(|report| report.ok).collect();
    assert_eq!(outcome, vec![true, true, true, false, true, true]);
    assert_eq!(reports[3].op, "set_zone_devices");
    assert!(reports[3].detail.contains("CABIN"));
    assert_eq!(reports[2].op, "play");

    assert_eq!(
        manager.zone_devices(Zones::CABIN),
        OutputDevices::SPEAKER | OutputDevices::USB_DEVICE
    );
    assert!(manager.session(SessionId(7)).is_none());
    assert_eq!(manager.outputs().count(), 3);
}

#[test]
fn test_stop_without_play_fails() {
    let mut manager = VehicleBuilder::new().build();
    let scenario = Scenario::from_toml_str(
        r#"
        [[steps]]
        op = "stop"
        stream = "ALARM"
        session = 3

        [[steps]]
        op = "release"
        session = 3
        "#,
    )
    .unwrap();

    let reports = scenario.run(&mut manager);
    assert!(reports.iter().all(|report| !report.ok));
}

#[test]
fn test_load_scenario_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "cabin_usb.toml", CABIN_USB_SCENARIO);

    let scenario = Scenario::load(&path).unwrap();
    assert_eq!(scenario.steps.len(), 6);
    assert_eq!(scenario.steps[5].name(), "release");

    assert!(Scenario::load(&dir.path().join("missing.toml")).is_err());
}

#[test]
fn test_binary_prints_json_report() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_file(dir.path(), "vehicle.toml", VEHICLE_TOML);
    let scenario = write_file(dir.path(), "cabin_usb.toml", CABIN_USB_SCENARIO);

    let output = policy_command()
        .arg("--config")
        .arg(&config)
        .arg("--scenario")
        .arg(&scenario)
        .arg("--json")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let steps = report["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 6);
    assert_eq!(steps[3]["ok"], serde_json::Value::Bool(false));
    assert_eq!(steps[3]["op"], "set_zone_devices");
    assert_eq!(report["state"]["phone_state"], "normal");
    assert_eq!(report["state"]["outputs"].as_array().unwrap().len(), 3);
    assert!(report["state"]["sessions"].as_array().unwrap().is_empty());
}

#[test]
fn test_binary_reads_config_from_environment() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_file(dir.path(), "vehicle.toml", VEHICLE_TOML);
    let scenario = write_file(dir.path(), "cabin_usb.toml", CABIN_USB_SCENARIO);

    let output = policy_command()
        .env("MZAP_POLICY_CONFIG", &config)
        .arg("--scenario")
        .arg(&scenario)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("FAIL"));
    let steps: Vec<&str> = stdout.lines().filter(|line| line.starts_with('[')).collect();
    assert_eq!(steps.len(), 6);
    assert_eq!(steps.iter().filter(|line| line.contains(" ok ")).count(), 5);
}

#[test]
fn test_binary_rejects_missing_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_file(dir.path(), "vehicle.toml", VEHICLE_TOML);

    let output = policy_command()
        .arg("--config")
        .arg(&config)
        .arg("--scenario")
        .arg(dir.path().join("missing.toml"))
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to load scenario"));
}
