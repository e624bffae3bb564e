//! Tests for the inspection and recovery commands.

mod common;

use std::time::Duration;

use common::*;
use hotbuild_config::testing::TestEnvironment;
use hotbuild_config::Config;
use predicates::prelude::*;

/// A pid that is guaranteed not to be running.
fn dead_pid() -> u32 {
    let mut child = std::process::Command::new("true").spawn().unwrap();
    let pid = child.id();
    child.wait().unwrap();
    pid
}

#[test]
fn test_config_prints_defaults() {
    let env = TestEnvironment::new().unwrap();
    let output = hotbuild(&env).arg("config").output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: Config = toml::from_str(&stdout).expect("config output should be valid TOML");
    assert_eq!(parsed, Config::default());
}

#[test]
fn test_config_effective_reflects_project_file() {
    let env = TestEnvironment::new().unwrap();
    env.write_project_config("[coordinator]\ndelay_ms = 250\n[pipeline]\nbuild = \"make\"\n")
        .unwrap();

    hotbuild(&env)
        .args(["config", "--effective"])
        .assert()
        .success()
        .stdout(predicate::str::contains("delay_ms = 250"))
        .stdout(predicate::str::contains("build = \"make\""))
        .stdout(predicate::str::contains(env.base_name.as_str()));
}

#[test]
fn test_status_json_when_idle() {
    let env = TestEnvironment::new().unwrap();
    let output = hotbuild(&env).args(["status", "--json"]).output().unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["base"], env.base_name.as_str());
    assert!(report["owner"].is_null());
    assert_eq!(report["build_slot"]["present"], false);
}

#[test]
fn test_status_reports_running_owner() {
    let env = TestEnvironment::new().unwrap();
    configure(&env, "build = \"true\"\n");

    let mut owner = spawn(&env, &["trigger", "--delay", "5000"]);
    let record = artifact(&env, ".pid");
    wait_until(Duration::from_secs(10), "ownership record", || record.exists());

    let output = hotbuild(&env).args(["status", "--json"]).output().unwrap();
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["owner"]["pid"], owner.id());
    assert_eq!(report["owner"]["alive"], true);
    assert_eq!(report["trampoline"]["present"], true);

    hotbuild(&env)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("{} (running)", owner.id())));

    hotbuild(&env).args(["cancel", "--wait"]).assert().success();
    assert_eq!(owner.wait().unwrap().code(), Some(1));
    assert_clean(&env);
}

#[test]
fn test_cancel_without_owner() {
    let env = TestEnvironment::new().unwrap();
    hotbuild(&env)
        .arg("cancel")
        .assert()
        .success()
        .stdout(predicate::str::contains("No build in progress"));
}

#[test]
fn test_cancel_never_deletes_stale_record() {
    let env = TestEnvironment::new().unwrap();
    let pid = dead_pid();
    let record = artifact(&env, ".pid");
    std::fs::write(&record, format!("{}\n", pid)).unwrap();

    hotbuild(&env)
        .arg("cancel")
        .assert()
        .success()
        .stdout(predicate::str::contains("hotbuild reset"));

    assert_eq!(read(&record).trim(), pid.to_string());
}

#[test]
fn test_reset_clears_dead_owner() {
    let env = TestEnvironment::new().unwrap();
    std::fs::create_dir(artifact(&env, ".lock")).unwrap();
    std::fs::write(artifact(&env, ".pid"), format!("{}\n", dead_pid())).unwrap();
    std::fs::write(artifact(&env, ".cancel"), "#!/bin/sh\n").unwrap();

    hotbuild(&env)
        .arg("reset")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed"));
    assert_clean(&env);

    hotbuild(&env)
        .arg("reset")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to reset"));
}

#[test]
fn test_reset_refuses_live_owner() {
    let env = TestEnvironment::new().unwrap();
    let record = artifact(&env, ".pid");
    std::fs::create_dir(artifact(&env, ".lock")).unwrap();
    // The test process itself stands in for a live owner.
    std::fs::write(&record, format!("{}\n", std::process::id())).unwrap();

    hotbuild(&env)
        .arg("reset")
        .assert()
        .failure()
        .stderr(predicate::str::contains("still running"));

    assert!(record.exists());
    assert!(artifact(&env, ".lock").exists());
}

#[test]
fn test_trigger_after_reset_succeeds() {
    let env = TestEnvironment::new().unwrap();
    configure(&env, "build = \"touch built\"\n");
    std::fs::create_dir(artifact(&env, ".lock")).unwrap();
    std::fs::write(artifact(&env, ".pid"), format!("{}\n", dead_pid())).unwrap();

    // An orphaned slot held by a dead owner is not force-broken.
    hotbuild(&env)
        .arg("trigger")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("hotbuild reset"));
    assert!(!env.marker_path("built").exists());

    hotbuild(&env).arg("reset").assert().success();
    hotbuild(&env).arg("trigger").assert().success();
    assert!(env.marker_path("built").exists());
    assert_clean(&env);
}
