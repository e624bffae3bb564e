//! Shared helpers for process-level tests.

#![allow(dead_code)]

use std::path::Path;
use std::process::{Child, Command as StdCommand, Stdio};
use std::time::{Duration, Instant};

use assert_cmd::Command;
use hotbuild_config::testing::TestEnvironment;

/// Short backoffs so preemption settles quickly under test.
pub const FAST_RETRY: &str = r#"
[retry]
kill_slot_backoff_ms = 10
teardown_attempts = 1000
teardown_backoff_ms = 10
record_grace_backoff_ms = 10
"#;

/// Environment variables a developer shell might leak into the binary.
const SCRUBBED: &[&str] = &[
    "HOTBUILD_DELAY_MS",
    "HOTBUILD_VERBOSE",
    "HOTBUILD_LOG",
    "RUST_LOG",
];

/// `hotbuild` pointed at the test environment.
pub fn hotbuild(env: &TestEnvironment) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_hotbuild"));
    cmd.current_dir(&env.project_root);
    for key in SCRUBBED {
        cmd.env_remove(key);
    }
    for (key, value) in env.cli_env() {
        cmd.env(key, value);
    }
    cmd
}

/// Start `hotbuild <args>` in the background.
pub fn spawn(env: &TestEnvironment, args: &[&str]) -> Child {
    let mut cmd = StdCommand::new(env!("CARGO_BIN_EXE_hotbuild"));
    cmd.current_dir(&env.project_root)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    for key in SCRUBBED {
        cmd.env_remove(key);
    }
    for (key, value) in env.cli_env() {
        cmd.env(key, value);
    }
    cmd.spawn().expect("Failed to spawn hotbuild")
}

/// Write a project config with the given `[pipeline]` body plus fast retries.
pub fn configure(env: &TestEnvironment, pipeline: &str) {
    let toml = format!("{}\n[pipeline]\n{}\n", FAST_RETRY, pipeline);
    env.write_project_config(&toml)
        .expect("Failed to write project config");
}

/// Poll until `check` holds, panicking after `timeout`.
pub fn wait_until(timeout: Duration, what: &str, mut check: impl FnMut() -> bool) {
    let start = Instant::now();
    while !check() {
        assert!(start.elapsed() < timeout, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(10));
    }
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}

pub fn artifact(env: &TestEnvironment, suffix: &str) -> std::path::PathBuf {
    env.state_dir.join(format!("{}{}", env.base_name, suffix))
}

/// No lock artifact of this environment's base is left behind.
pub fn assert_clean(env: &TestEnvironment) {
    for suffix in [".lock", ".kill.lock", ".pid", ".cancel"] {
        let path = artifact(env, suffix);
        assert!(!path.exists(), "{} left behind", path.display());
    }
}
