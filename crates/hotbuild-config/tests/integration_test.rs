//! Integration tests for hotbuild-config
//!
//! These tests verify the full config loading pipeline with real file system operations.

use std::path::PathBuf;
use std::time::Duration;
use tempfile::tempdir;

use hotbuild_config::testing::TestEnvironment;
use hotbuild_config::Config;

/// Test config loading from a real global config file
#[test]
fn test_load_global_config_from_file() {
    let temp = tempdir().unwrap();
    let global_dir = temp.path().join(".hotbuild");
    std::fs::create_dir_all(&global_dir).unwrap();

    let config_content = r#"
[coordinator]
delay_ms = 750
base_name = "shared"
state_dir = "/var/tmp/hotbuild"

[retry]
teardown_attempts = 7
teardown_backoff_ms = 40

[pipeline]
shell = "bash"
pre_pass = "ctags -R"
build = "make"
test = "make check"
"#;
    let global_path = global_dir.join("config.toml");
    std::fs::write(&global_path, config_content).unwrap();

    let project = temp.path().join("project");
    std::fs::create_dir_all(&project).unwrap();

    let config = Config::load_from(Some(global_path.as_path()), &project, |_| None).unwrap();

    assert_eq!(config.coordinator.delay(), Duration::from_millis(750));
    assert_eq!(config.coordinator.base_name(&project), "shared");
    assert_eq!(
        config.coordinator.state_dir(),
        PathBuf::from("/var/tmp/hotbuild")
    );
    assert_eq!(config.retry.teardown_attempts, 7);
    assert_eq!(config.retry.teardown_backoff(), Duration::from_millis(40));
    assert_eq!(config.pipeline.shell, "bash");
    assert_eq!(config.pipeline.pre_pass.as_deref(), Some("ctags -R"));
    assert!(config.pipeline.lint.is_none());
}

/// Project config only overrides what it names
#[test]
fn test_config_hierarchy_project_overrides_global() {
    let env = TestEnvironment::new().unwrap();
    let global_path = env.project_root.join("global.toml");
    std::fs::write(
        &global_path,
        "[coordinator]\ndelay_ms = 300\n[pipeline]\nbuild = \"make\"\nlint = \"make lint\"\n",
    )
    .unwrap();
    env.write_project_config("[coordinator]\ndelay_ms = 50\n[pipeline]\nlint = \"clippy\"\n")
        .unwrap();

    let config = Config::load_from(Some(global_path.as_path()), &env.project_root, |_| None).unwrap();

    assert_eq!(config.coordinator.delay_ms, 50);
    assert_eq!(config.pipeline.build.as_deref(), Some("make"));
    assert_eq!(config.pipeline.lint.as_deref(), Some("clippy"));
}

/// Broken TOML surfaces as a parse error rather than silently defaulting
#[test]
fn test_malformed_project_config_is_an_error() {
    let env = TestEnvironment::new().unwrap();
    env.write_project_config("[coordinator\ndelay_ms = ").unwrap();

    let err = Config::load_from(None, &env.project_root, |_| None).unwrap_err();
    assert!(matches!(err, hotbuild_config::ConfigError::Toml(_)));
}

/// Partial config with defaults filling in
#[test]
fn test_partial_config_defaults_applied() {
    let partial = r#"
[pipeline]
build = "cargo build"
"#;
    let config: Config = toml::from_str(partial).unwrap();

    assert_eq!(config.pipeline.build.as_deref(), Some("cargo build"));
    assert_eq!(config.pipeline.shell, "sh");
    assert_eq!(config.coordinator.delay_ms, 0);
    assert_eq!(config.retry, hotbuild_config::RetryConfig::default());
}
