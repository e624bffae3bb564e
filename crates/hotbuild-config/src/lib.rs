//! # hotbuild-config
//!
//! Configuration management for hotbuild.
//!
//! Loads configuration from:
//! 1. `~/.hotbuild/config.toml` (global)
//! 2. `<project>/.hotbuild/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)
//!
//! There is no process-wide config instance: callers load a [`Config`] once
//! and hand it to the coordinator explicitly.

pub mod logging;
pub mod path;
pub mod testing;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Directory (relative to home or project root) holding `config.toml`.
pub const CONFIG_DIR: &str = ".hotbuild";

pub const ENV_DELAY_MS: &str = "HOTBUILD_DELAY_MS";
pub const ENV_BASE: &str = "HOTBUILD_BASE";
pub const ENV_STATE_DIR: &str = "HOTBUILD_STATE_DIR";
pub const ENV_VERBOSE: &str = "HOTBUILD_VERBOSE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub coordinator: CoordinatorConfig,
    pub retry: RetryConfig,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load config from standard locations for the given project root.
    pub fn load(project_root: &Path) -> Result<Self, ConfigError> {
        Self::load_from(
            Self::global_config_path().as_deref(),
            project_root,
            |key| std::env::var(key).ok(),
        )
    }

    /// Layered load with an explicit global path and environment lookup.
    pub fn load_from(
        global_path: Option<&Path>,
        project_root: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut layers = toml::Table::new();

        // 1. Global config
        if let Some(global_path) = global_path {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                let contents = std::fs::read_to_string(global_path)?;
                merge_tables(&mut layers, contents.parse()?);
            }
        }

        // 2. Project config overrides global, key by key
        let project_path = Self::project_config_path(project_root);
        if project_path.exists() {
            debug!("Loading project config from {:?}", project_path);
            let contents = std::fs::read_to_string(&project_path)?;
            merge_tables(&mut layers, contents.parse()?);
        }

        let mut config: Config = toml::Value::Table(layers).try_into()?;

        // 3. Environment
        config.apply_env_overrides(env)?;

        Ok(config)
    }

    /// Global config path: ~/.hotbuild/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR).join("config.toml"))
    }

    /// Project config path: <root>/.hotbuild/config.toml
    pub fn project_config_path(project_root: &Path) -> PathBuf {
        project_root.join(CONFIG_DIR).join("config.toml")
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(
        &mut self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(delay) = env(ENV_DELAY_MS) {
            self.coordinator.delay_ms =
                delay.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                    key: ENV_DELAY_MS,
                    value: delay.clone(),
                })?;
        }
        if let Some(base) = env(ENV_BASE).filter(|b| !b.is_empty()) {
            self.coordinator.base_name = Some(base);
        }
        if let Some(dir) = env(ENV_STATE_DIR).filter(|d| !d.is_empty()) {
            self.coordinator.state_dir = Some(PathBuf::from(dir));
        }
        if let Some(verbose) = env(ENV_VERBOSE) {
            self.coordinator.verbose = matches!(verbose.as_str(), "1" | "true" | "yes");
        }
        Ok(())
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}

/// Overlay `upper` onto `base`. Tables merge recursively; any other value
/// present in `upper` replaces the one in `base`.
fn merge_tables(base: &mut toml::Table, upper: toml::Table) {
    for (key, value) in upper {
        let value = match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(lower)), toml::Value::Table(upper)) => {
                merge_tables(lower, upper);
                continue;
            }
            (_, value) => value,
        };
        base.insert(key, value);
    }
}

/// Coordinator knobs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Debounce delay in milliseconds (0 = build immediately)
    pub delay_ms: u64,
    /// Alternate base name for lock artifacts (None = derived from project root)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_name: Option<String>,
    /// Directory holding lock artifacts and the output log (None = system temp dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    pub verbose: bool,
}

impl CoordinatorConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn base_name(&self, project_root: &Path) -> String {
        self.base_name
            .clone()
            .unwrap_or_else(|| path::default_base_name(project_root))
    }
}

/// Bounded-wait budgets. Exhausting any of them aborts the invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts to take the kill slot when another preempter holds it
    pub kill_slot_attempts: u32,
    pub kill_slot_backoff_ms: u64,
    /// Polls waiting for a cancelled owner's record to disappear
    pub teardown_attempts: u32,
    pub teardown_backoff_ms: u64,
    /// Polls waiting for a fresh slot holder to write its record
    pub record_grace_attempts: u32,
    pub record_grace_backoff_ms: u64,
    /// Preempt-then-reacquire rounds before giving up
    pub preempt_rounds: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            kill_slot_attempts: 50,
            kill_slot_backoff_ms: 100,
            teardown_attempts: 100,
            teardown_backoff_ms: 100,
            record_grace_attempts: 20,
            record_grace_backoff_ms: 25,
            preempt_rounds: 5,
        }
    }
}

impl RetryConfig {
    pub fn kill_slot_backoff(&self) -> Duration {
        Duration::from_millis(self.kill_slot_backoff_ms)
    }

    pub fn teardown_backoff(&self) -> Duration {
        Duration::from_millis(self.teardown_backoff_ms)
    }

    pub fn record_grace_backoff(&self) -> Duration {
        Duration::from_millis(self.record_grace_backoff_ms)
    }
}

/// Shell commands run for each pipeline phase. Unset phases are skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Interpreter invoked as `<shell> -c <command>`
    pub shell: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_pass: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            pre_pass: None,
            build: None,
            lint: None,
            test: None,
        }
    }
}
