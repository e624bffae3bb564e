//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - An isolated project root
//! - A private state directory for lock artifacts
//! - A unique base name so parallel tests never share a build slot
//!
//! # Usage
//!
//! ```ignore
//! use hotbuild_config::testing::TestEnvironment;
//!
//! #[test]
//! fn test_something() {
//!     let env = TestEnvironment::new().unwrap();
//!     let config = env.config();
//!     // config.coordinator.state_dir points into env's temp dir
//! }
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

use crate::{Config, ENV_BASE, ENV_STATE_DIR};

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Project root for the test
    pub project_root: PathBuf,
    /// Directory holding lock artifacts and the output log
    pub state_dir: PathBuf,
    /// Base name shared by every invocation in this test
    pub base_name: String,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        let project_root = root.join("project");
        let state_dir = root.join("state");
        std::fs::create_dir_all(&project_root)?;
        std::fs::create_dir_all(&state_dir)?;

        let base_name = format!("hb-test-{}-{}", std::process::id(), test_id);

        Ok(Self {
            _temp_dir: temp_dir,
            project_root,
            state_dir,
            base_name,
            test_id,
        })
    }

    /// Config pointing at this environment, with short retry budgets.
    pub fn config(&self) -> Config {
        let mut cfg = Config::default();
        cfg.coordinator.state_dir = Some(self.state_dir.clone());
        cfg.coordinator.base_name = Some(self.base_name.clone());
        cfg.retry.kill_slot_backoff_ms = 10;
        cfg.retry.teardown_attempts = 300;
        cfg.retry.teardown_backoff_ms = 10;
        cfg.retry.record_grace_backoff_ms = 10;
        cfg
    }

    /// Path of a marker file inside the project root.
    pub fn marker_path(&self, name: &str) -> PathBuf {
        self.project_root.join(name)
    }

    /// Write a project-level `.hotbuild/config.toml`.
    pub fn write_project_config(&self, toml: &str) -> anyhow::Result<PathBuf> {
        let path = Config::project_config_path(&self.project_root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, toml)?;
        Ok(path)
    }

    /// Environment variables for spawning the `hotbuild` binary against this
    /// environment.
    pub fn cli_env(&self) -> Vec<(String, String)> {
        vec![
            (
                ENV_STATE_DIR.to_string(),
                self.state_dir.to_string_lossy().to_string(),
            ),
            (ENV_BASE.to_string(), self.base_name.clone()),
            ("HOME".to_string(), self.project_root.to_string_lossy().to_string()),
        ]
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new().expect("Failed to create test environment")
    }
}
