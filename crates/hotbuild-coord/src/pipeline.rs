//! The pluggable build steps.
//!
//! The coordinator treats each step as an opaque action that either succeeds
//! or fails; what it actually does (compile, lint, test) is configuration.

use std::future::Future;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use hotbuild_config::{log_pipeline_debug, PipelineConfig};

use crate::error::{CoordError, Phase, Result};
use crate::sink::LogSink;

/// Environment variable carrying the trigger's context to step commands.
pub const ENV_CONTEXT: &str = "HOTBUILD_CONTEXT";

/// Exit status of a finished step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepStatus {
    code: Option<i32>,
}

impl StepStatus {
    pub const SUCCESS: StepStatus = StepStatus { code: Some(0) };

    pub fn from_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// `None` when the step was killed by a signal.
    pub fn code(&self) -> Option<i32> {
        self.code
    }
}

impl From<ExitStatus> for StepStatus {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// One pipeline step. Runs to completion once started.
pub trait Action: Send + Sync {
    fn run(&self, sink: &LogSink) -> impl Future<Output = Result<StepStatus>> + Send;
}

/// A step implemented as `<shell> -c <command>` in the project root.
#[derive(Debug, Clone)]
pub struct ShellAction {
    shell: String,
    command: String,
    cwd: PathBuf,
    context: Option<String>,
}

impl ShellAction {
    pub fn new(
        shell: impl Into<String>,
        command: impl Into<String>,
        cwd: impl Into<PathBuf>,
        context: Option<String>,
    ) -> Self {
        Self {
            shell: shell.into(),
            command: command.into(),
            cwd: cwd.into(),
            context,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

impl Action for ShellAction {
    async fn run(&self, sink: &LogSink) -> Result<StepStatus> {
        log_pipeline_debug!("Running step", command = self.command.as_str());

        let mut cmd = tokio::process::Command::new(&self.shell);
        cmd.arg("-c")
            .arg(&self.command)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(context) = &self.context {
            cmd.env(ENV_CONTEXT, context);
        }

        let output = cmd.output().await.map_err(|source| CoordError::Spawn {
            command: self.command.clone(),
            source,
        })?;
        sink.bytes(&output.stdout);
        sink.bytes(&output.stderr);

        Ok(output.status.into())
    }
}

/// The four callbacks, each optional. A missing step is skipped.
#[derive(Debug, Clone)]
pub struct Pipeline<A> {
    pub pre_pass: Option<A>,
    pub build: Option<A>,
    pub lint: Option<A>,
    pub test: Option<A>,
}

impl<A> Default for Pipeline<A> {
    fn default() -> Self {
        Self {
            pre_pass: None,
            build: None,
            lint: None,
            test: None,
        }
    }
}

impl<A> Pipeline<A> {
    /// The action bound to a pipeline phase, if any.
    pub fn action(&self, phase: Phase) -> Option<&A> {
        match phase {
            Phase::PrePass => self.pre_pass.as_ref(),
            Phase::Building => self.build.as_ref(),
            Phase::Linting => self.lint.as_ref(),
            Phase::Testing => self.test.as_ref(),
            _ => None,
        }
    }
}

impl Pipeline<ShellAction> {
    pub fn from_config(
        config: &PipelineConfig,
        project_root: impl Into<PathBuf>,
        context: Option<String>,
    ) -> Self {
        let root = project_root.into();
        let make = |command: &Option<String>| {
            command
                .as_ref()
                .filter(|c| !c.trim().is_empty())
                .map(|c| ShellAction::new(&config.shell, c, &root, context.clone()))
        };
        Self {
            pre_pass: make(&config.pre_pass),
            build: make(&config.build),
            lint: make(&config.lint),
            test: make(&config.test),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SharedBuffer;
    use tempfile::tempdir;

    fn shell(command: &str, cwd: &std::path::Path) -> ShellAction {
        ShellAction::new("sh", command, cwd, Some("src/lib.rs".to_string()))
    }

    #[tokio::test]
    async fn test_output_lands_in_sink() {
        let temp = tempdir().unwrap();
        let buffer = SharedBuffer::default();
        let sink = LogSink::from_writer(buffer.clone());

        let status = shell("echo out; echo err >&2", temp.path())
            .run(&sink)
            .await
            .unwrap();

        assert!(status.success());
        assert_eq!(buffer.contents(), "out\nerr\n");
    }

    #[tokio::test]
    async fn test_failure_code_propagates() {
        let temp = tempdir().unwrap();
        let status = shell("exit 3", temp.path())
            .run(&LogSink::discard())
            .await
            .unwrap();
        assert!(!status.success());
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_runs_in_project_root_with_context() {
        let temp = tempdir().unwrap();
        let status = shell("printf %s \"$HOTBUILD_CONTEXT\" > ctx.txt", temp.path())
            .run(&LogSink::discard())
            .await
            .unwrap();
        assert!(status.success());
        assert_eq!(
            std::fs::read_to_string(temp.path().join("ctx.txt")).unwrap(),
            "src/lib.rs"
        );
    }

    #[tokio::test]
    async fn test_missing_shell_is_spawn_error() {
        let temp = tempdir().unwrap();
        let action = ShellAction::new("/nonexistent/shell", "true", temp.path(), None);
        let err = action.run(&LogSink::discard()).await.unwrap_err();
        assert!(matches!(err, CoordError::Spawn { .. }));
    }

    #[test]
    fn test_from_config_skips_blank_steps() {
        let config = PipelineConfig {
            build: Some("cargo build".to_string()),
            lint: Some("   ".to_string()),
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::from_config(&config, "/project", None);

        assert_eq!(
            pipeline.action(Phase::Building).map(|a| a.command()),
            Some("cargo build")
        );
        assert!(pipeline.action(Phase::Linting).is_none());
        assert!(pipeline.action(Phase::PrePass).is_none());
        assert!(pipeline.action(Phase::Debouncing).is_none());
    }
}
