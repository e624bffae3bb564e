use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use hotbuild_config::{log_cli_debug, log_cli_info};
use hotbuild_coord::{
    install_cancel_handler, Coordinator, Outcome, Pipeline, SignalCanceller, EXIT_ABORTED,
};
use tokio_util::sync::CancellationToken;

use crate::{exit_code, Project};

#[derive(Args, Debug)]
pub struct TriggerArgs {
    /// Record the trigger but do not build
    #[arg(long)]
    no_build: bool,

    /// Free-form context for the log banner, exported to steps as HOTBUILD_CONTEXT
    #[arg(long, value_name = "TEXT")]
    context: Option<String>,

    /// Debounce delay in milliseconds (overrides config)
    #[arg(long, value_name = "MS")]
    delay: Option<u64>,
}

impl TriggerArgs {
    pub fn no_build(&self) -> bool {
        self.no_build
    }
}

pub async fn run(project: &Project, args: TriggerArgs) -> Result<ExitCode> {
    let mut coordinator_config = project.config.coordinator.clone();
    if let Some(delay) = args.delay {
        coordinator_config.delay_ms = delay;
    }

    let pipeline = Pipeline::from_config(
        &project.config.pipeline,
        &project.root,
        args.context.clone(),
    );
    let token = CancellationToken::new();
    let mut coordinator = Coordinator::new(
        project.layout.clone(),
        std::process::id(),
        SignalCanceller,
        pipeline,
    )
    .with_delay(coordinator_config.delay())
    .with_retry(project.config.retry.clone())
    .with_context(args.context)
    .with_token(token.clone());

    // Before any ownership record exists, so a cancel always finds a handler.
    let handler = install_cancel_handler(token).context("Failed to install signal handler")?;
    log_cli_debug!(
        "Trigger",
        build = !args.no_build,
        delay_ms = coordinator_config.delay_ms
    );

    let result = coordinator.run(!args.no_build).await;
    handler.abort();

    match result {
        Ok(outcome) => {
            match outcome {
                Outcome::NoOp => log_cli_info!("Nothing to build"),
                Outcome::Completed => log_cli_info!("Build completed"),
                Outcome::Killed { phase } => {
                    eprintln!("hotbuild: killed during {}", phase);
                }
                Outcome::StepFailed { phase, code } => match code {
                    Some(code) => eprintln!("hotbuild: {} failed with exit code {}", phase, code),
                    None => eprintln!("hotbuild: {} was terminated by a signal", phase),
                },
            }
            Ok(exit_code(outcome.exit_code()))
        }
        Err(e) => {
            eprintln!("hotbuild: {}: {}", coordinator.phase(), e);
            Ok(exit_code(EXIT_ABORTED))
        }
    }
}
