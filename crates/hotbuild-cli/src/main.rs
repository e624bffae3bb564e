//! # hotbuild CLI
//!
//! One process per trigger. The newest trigger for a project cancels the
//! build in flight and runs the pipeline itself.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hotbuild_config::logging::{init_logging, LogLevel};
use hotbuild_config::path::{resolve_project_root, validate_base_name};
use hotbuild_config::{log_cli_debug, Config};
use hotbuild_lock::StateLayout;

mod owner;
mod trigger;

/// hotbuild - self-preempting build runner
#[derive(Parser)]
#[command(name = "hotbuild")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Project root (defaults to the current directory)
    #[arg(short = 'C', long, global = true, value_name = "DIR")]
    project: Option<PathBuf>,

    /// Alternate base name for lock artifacts
    #[arg(long, global = true, value_name = "NAME")]
    base: Option<String>,

    /// Directory holding lock artifacts and the output log
    #[arg(long, global = true, value_name = "DIR")]
    state_dir: Option<PathBuf>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a build, preempting any build already running
    Trigger(trigger::TriggerArgs),

    /// Cancel the current owner, if any
    Cancel {
        /// Wait until the owner has torn down
        #[arg(long)]
        wait: bool,
    },

    /// Show lock state for this project
    Status {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Remove lock artifacts left behind by a dead owner
    Reset,

    /// Print configuration as TOML
    Config {
        /// Show the configuration in effect for this project instead of the defaults
        #[arg(long)]
        effective: bool,
    },
}

/// Everything a subcommand needs to find this project's lock state.
pub struct Project {
    pub root: PathBuf,
    pub config: Config,
    pub layout: StateLayout,
}

impl Project {
    fn load(cli: &Cli) -> Result<Self> {
        let dir = match &cli.project {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("Failed to read current directory")?,
        };
        let root = resolve_project_root(&dir)?;

        let mut config = Config::load(&root).context("Failed to load configuration")?;
        if let Some(base) = &cli.base {
            config.coordinator.base_name = Some(base.clone());
        }
        if let Some(dir) = &cli.state_dir {
            config.coordinator.state_dir = Some(dir.clone());
        }
        if cli.verbose {
            config.coordinator.verbose = true;
        }

        let base = config.coordinator.base_name(&root);
        validate_base_name(&base)?;
        let layout = StateLayout::new(config.coordinator.state_dir(), base);

        Ok(Self {
            root,
            config,
            layout,
        })
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("hotbuild: {:#}", e);
            exit_code(hotbuild_coord::EXIT_ABORTED)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    if let Commands::Config { effective: false } = cli.command {
        init_logging(if cli.verbose { LogLevel::Debug } else { LogLevel::Warn });
        print!("{}", Config::default_toml());
        return Ok(ExitCode::SUCCESS);
    }

    // A no-op trigger touches neither configuration nor lock state.
    if let Commands::Trigger(args) = &cli.command {
        if args.no_build() {
            init_logging(if cli.verbose { LogLevel::Debug } else { LogLevel::Warn });
            log_cli_debug!("Trigger without build, nothing to do");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let project = Project::load(&cli)?;
    init_logging(if project.config.coordinator.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Warn
    });
    log_cli_debug!(
        "Project resolved",
        root = tracing::field::display(project.root.display()),
        base = project.layout.base()
    );

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Trigger(args) => rt.block_on(trigger::run(&project, args)),
        Commands::Cancel { wait } => rt.block_on(owner::cancel(&project, wait)),
        Commands::Status { json } => owner::status(&project, json),
        Commands::Reset => owner::reset(&project),
        Commands::Config { .. } => {
            let rendered = toml::to_string_pretty(&project.config)
                .context("Failed to render configuration")?;
            print!("{}", rendered);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Clamp an exit status into the range a process can report.
pub fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
