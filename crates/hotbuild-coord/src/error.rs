use std::fmt;

use thiserror::Error;

/// Exit status for suppressed, aborted and cancelled invocations.
pub const EXIT_ABORTED: i32 = 1;

/// Where an invocation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Init,
    Acquiring,
    Locked,
    PrePass,
    Debouncing,
    Revalidating,
    Building,
    Linting,
    Testing,
    Done,
    Killed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::Acquiring => "acquiring",
            Phase::Locked => "locked",
            Phase::PrePass => "pre-pass",
            Phase::Debouncing => "debouncing",
            Phase::Revalidating => "revalidating",
            Phase::Building => "building",
            Phase::Linting => "linting",
            Phase::Testing => "testing",
            Phase::Done => "done",
            Phase::Killed => "killed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum CoordError {
    /// Lock state was mutated outside the protocol. Never retried.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A bounded wait ran out. Peer state is left untouched.
    #[error("gave up waiting for {what} after {attempts} attempts")]
    ContentionTimeout { what: &'static str, attempts: u32 },

    /// The target still exists but could not be signalled.
    #[error("failed to signal pid {pid}: {source}")]
    SignalDelivery {
        pid: u32,
        #[source]
        source: nix::Error,
    },

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Lock(#[from] hotbuild_lock::LockError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoordError>;

/// How an invocation ended, short of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The trigger asked for no build.
    NoOp,
    /// Every pipeline phase ran and succeeded.
    Completed,
    /// Cancelled by a newer trigger (or the user) at `phase`.
    Killed { phase: Phase },
    /// A pipeline step exited unsuccessfully; `code` is `None` if it died by signal.
    StepFailed { phase: Phase, code: Option<i32> },
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::NoOp | Outcome::Completed => 0,
            Outcome::Killed { .. } => EXIT_ABORTED,
            Outcome::StepFailed { code, .. } => match code {
                Some(c) if *c != 0 => *c,
                _ => EXIT_ABORTED,
            },
        }
    }
}
