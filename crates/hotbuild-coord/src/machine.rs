//! The per-invocation state machine.
//!
//! ```text
//! INIT -> ACQUIRING -> LOCKED -> [PRE_PASS -> DEBOUNCING -> REVALIDATING]
//!      -> BUILDING -> LINTING -> TESTING -> DONE
//! ```
//!
//! Any state after INIT may divert to KILLED when cancellation is observed.
//! Cancellation is checked between states and during the debounce sleep;
//! a running pipeline step is never interrupted.

use std::time::Duration;

use hotbuild_config::{log_coord_debug, log_coord_info, log_coord_warn, RetryConfig};
use hotbuild_lock::StateLayout;
use tokio_util::sync::CancellationToken;

use crate::error::{Outcome, Phase, Result};
use crate::pipeline::{Action, Pipeline};
use crate::protocol::{Claim, Preemption, Role};
use crate::signal::{interruptible_sleep, Canceller, Wake, CANCEL_SIGNAL_NAME};
use crate::sink::LogSink;

/// Drives one trigger from INIT to a terminal state.
pub struct Coordinator<C, A> {
    layout: StateLayout,
    pid: u32,
    delay: Duration,
    retry: RetryConfig,
    context: Option<String>,
    canceller: C,
    pipeline: Pipeline<A>,
    sink: Option<LogSink>,
    token: CancellationToken,
    phase: Phase,
    holds_build_slot: bool,
    holds_kill_slot: bool,
}

impl<C: Canceller, A: Action> Coordinator<C, A> {
    pub fn new(layout: StateLayout, pid: u32, canceller: C, pipeline: Pipeline<A>) -> Self {
        Self {
            layout,
            pid,
            delay: Duration::ZERO,
            retry: RetryConfig::default(),
            context: None,
            canceller,
            pipeline,
            sink: None,
            token: CancellationToken::new(),
            phase: Phase::Init,
            holds_build_slot: false,
            holds_kill_slot: false,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }

    /// Send banners and step output here instead of `<base>.log`.
    pub fn with_sink(mut self, sink: LogSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Observe this token for cancellation.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// The current state, or the state an error was raised in.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    /// Run to completion. On error every lock artifact this invocation owns
    /// is released before the error is returned.
    pub async fn run(&mut self, build: bool) -> Result<Outcome> {
        match self.drive(build).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                log_coord_warn!(
                    "Aborting",
                    phase = self.phase.as_str(),
                    error = tracing::field::display(&e)
                );
                if let Err(cleanup) = self.teardown() {
                    log_coord_warn!("Cleanup failed", error = tracing::field::display(cleanup));
                }
                Err(e)
            }
        }
    }

    async fn drive(&mut self, build: bool) -> Result<Outcome> {
        self.enter(Phase::Init);
        if !build {
            return Ok(Outcome::NoOp);
        }
        self.layout.ensure_state_dir()?;

        self.enter(Phase::Acquiring);
        let claim = Preemption::new(&self.layout, &self.retry, &self.canceller, self.pid)
            .claim(Role::Newcomer)
            .await?;
        match claim {
            Claim::Owner { holds_kill_slot } => {
                self.holds_build_slot = true;
                self.holds_kill_slot = holds_kill_slot;
            }
            Claim::Superseded => return self.killed(),
        }
        if self.token.is_cancelled() {
            return self.killed();
        }

        self.lock()?;

        let mut pre_pass_done = false;
        if !self.delay.is_zero() {
            if let Some(outcome) = self.step(Phase::PrePass).await? {
                return Ok(outcome);
            }
            pre_pass_done = true;

            if self.token.is_cancelled() {
                return self.killed();
            }
            self.enter(Phase::Debouncing);
            self.release_kill_slot()?;
            self.release_build_slot()?;
            if interruptible_sleep(self.delay, &self.token).await == Wake::Cancelled {
                return self.killed();
            }

            self.enter(Phase::Revalidating);
            let claim = Preemption::new(&self.layout, &self.retry, &self.canceller, self.pid)
                .claim(Role::Revalidating)
                .await?;
            match claim {
                Claim::Owner { .. } => self.holds_build_slot = true,
                Claim::Superseded => return self.killed(),
            }
        } else {
            self.release_kill_slot()?;
        }

        let steps = [Phase::PrePass, Phase::Building, Phase::Linting, Phase::Testing];
        for phase in steps {
            if phase == Phase::PrePass && pre_pass_done {
                continue;
            }
            if let Some(outcome) = self.step(phase).await? {
                return Ok(outcome);
            }
        }

        self.enter(Phase::Done);
        self.teardown()?;
        self.sink().line(format!("==> done ({})", self.pid));
        log_coord_info!("Build finished", pid = self.pid);
        Ok(Outcome::Completed)
    }

    /// Publish ownership and start a fresh log.
    fn lock(&mut self) -> Result<()> {
        self.enter(Phase::Locked);
        self.layout.record().write(self.pid)?;
        self.layout.trampoline().write(self.pid, CANCEL_SIGNAL_NAME)?;

        if self.sink.is_none() {
            self.sink = Some(LogSink::open(self.layout.log_path())?);
        }
        let sink = self.sink();
        sink.reset()?;
        match &self.context {
            Some(context) => sink.line(format!("==> hotbuild owner {} ({})", self.pid, context)),
            None => sink.line(format!("==> hotbuild owner {}", self.pid)),
        }
        log_coord_info!("Owner locked", pid = self.pid);
        Ok(())
    }

    /// Run one pipeline step. `Some` ends the run.
    async fn step(&mut self, phase: Phase) -> Result<Option<Outcome>> {
        if self.token.is_cancelled() {
            return self.killed().map(Some);
        }
        self.enter(phase);

        let Some(action) = self.pipeline.action(phase) else {
            log_coord_debug!("No action, skipping", phase = phase.as_str());
            return Ok(None);
        };
        let sink = self.sink();
        sink.line(format!("==> {}", phase));
        let status = action.run(&sink).await?;

        if status.success() {
            return Ok(None);
        }
        log_coord_warn!(
            "Step failed",
            phase = phase.as_str(),
            code = tracing::field::debug(status.code())
        );
        self.teardown()?;
        Ok(Some(Outcome::StepFailed {
            phase,
            code: status.code(),
        }))
    }

    fn killed(&mut self) -> Result<Outcome> {
        let phase = self.phase;
        self.enter(Phase::Killed);
        self.teardown()?;
        if let Some(sink) = &self.sink {
            sink.line(format!("==> killed during {} ({})", phase, self.pid));
        }
        log_coord_info!("Cancelled", phase = phase.as_str(), pid = self.pid);
        Ok(Outcome::Killed { phase })
    }

    /// Release everything this invocation owns. Safe to repeat.
    ///
    /// The record goes last: its disappearance tells a waiting preempter
    /// that teardown is complete.
    fn teardown(&mut self) -> Result<()> {
        self.release_build_slot()?;
        self.release_kill_slot()?;

        let record = self.layout.record();
        let owned = matches!(record.read(), Ok(Some(pid)) if pid == self.pid);
        if owned {
            self.layout.trampoline().remove()?;
            record.remove()?;
        }
        Ok(())
    }

    fn release_build_slot(&mut self) -> Result<()> {
        if self.holds_build_slot {
            self.layout.build_slot().release()?;
            self.holds_build_slot = false;
        }
        Ok(())
    }

    fn release_kill_slot(&mut self) -> Result<()> {
        if self.holds_kill_slot {
            self.layout.kill_slot().release()?;
            self.holds_kill_slot = false;
        }
        Ok(())
    }

    fn sink(&self) -> LogSink {
        self.sink.clone().unwrap_or_else(LogSink::discard)
    }

    fn enter(&mut self, phase: Phase) {
        log_coord_debug!("State", phase = phase.as_str(), pid = self.pid);
        self.phase = phase;
    }
}

impl<C, A> std::fmt::Debug for Coordinator<C, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("pid", &self.pid)
            .field("phase", &self.phase)
            .field("base", &self.layout.base())
            .finish()
    }
}
