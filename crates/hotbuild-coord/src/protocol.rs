//! The preemption protocol.
//!
//! Turns "I want the build slot" into either sole ownership or a classified
//! failure, using nothing but the build slot, the kill slot, the ownership
//! record and cancellation signals.
//!
//! Rules every path obeys:
//! - only the atomic `mkdir` decides who holds a slot;
//! - a peer's ownership record is read, never deleted;
//! - every wait is bounded, and running out aborts this invocation without
//!   touching the peer.

use hotbuild_config::{log_coord_debug, log_coord_info, log_coord_warn, RetryConfig};
use hotbuild_lock::{LockError, StateLayout};

use crate::error::{CoordError, Result};
use crate::signal::{Canceller, Delivery};

/// Why the slot is being claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// A fresh trigger that has never held the slot.
    Newcomer,
    /// An owner reclaiming the slot it dropped for its debounce delay.
    Revalidating,
}

/// Successful protocol results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The build slot is held by this invocation. `holds_kill_slot` is set
    /// when ownership was won by preempting and the kill slot is still held.
    Owner { holds_kill_slot: bool },
    /// A newer trigger took the slot during our debounce delay.
    Superseded,
}

/// One run of the protocol on behalf of invocation `pid`.
pub struct Preemption<'a, C: Canceller> {
    layout: &'a StateLayout,
    retry: &'a RetryConfig,
    canceller: &'a C,
    pid: u32,
}

impl<'a, C: Canceller> Preemption<'a, C> {
    pub fn new(layout: &'a StateLayout, retry: &'a RetryConfig, canceller: &'a C, pid: u32) -> Self {
        Self {
            layout,
            retry,
            canceller,
            pid,
        }
    }

    /// Run the protocol. On error, any slot taken along the way is released.
    pub async fn claim(&self, role: Role) -> Result<Claim> {
        let mut holds_kill_slot = false;
        let result = self.claim_inner(role, &mut holds_kill_slot).await;
        if result.is_err() && holds_kill_slot {
            self.layout.kill_slot().release()?;
        }
        result
    }

    async fn claim_inner(&self, role: Role, holds_kill_slot: &mut bool) -> Result<Claim> {
        let build_slot = self.layout.build_slot();

        for round in 0..=self.retry.preempt_rounds {
            if build_slot.try_acquire()? {
                let reconciled = match role {
                    Role::Revalidating => self.verify_own_record(),
                    Role::Newcomer => self.reconcile_stale_record().await,
                };
                if let Err(e) = reconciled {
                    build_slot.release()?;
                    return Err(e);
                }
                log_coord_debug!("Build slot held", pid = self.pid, round = round);
                return Ok(Claim::Owner {
                    holds_kill_slot: *holds_kill_slot,
                });
            }

            if role == Role::Revalidating {
                log_coord_info!("Slot taken during debounce, yielding", pid = self.pid);
                return Ok(Claim::Superseded);
            }

            // Someone else holds the slot: preempt them, then retry.
            if !*holds_kill_slot {
                self.acquire_kill_slot().await?;
                *holds_kill_slot = true;
            }

            let Some(victim) = self.await_victim().await? else {
                // Holder released before ever recording itself.
                continue;
            };
            if victim == self.pid {
                return Err(CoordError::ProtocolViolation(format!(
                    "ownership record names this invocation ({}) but the build slot is held elsewhere",
                    self.pid
                )));
            }

            log_coord_info!("Preempting current owner", victim = victim, pid = self.pid);
            if self.cancel_and_wait(victim).await? == Teardown::Orphaned {
                // The next round tells a crashed holder from a fresh one.
                log_coord_warn!("Owner died before tearing down", victim = victim);
            }
        }

        Err(CoordError::ContentionTimeout {
            what: "build slot",
            attempts: self.retry.preempt_rounds + 1,
        })
    }

    /// After reclaiming the slot, the record must still be ours.
    fn verify_own_record(&self) -> Result<()> {
        match self.layout.record().read()? {
            Some(pid) if pid == self.pid => Ok(()),
            Some(other) => Err(CoordError::ProtocolViolation(format!(
                "ownership record names {} after revalidation by {}",
                other, self.pid
            ))),
            None => Err(CoordError::ProtocolViolation(format!(
                "ownership record of {} vanished during debounce",
                self.pid
            ))),
        }
    }

    /// A fresh owner deals with whatever record a previous holder left.
    async fn reconcile_stale_record(&self) -> Result<()> {
        let previous = match self.layout.record().read() {
            Ok(previous) => previous,
            Err(LockError::MalformedRecord { path, contents }) => {
                log_coord_warn!(
                    "Ignoring malformed ownership record",
                    path = tracing::field::display(path.display()),
                    contents = contents.as_str()
                );
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        match previous {
            None => {
                log_coord_debug!("Fresh powder", pid = self.pid);
                Ok(())
            }
            Some(pid) if pid == self.pid => Ok(()),
            Some(pid) if !self.canceller.is_alive(pid) => {
                log_coord_warn!("Reclaiming record of dead owner", previous = pid);
                Ok(())
            }
            Some(pid) => {
                log_coord_info!("Cancelling stale owner", victim = pid, pid = self.pid);
                // We hold the slot, so a dead-with-record victim is simply an orphan.
                self.cancel_and_wait(pid).await.map(|_| ())
            }
        }
    }

    async fn acquire_kill_slot(&self) -> Result<()> {
        let kill_slot = self.layout.kill_slot();
        for attempt in 0..self.retry.kill_slot_attempts {
            if kill_slot.try_acquire()? {
                log_coord_debug!("Kill slot held", pid = self.pid, attempt = attempt);
                return Ok(());
            }
            tokio::time::sleep(self.retry.kill_slot_backoff()).await;
        }
        Err(CoordError::ContentionTimeout {
            what: "kill slot",
            attempts: self.retry.kill_slot_attempts,
        })
    }

    /// Learn who holds the build slot.
    ///
    /// The winner of the `mkdir` race writes its record a moment later, so an
    /// absent record, or one still naming a dead previous owner, gets a short
    /// grace period. `Ok(None)` means the slot was released meanwhile and
    /// acquisition should simply be retried.
    async fn await_victim(&self) -> Result<Option<u32>> {
        let record = self.layout.record();
        let build_slot = self.layout.build_slot();
        let mut dead = None;

        for _ in 0..=self.retry.record_grace_attempts {
            match record.read()? {
                Some(pid) if self.canceller.is_alive(pid) => return Ok(Some(pid)),
                stale => dead = stale,
            }
            if !build_slot.exists() {
                return Ok(None);
            }
            tokio::time::sleep(self.retry.record_grace_backoff()).await;
        }

        Err(CoordError::ProtocolViolation(match dead {
            Some(pid) => format!(
                "owner {} exited without releasing {}; run `hotbuild reset`",
                pid,
                build_slot.path().display()
            ),
            None => format!(
                "{} is held but no ownership record appeared at {}",
                build_slot.path().display(),
                record.path().display()
            ),
        }))
    }

    /// Signal `victim` and poll until its record is gone.
    async fn cancel_and_wait(&self, victim: u32) -> Result<Teardown> {
        let record = self.layout.record();

        if self.canceller.cancel(victim)? == Delivery::Gone {
            log_coord_debug!("Victim already gone", victim = victim);
        }

        for attempt in 0..self.retry.teardown_attempts {
            // Liveness first: a dead victim can no longer remove its record,
            // so if the record still names it afterwards it never will.
            let alive = self.canceller.is_alive(victim);
            if record.read()? != Some(victim) {
                log_coord_debug!("Victim tore down", victim = victim, attempt = attempt);
                return Ok(Teardown::Completed);
            }
            if !alive {
                log_coord_warn!("Victim died without teardown", victim = victim);
                return Ok(Teardown::Orphaned);
            }
            tokio::time::sleep(self.retry.teardown_backoff()).await;
        }

        Err(CoordError::ContentionTimeout {
            what: "owner teardown",
            attempts: self.retry.teardown_attempts,
        })
    }
}

/// How waiting on a cancelled owner ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    /// The record no longer names the victim.
    Completed,
    /// The victim is dead and its record is stuck.
    Orphaned,
}
