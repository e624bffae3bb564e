//! Cancellation plumbing.
//!
//! Outbound: a [`Canceller`] delivers "stop" to another invocation by pid.
//! Inbound: [`install_cancel_handler`] turns SIGTERM/SIGINT into a
//! [`CancellationToken`] that the state machine checks at its suspension
//! points. Nothing here ever interrupts a running pipeline step.

use std::time::Duration;

use hotbuild_config::{log_coord_debug, log_coord_warn};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{CoordError, Result};

/// Signal used to cancel an owner. Mirrored in the cancel trampoline.
pub const CANCEL_SIGNAL: Signal = Signal::SIGTERM;
pub const CANCEL_SIGNAL_NAME: &str = "TERM";

/// Result of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The signal was queued for a live process.
    Delivered,
    /// The target no longer exists; treat it as already cancelled.
    Gone,
}

/// Sends cancellation to another invocation and checks whether it lives.
pub trait Canceller: Send + Sync {
    fn cancel(&self, pid: u32) -> Result<Delivery>;
    fn is_alive(&self, pid: u32) -> bool;
}

/// [`Canceller`] backed by real process signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalCanceller;

fn to_pid(pid: u32) -> Option<Pid> {
    // pid 0 and negative pids address process groups; never signal those.
    i32::try_from(pid).ok().filter(|p| *p > 0).map(Pid::from_raw)
}

impl Canceller for SignalCanceller {
    fn cancel(&self, pid: u32) -> Result<Delivery> {
        let Some(target) = to_pid(pid) else {
            return Err(CoordError::SignalDelivery {
                pid,
                source: Errno::EINVAL,
            });
        };
        match kill(target, CANCEL_SIGNAL) {
            Ok(()) => {
                log_coord_debug!("Cancellation sent", pid = pid);
                Ok(Delivery::Delivered)
            }
            Err(Errno::ESRCH) => Ok(Delivery::Gone),
            Err(source) if !self.is_alive(pid) => {
                log_coord_debug!(
                    "Signal failed but target is gone",
                    pid = pid,
                    error = tracing::field::display(source)
                );
                Ok(Delivery::Gone)
            }
            Err(source) => Err(CoordError::SignalDelivery { pid, source }),
        }
    }

    fn is_alive(&self, pid: u32) -> bool {
        let Some(target) = to_pid(pid) else {
            return false;
        };
        match kill(target, None::<Signal>) {
            Ok(()) => true,
            // Exists, owned by someone else.
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }
}

/// Route SIGTERM and SIGINT into `token`.
///
/// Must be called from within a tokio runtime, and before this process writes
/// an ownership record: once installed, the default "die immediately" action
/// is gone and every cancellation goes through teardown.
pub fn install_cancel_handler(token: CancellationToken) -> Result<JoinHandle<()>> {
    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;

    Ok(tokio::spawn(async move {
        let name = tokio::select! {
            _ = term.recv() => "SIGTERM",
            _ = int.recv() => "SIGINT",
            _ = token.cancelled() => return,
        };
        log_coord_warn!("Cancellation received", signal = name);
        token.cancel();
    }))
}

/// What ended an [`interruptible_sleep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Elapsed,
    Cancelled,
}

/// Sleep for `delay` unless `token` fires first.
pub async fn interruptible_sleep(delay: Duration, token: &CancellationToken) -> Wake {
    tokio::select! {
        _ = token.cancelled() => Wake::Cancelled,
        _ = tokio::time::sleep(delay) => Wake::Elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_is_alive() {
        assert!(SignalCanceller.is_alive(std::process::id()));
    }

    #[test]
    fn test_reaped_child_is_gone() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        assert!(!SignalCanceller.is_alive(pid));
        assert_eq!(SignalCanceller.cancel(pid).unwrap(), Delivery::Gone);
    }

    #[test]
    fn test_group_pids_are_refused() {
        assert!(!SignalCanceller.is_alive(0));
        assert!(matches!(
            SignalCanceller.cancel(0),
            Err(CoordError::SignalDelivery { pid: 0, .. })
        ));
    }

    #[test]
    fn test_cancel_live_child() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();

        assert_eq!(SignalCanceller.cancel(pid).unwrap(), Delivery::Delivered);
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_elapses() {
        let token = CancellationToken::new();
        let wake = interruptible_sleep(Duration::from_secs(5), &token).await;
        assert_eq!(wake, Wake::Elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_interrupted() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let wake = interruptible_sleep(Duration::from_secs(3600), &token).await;
        assert_eq!(wake, Wake::Cancelled);
    }

    #[tokio::test]
    async fn test_handler_exits_when_token_cancelled_locally() {
        let token = CancellationToken::new();
        let handle = install_cancel_handler(token.clone()).unwrap();
        token.cancel();
        handle.await.unwrap();
    }
}
