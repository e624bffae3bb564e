//! # hotbuild-coord
//!
//! Self-preempting build coordination.
//!
//! Every trigger (an editor save, a file watcher event) runs as its own
//! process. The newest trigger cancels whatever build is in flight for the
//! same project and becomes the sole owner; at most one pipeline ever runs.
//!
//! ## Layout
//!
//! ```text
//! <state_dir>/
//! ├── <base>.lock/       # build slot (mkdir mutex)
//! ├── <base>.kill.lock/  # kill slot, serializes preempters
//! ├── <base>.pid         # ownership record
//! ├── <base>.cancel      # cancel trampoline
//! └── <base>.log         # owner output
//! ```
//!
//! - [`protocol`]: acquiring the build slot, preempting the current owner
//! - [`machine`]: the per-invocation state machine
//! - [`pipeline`]: the pluggable build steps
//! - [`signal`]: cancellation delivery and handling

pub mod error;
pub mod machine;
pub mod pipeline;
pub mod protocol;
pub mod signal;
pub mod sink;

pub use error::{CoordError, Outcome, Phase, Result, EXIT_ABORTED};
pub use machine::Coordinator;
pub use pipeline::{Action, Pipeline, ShellAction, StepStatus};
pub use protocol::{Claim, Preemption, Role};
pub use signal::{install_cancel_handler, Canceller, Delivery, SignalCanceller};
pub use sink::LogSink;
