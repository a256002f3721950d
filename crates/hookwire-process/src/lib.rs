//! # hookwire-process
//!
//! Supervisor for a single child process. It spawns the process, forwards
//! its stdout/stderr to `tracing`, sends graceful and forceful termination
//! signals, and reports unintentional abnormal exits as crashes.
//!
//! ## Signals
//!
//! On Unix graceful termination is `SIGTERM` and forceful termination is
//! `SIGKILL`. Elsewhere graceful termination writes ASCII `0x03` (Ctrl+C) to
//! the child's stdin, and the child is expected to treat that byte as a stop
//! request; forceful termination runs `taskkill /F /T /PID <pid>`.

pub mod command;
pub mod error;
pub mod exit;
pub mod signal;
pub mod supervisor;

pub use command::CommandSpec;
pub use error::ProcessError;
pub use exit::{Crash, ExitInfo};
#[cfg(unix)]
pub use signal::PosixSignaller;
pub use signal::{CtrlCSignaller, SignalTarget, Signaller, default_signaller};
pub use supervisor::{ManagedProcess, ProcessSupervisor, TerminateOptions};
