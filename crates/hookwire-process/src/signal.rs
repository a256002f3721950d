//! Platform signalling strategies.
//!
//! The strategy is chosen once when the supervisor is created, see
//! [`default_signaller`].

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::Mutex;

/// ASCII end-of-text, what a terminal sends for Ctrl+C.
pub const ASCII_CTRL_C: u8 = 0x03;

/// Target of a signal: the PID plus the child's stdin.
#[derive(Debug, Clone, Copy)]
pub struct SignalTarget<'a> {
    /// Process ID.
    pub pid: u32,
    /// The child's stdin, if still open.
    pub stdin: &'a Mutex<Option<ChildStdin>>,
}

/// Sends graceful and forceful stop requests to a process.
#[async_trait]
pub trait Signaller: Send + Sync + std::fmt::Debug {
    /// Asks the process to stop. Best effort.
    async fn terminate(&self, target: SignalTarget<'_>) -> io::Result<()>;

    /// Ends the process unconditionally.
    async fn kill(&self, target: SignalTarget<'_>) -> io::Result<()>;
}

/// `SIGTERM` / `SIGKILL` via `kill(2)`.
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct PosixSignaller;

#[cfg(unix)]
impl PosixSignaller {
    fn send(pid: u32, signal: libc::c_int) -> io::Result<()> {
        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "PID out of range"))?;
        // SAFETY: kill(2) has no memory-safety preconditions.
        let rc = unsafe { libc::kill(pid, signal) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        // Already gone: nothing left to signal.
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        Err(err)
    }
}

#[cfg(unix)]
#[async_trait]
impl Signaller for PosixSignaller {
    async fn terminate(&self, target: SignalTarget<'_>) -> io::Result<()> {
        Self::send(target.pid, libc::SIGTERM)
    }

    async fn kill(&self, target: SignalTarget<'_>) -> io::Result<()> {
        Self::send(target.pid, libc::SIGKILL)
    }
}

/// Writes Ctrl+C to stdin for graceful stops and runs `taskkill` to kill.
///
/// Used where the OS has no termination signals.
#[derive(Debug, Default, Clone, Copy)]
pub struct CtrlCSignaller;

#[async_trait]
impl Signaller for CtrlCSignaller {
    async fn terminate(&self, target: SignalTarget<'_>) -> io::Result<()> {
        let mut stdin = target.stdin.lock().await;
        match stdin.as_mut() {
            Some(stdin) => {
                stdin.write_all(&[ASCII_CTRL_C]).await?;
                stdin.flush().await
            }
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "stdin of the process is closed",
            )),
        }
    }

    async fn kill(&self, target: SignalTarget<'_>) -> io::Result<()> {
        let status = tokio::process::Command::new("taskkill")
            .args(["/F", "/T", "/PID", &target.pid.to_string()])
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "Unable to forcefully terminate process {}",
                target.pid
            )))
        }
    }
}

/// Returns the signalling strategy for the current platform.
pub fn default_signaller() -> Arc<dyn Signaller> {
    #[cfg(unix)]
    {
        Arc::new(PosixSignaller)
    }
    #[cfg(not(unix))]
    {
        Arc::new(CtrlCSignaller)
    }
}
