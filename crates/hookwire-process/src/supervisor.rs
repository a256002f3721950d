//! Process supervisor: spawn, signal, terminate, and watch for crashes.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::command::CommandSpec;
use crate::error::ProcessError;
use crate::exit::{Crash, ExitInfo};
use crate::signal::{SignalTarget, Signaller, default_signaller};

/// Delay before the first exit check after the initial graceful signal.
const TERM_FIRST_CHECK: Duration = Duration::from_millis(1);

/// Target under which child output is logged.
pub const OUTPUT_TARGET: &str = "hookwire::handler_output";

type CrashCallback = Box<dyn Fn(Crash) + Send + Sync>;

/// Options for [`ManagedProcess::terminate`].
#[derive(Debug, Clone, Copy)]
pub struct TerminateOptions {
    /// How long graceful termination is attempted.
    pub timeout: Duration,
    /// Delay between graceful attempts.
    pub retry_delay: Duration,
    /// Kill the process when the graceful window passes.
    pub force: bool,
}

impl Default for TerminateOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            retry_delay: Duration::from_millis(300),
            force: false,
        }
    }
}

/// Lifecycle flags shared with the monitor task.
#[derive(Debug, Default)]
struct ProcessState {
    terminated: AtomicBool,
    killed_intentionally: AtomicBool,
    terminated_intentionally: AtomicBool,
}

/// Spawns supervised child processes.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    signaller: Arc<dyn Signaller>,
}

impl ProcessSupervisor {
    /// Creates a supervisor with the platform's signalling strategy.
    pub fn new() -> Self {
        Self {
            signaller: default_signaller(),
        }
    }

    /// Creates a supervisor with an explicit signalling strategy.
    pub fn with_signaller(signaller: Arc<dyn Signaller>) -> Self {
        Self { signaller }
    }

    /// Spawns `spec` and starts watching it.
    ///
    /// `on_crash` runs at most once, from the monitor task, when the process
    /// exits abnormally without the supervisor having asked it to. It runs
    /// before [`ManagedProcess::wait_exit`] returns for anyone.
    pub fn spawn<F>(&self, spec: &CommandSpec, on_crash: F) -> Result<ManagedProcess, ProcessError>
    where
        F: Fn(Crash) + Send + Sync + 'static,
    {
        let command_line = spec.command_line();

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            command: command_line.clone(),
            source,
        })?;

        let pid = child.id().ok_or_else(|| ProcessError::Spawn {
            command: command_line.clone(),
            source: std::io::Error::other("process exited before its PID could be read"),
        })?;

        info!(pid, command = %command_line, "Spawned process");

        if let Some(stdout) = child.stdout.take() {
            forward_output(stdout, "stdout", pid);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(stderr, "stderr", pid);
        }
        let stdin = child.stdin.take();

        let state = Arc::new(ProcessState::default());
        let (exit_tx, exit_rx) = watch::channel(None);

        tokio::spawn(monitor(
            child,
            pid,
            command_line.clone(),
            Arc::clone(&state),
            exit_tx,
            Box::new(on_crash),
        ));

        Ok(ManagedProcess {
            pid,
            command_line,
            state,
            stdin: Mutex::new(stdin),
            exit_rx,
            signaller: Arc::clone(&self.signaller),
        })
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for the child, records how it ended, and reports crashes.
async fn monitor(
    mut child: Child,
    pid: u32,
    command_line: String,
    state: Arc<ProcessState>,
    exit_tx: watch::Sender<Option<ExitInfo>>,
    on_crash: CrashCallback,
) {
    let exit = match child.wait().await {
        Ok(status) => ExitInfo::from(status),
        Err(e) => {
            error!(pid, error = %e, "Failed to wait for process");
            ExitInfo::default()
        }
    };

    state.terminated.store(true, Ordering::SeqCst);
    let killed = state.killed_intentionally.load(Ordering::SeqCst);
    let terminated = state.terminated_intentionally.load(Ordering::SeqCst);

    debug!(
        pid,
        code = ?exit.code,
        signal = ?exit.signal,
        killed_intentionally = killed,
        terminated_intentionally = terminated,
        "Process exited"
    );

    if let Some(crash) = Crash::detect(&exit, killed, terminated) {
        warn!(
            pid,
            command = %command_line,
            exit_status = ?crash.exit_status,
            killed = crash.killed,
            "Process crashed"
        );
        on_crash(crash);
    }

    exit_tx.send_replace(Some(exit));
}

/// Forwards one output stream of the child to the log, line by line.
fn forward_output<R>(reader: R, stream: &'static str, pid: u32)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    info!(target: OUTPUT_TARGET, pid, stream, "{}", line.trim_end());
                }
                Err(e) => {
                    debug!(pid, stream, error = %e, "Stopped reading process output");
                    break;
                }
            }
        }
    });
}

/// A spawned child process under supervision.
#[derive(Debug)]
pub struct ManagedProcess {
    pid: u32,
    command_line: String,
    state: Arc<ProcessState>,
    stdin: Mutex<Option<ChildStdin>>,
    exit_rx: watch::Receiver<Option<ExitInfo>>,
    signaller: Arc<dyn Signaller>,
}

impl ManagedProcess {
    /// Process ID.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The command line the process was started with.
    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    /// Whether the process has exited.
    pub fn has_exited(&self) -> bool {
        self.state.terminated.load(Ordering::SeqCst)
    }

    /// Whether the supervisor killed the process.
    pub fn killed_intentionally(&self) -> bool {
        self.state.killed_intentionally.load(Ordering::SeqCst)
    }

    /// Whether the supervisor asked the process to stop.
    pub fn terminated_intentionally(&self) -> bool {
        self.state.terminated_intentionally.load(Ordering::SeqCst)
    }

    /// How the process ended, once it has.
    pub fn exit_info(&self) -> Option<ExitInfo> {
        *self.exit_rx.borrow()
    }

    /// Waits until the process has exited.
    pub async fn wait_exit(&self) -> ExitInfo {
        let mut rx = self.exit_rx.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(exit) => exit.unwrap_or_default(),
            Err(_) => ExitInfo::default(),
        }
    }

    fn target(&self) -> SignalTarget<'_> {
        SignalTarget {
            pid: self.pid,
            stdin: &self.stdin,
        }
    }

    /// Marks any exit from now on as intentional, without signalling.
    ///
    /// For shutdowns that start by closing a channel the child reacts to.
    pub fn expect_exit(&self) {
        self.state
            .terminated_intentionally
            .store(true, Ordering::SeqCst);
    }

    /// Sends the graceful stop request.
    pub async fn signal_terminate(&self) -> Result<(), ProcessError> {
        if self.has_exited() {
            return Ok(());
        }
        self.state
            .terminated_intentionally
            .store(true, Ordering::SeqCst);
        debug!(pid = self.pid, "Gracefully terminating process");
        self.signaller
            .terminate(self.target())
            .await
            .map_err(|source| ProcessError::Signal {
                pid: self.pid,
                source,
            })
    }

    /// Ends the process unconditionally.
    pub async fn signal_kill(&self) -> Result<(), ProcessError> {
        if self.has_exited() {
            return Ok(());
        }
        self.state.killed_intentionally.store(true, Ordering::SeqCst);
        debug!(pid = self.pid, "Killing process");
        self.signaller
            .kill(self.target())
            .await
            .map_err(|source| ProcessError::Signal {
                pid: self.pid,
                source,
            })
    }

    /// Terminates the process gracefully, optionally escalating to a kill.
    ///
    /// Sends the graceful request, then re-sends it every `retry_delay` until
    /// the process exits or `timeout` passes. After the timeout the process
    /// is killed when `force` is set, otherwise an error is returned.
    pub async fn terminate(&self, options: TerminateOptions) -> Result<(), ProcessError> {
        if self.has_exited() {
            debug!(pid = self.pid, "Process has already terminated");
            return Ok(());
        }

        let start = Instant::now();
        self.signal_terminate().await?;

        let mut wait = TERM_FIRST_CHECK;
        loop {
            if tokio::time::timeout(wait, self.wait_exit()).await.is_ok() {
                info!(
                    pid = self.pid,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Process terminated"
                );
                return Ok(());
            }

            if start.elapsed() < options.timeout {
                self.signal_terminate().await?;
                wait = options.retry_delay;
            } else if options.force {
                warn!(
                    pid = self.pid,
                    timeout_ms = options.timeout.as_millis() as u64,
                    "Process ignored graceful termination, killing"
                );
                self.signal_kill().await?;
                self.wait_exit().await;
                return Ok(());
            } else {
                return Err(ProcessError::Termination { pid: self.pid });
            }
        }
    }
}
