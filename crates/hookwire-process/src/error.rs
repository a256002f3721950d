//! Process supervisor errors.

use thiserror::Error;

use hookwire_core::error::{AppError, ErrorKind};

/// Errors from spawning, signalling, or terminating a child process.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable could not be started.
    #[error("Unable to start process '{command}': {source}")]
    Spawn {
        /// The command line that was attempted.
        command: String,
        /// The OS error.
        #[source]
        source: std::io::Error,
    },

    /// Sending a signal to the process failed.
    #[error("Unable to signal process {pid}: {source}")]
    Signal {
        /// The target PID.
        pid: u32,
        /// The OS error.
        #[source]
        source: std::io::Error,
    },

    /// The process kept running through the graceful termination window.
    #[error("Unable to gracefully terminate process {pid}")]
    Termination {
        /// The PID that is still running.
        pid: u32,
    },
}

impl From<ProcessError> for AppError {
    fn from(err: ProcessError) -> Self {
        let kind = match &err {
            ProcessError::Spawn { .. } => ErrorKind::Spawn,
            ProcessError::Signal { .. } | ProcessError::Termination { .. } => {
                ErrorKind::Termination
            }
        };
        let message = err.to_string();
        AppError::with_source(kind, message, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_into_run_level_kinds() {
        let spawn = AppError::from(ProcessError::Spawn {
            command: "dredd-hooks-ruby hooks.rb".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
        assert_eq!(spawn.kind, ErrorKind::Spawn);
        assert!(spawn.message.contains("dredd-hooks-ruby hooks.rb"));
        assert!(std::error::Error::source(&spawn).is_some());

        let stuck = AppError::from(ProcessError::Termination { pid: 42 });
        assert_eq!(stuck.kind, ErrorKind::Termination);
        assert_eq!(stuck.message, "Unable to gracefully terminate process 42");
    }
}
