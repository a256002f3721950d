//! Exit information and crash classification.

use std::process::ExitStatus;

use serde::{Deserialize, Serialize};

/// Signal number of `SIGKILL` on every Unix.
const SIGKILL: i32 = 9;

/// How a child process ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitInfo {
    /// Exit code, when the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal, when the process was killed by one (Unix only).
    pub signal: Option<i32>,
}

impl ExitInfo {
    /// Returns whether the process exited with status 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

/// An unintentional abnormal exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crash {
    /// The non-zero exit status, if the process exited rather than being killed.
    pub exit_status: Option<i32>,
    /// Whether the process was killed with `SIGKILL`.
    pub killed: bool,
}

impl Crash {
    /// Classifies an exit.
    ///
    /// Exits caused by the supervisor's own termination requests are never
    /// crashes, and neither is exit status 0.
    pub fn detect(
        exit: &ExitInfo,
        killed_intentionally: bool,
        terminated_intentionally: bool,
    ) -> Option<Self> {
        if killed_intentionally || terminated_intentionally {
            return None;
        }
        if exit.signal == Some(SIGKILL) {
            return Some(Self {
                exit_status: None,
                killed: true,
            });
        }
        if exit.success() {
            return None;
        }
        Some(Self {
            exit_status: exit.code,
            killed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_exit_is_not_a_crash() {
        let exit = ExitInfo {
            code: Some(0),
            signal: None,
        };
        assert_eq!(Crash::detect(&exit, false, false), None);
    }

    #[test]
    fn non_zero_status_is_a_crash() {
        let exit = ExitInfo {
            code: Some(3),
            signal: None,
        };
        assert_eq!(
            Crash::detect(&exit, false, false),
            Some(Crash {
                exit_status: Some(3),
                killed: false
            })
        );
    }

    #[test]
    fn sigkill_is_reported_as_killed() {
        let exit = ExitInfo {
            code: None,
            signal: Some(SIGKILL),
        };
        assert_eq!(
            Crash::detect(&exit, false, false),
            Some(Crash {
                exit_status: None,
                killed: true
            })
        );
    }

    #[test]
    fn other_signals_crash_without_status() {
        let exit = ExitInfo {
            code: None,
            signal: Some(11),
        };
        assert_eq!(
            Crash::detect(&exit, false, false),
            Some(Crash {
                exit_status: None,
                killed: false
            })
        );
    }

    #[test]
    fn intentional_exits_never_crash() {
        let exit = ExitInfo {
            code: None,
            signal: Some(SIGKILL),
        };
        assert_eq!(Crash::detect(&exit, true, false), None);
        assert_eq!(Crash::detect(&exit, false, true), None);
    }
}
