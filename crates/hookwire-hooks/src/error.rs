//! Hook errors.

use thiserror::Error;

use hookwire_core::error::AppError;

use crate::definitions::HookEventKind;

/// Error returned by a hook body or by registration.
#[derive(Debug, Error)]
pub enum HookError {
    /// An assertion inside the hook did not hold.
    #[error("Failed assertion in hooks: {0}")]
    Assertion(String),

    /// The hook failed for any other reason.
    #[error("Hook failed: {0}")]
    Failed(String),

    /// A hook was registered with the wrong key shape.
    #[error("Cannot register '{event}' hook: {reason}")]
    InvalidRegistration {
        /// Event the registration targeted.
        event: HookEventKind,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The run hit a fatal error; no further hooks may run.
    #[error(transparent)]
    Aborted(AppError),
}

impl HookError {
    /// Convenience constructor for [`HookError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Convenience constructor for [`HookError::Assertion`].
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion(message.into())
    }
}

impl From<HookError> for AppError {
    fn from(err: HookError) -> Self {
        match err {
            HookError::Aborted(inner) => inner,
            other => AppError::hook(other.to_string()),
        }
    }
}
