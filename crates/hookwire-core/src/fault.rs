//! Fatal-error slot shared by the hook handler client and the pipeline.
//!
//! The first error stored wins and is never cleared for the lifetime of the
//! run. The pipeline checks the slot before every stage.

use std::sync::{Arc, OnceLock};

use crate::error::AppError;

/// Write-once holder for the error that aborts a run.
#[derive(Debug, Clone, Default)]
pub struct FaultSlot {
    inner: Arc<OnceLock<AppError>>,
}

impl FaultSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `err` unless an error is already present.
    ///
    /// Returns `true` when this call populated the slot.
    pub fn set(&self, err: AppError) -> bool {
        self.inner.set(err).is_ok()
    }

    /// Returns a copy of the stored error, if any.
    pub fn get(&self) -> Option<AppError> {
        self.inner.get().cloned()
    }

    /// Returns whether an error has been stored.
    pub fn is_set(&self) -> bool {
        self.inner.get().is_some()
    }

    /// Returns `Err` with the stored error, or `Ok(())` when the slot is empty.
    pub fn check(&self) -> Result<(), AppError> {
        match self.get() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
