//! # hookwire-runner
//!
//! Transaction pipeline. Transactions run strictly one after another; each
//! passes through the hook stages in lifecycle order, its request is
//! skipped, failed, or handed to a [`TransactionExecutor`], and its result
//! is evaluated into a [`RunReport`].

pub mod executor;
pub mod gate;
pub mod pipeline;
pub mod report;

pub use executor::{ExecutionError, TransactionExecutor};
pub use gate::Gate;
pub use pipeline::{SKIPPED_IN_BEFORE_HOOK, TransactionRunner};
pub use report::{RunReport, RunStats, TransactionOutcome};
