//! # hookwire-core
//!
//! Core crate for Hookwire. Contains the unified error system, configuration
//! schemas, the transaction model shared by hooks and the pipeline, and the
//! fatal-error slot that lets a crashed hook handler abort a run.
//!
//! This crate has **no** internal dependencies on other Hookwire crates.

pub mod config;
pub mod error;
pub mod fault;
pub mod result;
pub mod transaction;

pub use error::{AppError, ErrorKind};
pub use fault::FaultSlot;
pub use result::AppResult;
pub use transaction::{TestRecord, TestStatus, Transaction};
