//! # hookwire-hooks
//!
//! In-process hook registry for Hookwire. Provides:
//!
//! - Typed lifecycle events, global and per-transaction
//! - A registry that keeps hooks in registration order
//! - A dispatcher that runs every hook for an event in order and collects failures
//! - Closure adapters for native hooks
//! - The [`HookBackend`] seam used to tear down out-of-process hook handlers

pub mod backend;
pub mod definitions;
pub mod dispatcher;
pub mod error;
pub mod func;
pub mod registry;

pub use backend::HookBackend;
pub use definitions::{HookData, HookEventKind};
pub use dispatcher::{DispatchResult, HookDispatcher, HookFailure};
pub use error::HookError;
pub use func::FnHook;
pub use registry::{Hook, HookRegistry};
