//! Decides whether a transaction's request is performed.

use hookwire_core::{TestStatus, Transaction};
use hookwire_core::config::RunnerConfig;

/// Outcome of the pre-request checks, in the order they are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    /// A hook set `skip`.
    SkippedByHook,
    /// A hook set `fail`; carries its message.
    FailedByHook(String),
    /// A hook errored and already failed the test.
    AlreadyFailed,
    /// Dry run: hooks run, requests do not.
    DryRun,
    /// Names mode: the name is listed instead.
    ListName,
    /// The request method is not in the method filter.
    MethodFiltered(String),
    /// The transaction is not in the `only` list.
    NotSelected,
    /// Perform the request.
    Perform,
}

impl Gate {
    /// Applies the checks to `transaction`.
    pub fn check(transaction: &Transaction, config: &RunnerConfig) -> Self {
        if transaction.skip {
            return Self::SkippedByHook;
        }
        if let Some(fail) = &transaction.fail {
            return Self::FailedByHook(fail.clone());
        }
        if transaction.status() == TestStatus::Fail {
            return Self::AlreadyFailed;
        }
        if config.dry_run {
            return Self::DryRun;
        }
        if config.names {
            return Self::ListName;
        }
        let method = transaction.method().unwrap_or_default();
        if !config.allows_method(method) {
            return Self::MethodFiltered(method.to_string());
        }
        if !config.allows_name(&transaction.name) {
            return Self::NotSelected;
        }
        Self::Perform
    }
}
