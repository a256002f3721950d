//! Transaction pipeline: fires the lifecycle events in a fixed order.
//!
//! ```text
//! beforeAll
//! for each transaction, in order:
//!     beforeEach, before[name], beforeEachValidation, beforeValidation[name]
//!     skip | fail | perform
//!     after[name], afterEach
//!     evaluate
//! afterAll
//! ```
//!
//! The fault slot is checked before every stage. Once it holds an error the
//! run stops, every backend is shut down, and that error is returned.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use hookwire_core::config::RunnerConfig;
use hookwire_core::{AppResult, TestStatus, Transaction};
use hookwire_hooks::{HookBackend, HookData, HookDispatcher, HookEventKind};

use crate::executor::{ExecutionError, TransactionExecutor};
use crate::gate::Gate;
use crate::report::RunReport;

/// Skip reason for a hook-set `skip`.
pub const SKIPPED_IN_BEFORE_HOOK: &str = "Skipped in before hook";

/// Runs transactions through the hook lifecycle.
#[derive(Debug)]
pub struct TransactionRunner {
    /// Dispatches events; owns the registry and the fault slot.
    dispatcher: HookDispatcher,
    /// Skip rules.
    config: RunnerConfig,
    /// Performs requests; without one, every request is skipped.
    executor: Option<Arc<dyn TransactionExecutor>>,
    /// Torn down when the run aborts.
    backends: Vec<Arc<dyn HookBackend>>,
}

impl TransactionRunner {
    /// Creates a runner with no executor and no backends.
    pub fn new(dispatcher: HookDispatcher, config: RunnerConfig) -> Self {
        Self {
            dispatcher,
            config,
            executor: None,
            backends: Vec::new(),
        }
    }

    /// Sets the request executor.
    pub fn with_executor(mut self, executor: Arc<dyn TransactionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Adds a backend to shut down if the run aborts.
    pub fn with_backend(mut self, backend: Arc<dyn HookBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Runs every transaction through the lifecycle.
    ///
    /// Hook failures become failing tests; a fatal error stops the run and
    /// is returned after the backends have been shut down.
    pub async fn run(&self, transactions: &mut Vec<Transaction>) -> AppResult<RunReport> {
        info!(count = transactions.len(), "Executing transactions");

        match self.run_lifecycle(transactions).await {
            Ok(report) => {
                info!(
                    tests = report.stats.tests,
                    passes = report.stats.passes,
                    failures = report.stats.failures,
                    errors = report.stats.errors,
                    skipped = report.stats.skipped,
                    duration_ms = report.duration_ms().unwrap_or_default(),
                    "Run complete"
                );
                Ok(report)
            }
            Err(err) => {
                error!(error = %err, "Run aborted");
                self.shutdown_backends().await;
                Err(err)
            }
        }
    }

    async fn run_lifecycle(&self, transactions: &mut Vec<Transaction>) -> AppResult<RunReport> {
        let mut report = RunReport::start();

        self.dispatch_global(HookEventKind::BeforeAll, HookData::Transactions(&mut *transactions))
            .await?;

        for index in 0..transactions.len() {
            let transaction = &mut transactions[index];
            info!(index = index + 1, transaction = %transaction.name, "Processing transaction");

            self.dispatch_global(HookEventKind::BeforeEach, HookData::Transaction(&mut *transaction))
                .await?;
            self.dispatch_named(HookEventKind::Before, transaction).await?;
            self.dispatch_global(
                HookEventKind::BeforeEachValidation,
                HookData::Transaction(&mut *transaction),
            )
            .await?;
            self.dispatch_named(HookEventKind::BeforeValidation, transaction)
                .await?;

            self.dispatcher.fault().check()?;
            self.execute(transaction).await?;

            self.dispatch_named(HookEventKind::After, transaction).await?;
            self.dispatch_global(HookEventKind::AfterEach, HookData::Transaction(&mut *transaction))
                .await?;

            self.dispatcher.fault().check()?;
            evaluate(transaction);
            debug!(
                transaction = %transaction.name,
                status = %transaction.status(),
                "Evaluated transaction"
            );
            report.record(transaction);
        }

        self.dispatch_global(HookEventKind::AfterAll, HookData::Transactions(&mut *transactions))
            .await?;
        self.dispatcher.fault().check()?;

        report.finish();
        Ok(report)
    }

    async fn dispatch_global(&self, event: HookEventKind, data: HookData<'_>) -> AppResult<()> {
        self.dispatcher.fault().check()?;
        debug!(event = %event, "Running hooks");
        let result = self.dispatcher.invoke_global(event, data).await;
        match result.aborted {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn dispatch_named(
        &self,
        event: HookEventKind,
        transaction: &mut Transaction,
    ) -> AppResult<()> {
        self.dispatcher.fault().check()?;
        debug!(event = %event, transaction = %transaction.name, "Running hooks");
        let result = self.dispatcher.invoke_named(event, transaction).await;
        match result.aborted {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Applies the skip rules, then performs the request if they allow it.
    async fn execute(&self, transaction: &mut Transaction) -> AppResult<()> {
        transaction.started_at = Some(Utc::now());
        transaction.ensure_test();

        match Gate::check(transaction, &self.config) {
            Gate::SkippedByHook => {
                debug!(transaction = %transaction.name, "Transaction marked as skipped in hooks");
                transaction.mark_skipped(Some(SKIPPED_IN_BEFORE_HOOK));
            }
            Gate::FailedByHook(reason) => {
                debug!(transaction = %transaction.name, "Transaction marked as failed in hooks");
                transaction.mark_failed(format!("Failed in before hook: {reason}"));
            }
            Gate::AlreadyFailed => {
                debug!(transaction = %transaction.name, "Transaction failed in hooks, not performing request");
            }
            Gate::DryRun => {
                info!(transaction = %transaction.name, "Dry run. Not performing HTTP request");
                transaction.mark_skipped(None);
            }
            Gate::ListName => {
                info!("{}", transaction.name);
                transaction.mark_skipped(None);
            }
            Gate::MethodFiltered(method) => {
                let allowed: Vec<String> =
                    self.config.method.iter().map(|m| m.to_uppercase()).collect();
                info!(
                    transaction = %transaction.name,
                    "Only {} requests are set to be executed. Not performing HTTP {} request.",
                    allowed.join(", "),
                    method.to_uppercase()
                );
                transaction.mark_skipped(None);
            }
            Gate::NotSelected => {
                info!(
                    "Only '{}' transaction is set to be executed. Not performing HTTP request for '{}'.",
                    self.config.only.join(", "),
                    transaction.name
                );
                transaction.mark_skipped(None);
            }
            Gate::Perform => match &self.executor {
                Some(executor) => match executor.execute(transaction).await {
                    Ok(()) => {}
                    Err(ExecutionError::Request(message)) => {
                        warn!(transaction = %transaction.name, error = %message, "Request failed");
                        transaction.mark_errored(message);
                    }
                    Err(ExecutionError::Fatal(err)) => return Err(err),
                },
                None => {
                    debug!(transaction = %transaction.name, "No request executor, not performing request");
                    transaction.mark_skipped(None);
                }
            },
        }

        Ok(())
    }

    async fn shutdown_backends(&self) {
        for backend in &self.backends {
            info!(backend = %backend.name(), "Shutting down hook backend");
            if let Err(err) = backend.shutdown().await {
                warn!(backend = %backend.name(), error = %err, "Hook backend shutdown failed");
            }
        }
    }
}

/// Settles the final status of a transaction after its `after` hooks ran.
///
/// A failure recorded earlier is kept as is, so a `fail` set again in an
/// `after` hook is not reported twice.
fn evaluate(transaction: &mut Transaction) {
    if transaction.skip {
        if transaction.status() != TestStatus::Skip {
            transaction.mark_skipped(None);
        }
        return;
    }

    match transaction.status() {
        TestStatus::Fail | TestStatus::Error => {}
        _ => {
            let valid = transaction.test.as_ref().and_then(|t| t.valid);
            match (valid, transaction.fail.clone()) {
                (Some(true), Some(reason)) => {
                    transaction.mark_failed(format!("Failed in after hook: {reason}"));
                }
                (Some(true), None) => {
                    transaction.ensure_test().status = TestStatus::Pass;
                }
                _ => {
                    transaction.ensure_test().status = TestStatus::Fail;
                }
            }
        }
    }
}
