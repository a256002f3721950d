//! Hook dispatcher: runs every hook for an event in registration order.
//!
//! - Each hook is awaited before the next one starts.
//! - A hook that fails does not stop the remaining hooks; the failure is
//!   recorded on the affected transactions as a failing test.
//! - A hook that returns [`HookError::Aborted`], or a populated fault slot,
//!   stops dispatch immediately.

use std::sync::Arc;

use tracing::{debug, warn};

use hookwire_core::error::AppError;
use hookwire_core::{FaultSlot, Transaction};

use crate::definitions::{HookData, HookEventKind};
use crate::error::HookError;
use crate::registry::{Hook, HookRegistry};

/// A hook that failed without aborting the run.
#[derive(Debug)]
pub struct HookFailure {
    /// Event being dispatched.
    pub event: HookEventKind,
    /// Position of the hook in the event's list.
    pub index: usize,
    /// Source of the failing hook.
    pub source: String,
    /// The error it returned.
    pub error: HookError,
}

/// Aggregated result of dispatching one event.
#[derive(Debug, Default)]
pub struct DispatchResult {
    /// Number of hooks that completed without error.
    pub completed: usize,
    /// Hooks that failed.
    pub failures: Vec<HookFailure>,
    /// Fatal error that stopped dispatch, if any.
    pub aborted: Option<AppError>,
}

impl DispatchResult {
    /// Returns whether dispatch was stopped by a fatal error.
    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }
}

/// Dispatches events to the hooks in a [`HookRegistry`].
#[derive(Debug, Clone)]
pub struct HookDispatcher {
    /// Hook registry.
    registry: Arc<HookRegistry>,
    /// Fatal-error slot checked before every hook.
    fault: FaultSlot,
}

impl HookDispatcher {
    /// Creates a new hook dispatcher.
    pub fn new(registry: Arc<HookRegistry>, fault: FaultSlot) -> Self {
        Self { registry, fault }
    }

    /// Runs every global hook for `event`.
    pub async fn invoke_global(&self, event: HookEventKind, data: HookData<'_>) -> DispatchResult {
        let hooks = self.registry.global_hooks(event);
        self.run(event, hooks, data).await
    }

    /// Runs every hook registered for `event` under the transaction's name.
    ///
    /// Does nothing when no hook is registered for that name.
    pub async fn invoke_named(
        &self,
        event: HookEventKind,
        transaction: &mut Transaction,
    ) -> DispatchResult {
        let hooks = self.registry.named_hooks(event, &transaction.name);
        self.run(event, hooks, HookData::Transaction(transaction))
            .await
    }

    async fn run(
        &self,
        event: HookEventKind,
        hooks: Vec<Arc<dyn Hook>>,
        mut data: HookData<'_>,
    ) -> DispatchResult {
        let mut result = DispatchResult::default();

        if hooks.is_empty() {
            return result;
        }

        debug!(
            event = %event,
            target = %data.describe(),
            hook_count = hooks.len(),
            "Running hooks"
        );

        for (index, hook) in hooks.iter().enumerate() {
            if let Some(err) = self.fault.get() {
                result.aborted = Some(err);
                break;
            }

            match hook.call(event, data.reborrow()).await {
                Ok(()) => result.completed += 1,
                Err(HookError::Aborted(err)) => {
                    debug!(event = %event, index, error = %err, "Hook dispatch aborted");
                    result.aborted = Some(err);
                    break;
                }
                Err(error) => {
                    warn!(
                        event = %event,
                        index,
                        source = %hook.source(),
                        error = %error,
                        "Hook errored"
                    );
                    let reason = match &error {
                        HookError::Assertion(_) => error.to_string(),
                        other => format!("Hook '{event}' errored: {other}"),
                    };
                    for transaction in data.transactions_mut() {
                        transaction.mark_failed(reason.clone());
                    }
                    result.failures.push(HookFailure {
                        event,
                        index,
                        source: hook.source().to_string(),
                        error,
                    });
                }
            }
        }

        result
    }

    /// Returns a reference to the hook registry.
    pub fn registry(&self) -> &Arc<HookRegistry> {
        &self.registry
    }

    /// Returns the fault slot this dispatcher honours.
    pub fn fault(&self) -> &FaultSlot {
        &self.fault
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::func::FnHook;
    use hookwire_core::TestStatus;
    use std::sync::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, label: &'static str) -> Arc<dyn Hook> {
        let log = Arc::clone(log);
        FnHook::each(move |_| {
            log.lock().unwrap().push(label.to_string());
            Ok(())
        })
    }

    #[tokio::test]
    async fn hooks_run_in_registration_order() {
        let registry = Arc::new(HookRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.before_each(recorder(&log, "first"));
        registry.before_each(recorder(&log, "second"));
        registry.before_each(recorder(&log, "third"));

        let dispatcher = HookDispatcher::new(registry, FaultSlot::new());
        let mut t = Transaction::new("a");
        let result = dispatcher
            .invoke_global(HookEventKind::BeforeEach, HookData::Transaction(&mut t))
            .await;

        assert_eq!(result.completed, 3);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn named_hooks_only_match_their_transaction() {
        let registry = Arc::new(HookRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.before("GET /x", recorder(&log, "x"));

        let dispatcher = HookDispatcher::new(registry, FaultSlot::new());
        let mut other = Transaction::new("GET /y");
        let result = dispatcher
            .invoke_named(HookEventKind::Before, &mut other)
            .await;

        assert_eq!(result.completed, 0);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(other, Transaction::new("GET /y"));
    }

    #[tokio::test]
    async fn failing_hook_does_not_stop_the_rest() {
        let registry = Arc::new(HookRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.after_each(FnHook::each(|_| Err(HookError::assertion("expected 200"))));
        registry.after_each(recorder(&log, "after failure"));

        let dispatcher = HookDispatcher::new(registry, FaultSlot::new());
        let mut t = Transaction::new("a");
        let result = dispatcher
            .invoke_global(HookEventKind::AfterEach, HookData::Transaction(&mut t))
            .await;

        assert_eq!(result.completed, 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["after failure"]);
        assert_eq!(t.status(), TestStatus::Fail);
        assert_eq!(
            t.test.as_ref().map(|r| r.message.as_str()),
            Some("Failed assertion in hooks: expected 200")
        );
    }

    #[tokio::test]
    async fn aborted_hook_stops_dispatch() {
        let registry = Arc::new(HookRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.before_each(FnHook::each(|_| {
            Err(HookError::Aborted(AppError::handler_crashed("gone")))
        }));
        registry.before_each(recorder(&log, "never"));

        let dispatcher = HookDispatcher::new(registry, FaultSlot::new());
        let mut t = Transaction::new("a");
        let result = dispatcher
            .invoke_global(HookEventKind::BeforeEach, HookData::Transaction(&mut t))
            .await;

        assert!(result.is_aborted());
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(t.status(), TestStatus::Pending);
    }

    #[tokio::test]
    async fn populated_fault_slot_prevents_any_hook() {
        let registry = Arc::new(HookRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.before_all(recorder(&log, "never"));

        let fault = FaultSlot::new();
        fault.set(AppError::handler_crashed("crashed earlier"));
        let dispatcher = HookDispatcher::new(registry, fault);

        let mut ts = vec![Transaction::new("a")];
        let result = dispatcher
            .invoke_global(HookEventKind::BeforeAll, HookData::Transactions(&mut ts))
            .await;

        assert_eq!(
            result.aborted.map(|e| e.message),
            Some("crashed earlier".to_string())
        );
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn hook_registered_during_dispatch_is_visible_later() {
        let registry = Arc::new(HookRegistry::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner_registry = Arc::clone(&registry);
        let inner_log = Arc::clone(&log);
        registry.before_all(FnHook::all(move |_| {
            inner_registry.after_all(recorder(&inner_log, "late"));
            Ok(())
        }));

        let dispatcher = HookDispatcher::new(Arc::clone(&registry), FaultSlot::new());
        let mut ts = vec![Transaction::new("a")];
        dispatcher
            .invoke_global(HookEventKind::BeforeAll, HookData::Transactions(&mut ts))
            .await;
        dispatcher
            .invoke_global(HookEventKind::AfterAll, HookData::Transactions(&mut ts))
            .await;

        assert_eq!(*log.lock().unwrap(), vec!["late"]);
    }
}
