//! Hook registry: hooks are registered by event (and by transaction name for
//! named events) and kept in registration order.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::definitions::{HookData, HookEventKind};
use crate::error::HookError;

/// Trait for hook implementations.
#[async_trait]
pub trait Hook: Send + Sync + std::fmt::Debug {
    /// Runs the hook. Mutations to `data` are visible to later stages.
    async fn call(&self, event: HookEventKind, data: HookData<'_>) -> Result<(), HookError>;

    /// Returns where this hook comes from, for logs.
    fn source(&self) -> &str {
        "native"
    }
}

/// Registry of hooks for one test run.
///
/// Locks are never held while a hook runs, so a hook may register further
/// hooks; those are seen by every later lookup.
#[derive(Debug, Default)]
pub struct HookRegistry {
    /// Global event → hooks in registration order.
    global: RwLock<HashMap<HookEventKind, Vec<Arc<dyn Hook>>>>,
    /// Named event → transaction name → hooks in registration order.
    named: RwLock<HashMap<HookEventKind, HashMap<String, Vec<Arc<dyn Hook>>>>>,
}

impl HookRegistry {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `hook` to the list for `event` (and `name` for named events).
    ///
    /// Named events require a name; global events must not have one.
    pub fn register(
        &self,
        event: HookEventKind,
        name: Option<&str>,
        hook: Arc<dyn Hook>,
    ) -> Result<(), HookError> {
        let source = hook.source().to_string();

        match (event.is_named(), name) {
            (true, Some(name)) => {
                let mut named = self.named.write().unwrap_or_else(PoisonError::into_inner);
                named
                    .entry(event)
                    .or_default()
                    .entry(name.to_string())
                    .or_default()
                    .push(hook);
                debug!(event = %event, transaction = %name, source = %source, "Hook registered");
                Ok(())
            }
            (false, None) => {
                let mut global = self.global.write().unwrap_or_else(PoisonError::into_inner);
                global.entry(event).or_default().push(hook);
                debug!(event = %event, source = %source, "Hook registered");
                Ok(())
            }
            (true, None) => Err(HookError::InvalidRegistration {
                event,
                reason: "a transaction name is required",
            }),
            (false, Some(_)) => Err(HookError::InvalidRegistration {
                event,
                reason: "the event applies to every transaction and takes no name",
            }),
        }
    }

    /// Registers a `before` hook for one transaction.
    pub fn before(&self, name: &str, hook: Arc<dyn Hook>) {
        self.push_named(HookEventKind::Before, name, hook);
    }

    /// Registers a `beforeValidation` hook for one transaction.
    pub fn before_validation(&self, name: &str, hook: Arc<dyn Hook>) {
        self.push_named(HookEventKind::BeforeValidation, name, hook);
    }

    /// Registers an `after` hook for one transaction.
    pub fn after(&self, name: &str, hook: Arc<dyn Hook>) {
        self.push_named(HookEventKind::After, name, hook);
    }

    /// Registers a `beforeAll` hook.
    pub fn before_all(&self, hook: Arc<dyn Hook>) {
        self.push_global(HookEventKind::BeforeAll, hook);
    }

    /// Registers an `afterAll` hook.
    pub fn after_all(&self, hook: Arc<dyn Hook>) {
        self.push_global(HookEventKind::AfterAll, hook);
    }

    /// Registers a `beforeEach` hook.
    pub fn before_each(&self, hook: Arc<dyn Hook>) {
        self.push_global(HookEventKind::BeforeEach, hook);
    }

    /// Registers a `beforeEachValidation` hook.
    pub fn before_each_validation(&self, hook: Arc<dyn Hook>) {
        self.push_global(HookEventKind::BeforeEachValidation, hook);
    }

    /// Registers an `afterEach` hook.
    pub fn after_each(&self, hook: Arc<dyn Hook>) {
        self.push_global(HookEventKind::AfterEach, hook);
    }

    fn push_named(&self, event: HookEventKind, name: &str, hook: Arc<dyn Hook>) {
        // Infallible: `event` is always a named event here.
        let _ = self.register(event, Some(name), hook);
    }

    fn push_global(&self, event: HookEventKind, hook: Arc<dyn Hook>) {
        // Infallible: `event` is always a global event here.
        let _ = self.register(event, None, hook);
    }

    /// Returns the hooks for a global event, in registration order.
    pub fn global_hooks(&self, event: HookEventKind) -> Vec<Arc<dyn Hook>> {
        let global = self.global.read().unwrap_or_else(PoisonError::into_inner);
        global.get(&event).cloned().unwrap_or_default()
    }

    /// Returns the hooks for a named event and transaction, in registration order.
    pub fn named_hooks(&self, event: HookEventKind, name: &str) -> Vec<Arc<dyn Hook>> {
        let named = self.named.read().unwrap_or_else(PoisonError::into_inner);
        named
            .get(&event)
            .and_then(|by_name| by_name.get(name))
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the number of hooks for an event (and name, for named events).
    pub fn hook_count(&self, event: HookEventKind, name: Option<&str>) -> usize {
        match name {
            Some(name) if event.is_named() => self.named_hooks(event, name).len(),
            None if !event.is_named() => self.global_hooks(event).len(),
            _ => 0,
        }
    }

    /// Returns the transaction names that have hooks for a named event.
    pub fn named_transactions(&self, event: HookEventKind) -> Vec<String> {
        let named = self.named.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = named
            .get(&event)
            .map(|by_name| by_name.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}
