//! Lifecycle event definitions and the data hooks receive.

use serde::{Deserialize, Serialize};

use hookwire_core::Transaction;

/// Enumeration of all hook events in the test lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookEventKind {
    // ── Batch ──
    /// Fired once with every transaction, before the first one runs.
    BeforeAll,
    /// Fired once with every transaction, after the last one ran.
    AfterAll,

    // ── Every transaction ──
    /// Fired for each transaction before its request.
    BeforeEach,
    /// Fired for each transaction before validation.
    BeforeEachValidation,
    /// Fired for each transaction after its request.
    AfterEach,

    // ── Named transaction ──
    /// Fired for one transaction, by name, before its request.
    Before,
    /// Fired for one transaction, by name, before validation.
    BeforeValidation,
    /// Fired for one transaction, by name, after its request.
    After,
}

impl HookEventKind {
    /// Every event, in lifecycle order.
    pub const ALL: [HookEventKind; 8] = [
        Self::BeforeAll,
        Self::BeforeEach,
        Self::Before,
        Self::BeforeEachValidation,
        Self::BeforeValidation,
        Self::After,
        Self::AfterEach,
        Self::AfterAll,
    ];

    /// Returns the wire name of this event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeAll => "beforeAll",
            Self::AfterAll => "afterAll",
            Self::BeforeEach => "beforeEach",
            Self::BeforeEachValidation => "beforeEachValidation",
            Self::AfterEach => "afterEach",
            Self::Before => "before",
            Self::BeforeValidation => "beforeValidation",
            Self::After => "after",
        }
    }

    /// Returns whether hooks for this event are keyed by transaction name.
    pub fn is_named(&self) -> bool {
        matches!(self, Self::Before | Self::BeforeValidation | Self::After)
    }

    /// Returns whether this event receives the whole transaction list.
    pub fn is_batch(&self) -> bool {
        matches!(self, Self::BeforeAll | Self::AfterAll)
    }
}

impl std::fmt::Display for HookEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data passed to a hook: one transaction, or the whole list.
///
/// Hooks receive a mutable borrow, so changes are visible to the caller and
/// to every later stage.
#[derive(Debug)]
pub enum HookData<'a> {
    /// A single transaction (each and named events).
    Transaction(&'a mut Transaction),
    /// Every transaction (batch events).
    Transactions(&'a mut Vec<Transaction>),
}

impl HookData<'_> {
    /// Reborrows the data for a shorter lifetime.
    pub fn reborrow(&mut self) -> HookData<'_> {
        match self {
            HookData::Transaction(t) => HookData::Transaction(&mut **t),
            HookData::Transactions(ts) => HookData::Transactions(&mut **ts),
        }
    }

    /// Returns the transactions as a mutable slice.
    pub fn transactions_mut(&mut self) -> &mut [Transaction] {
        match self {
            HookData::Transaction(t) => std::slice::from_mut(&mut **t),
            HookData::Transactions(ts) => ts.as_mut_slice(),
        }
    }

    /// Short description for logs: the transaction name, or the batch size.
    pub fn describe(&self) -> String {
        match self {
            HookData::Transaction(t) => t.name.clone(),
            HookData::Transactions(ts) => format!("{} transactions", ts.len()),
        }
    }

    /// Serializes the data to JSON.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            HookData::Transaction(t) => serde_json::to_value(&**t),
            HookData::Transactions(ts) => serde_json::to_value(&**ts),
        }
    }
}
