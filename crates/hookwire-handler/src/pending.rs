//! Table of hook calls awaiting a reply.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use hookwire_core::AppError;
use hookwire_hooks::HookEventKind;

#[derive(Debug)]
struct PendingCall {
    event: HookEventKind,
    deadline: Instant,
    reply: oneshot::Sender<Value>,
}

/// Calls sent to the handler and not yet answered, keyed by correlation id.
///
/// An entry leaves the table when its reply arrives, when the caller gives
/// up on it, or when the connection closes. A reply for an id that is no
/// longer present is dropped.
#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: Mutex<HashMap<Uuid, PendingCall>>,
}

impl PendingCalls {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a call and returns the receiver its reply is delivered to.
    pub fn register(
        &self,
        uuid: Uuid,
        event: HookEventKind,
        deadline: Instant,
    ) -> Result<oneshot::Receiver<Value>, AppError> {
        let (tx, rx) = oneshot::channel();
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        match calls.entry(uuid) {
            Entry::Occupied(_) => Err(AppError::internal(format!(
                "Correlation id {uuid} is already in use"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(PendingCall {
                    event,
                    deadline,
                    reply: tx,
                });
                Ok(rx)
            }
        }
    }

    /// Delivers a reply. Returns `false` when no call is waiting for `uuid`.
    pub fn resolve(&self, uuid: &str, data: Value) -> bool {
        let Ok(id) = Uuid::parse_str(uuid) else {
            debug!(uuid, "Reply carries an unknown correlation id, ignoring");
            return false;
        };

        let call = self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        match call {
            Some(call) => {
                debug!(
                    uuid,
                    event = %call.event,
                    remaining_ms = call
                        .deadline
                        .saturating_duration_since(Instant::now())
                        .as_millis() as u64,
                    "Handling hook reply"
                );
                // The caller may have stopped waiting in the meantime.
                call.reply.send(data).is_ok()
            }
            None => {
                debug!(uuid, "No pending call for reply, ignoring");
                false
            }
        }
    }

    /// Forgets a call; a later reply for it is ignored.
    pub fn cancel(&self, uuid: &Uuid) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uuid);
    }

    /// Drops every pending call, waking their callers with a closed channel.
    pub fn clear(&self) {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        if !calls.is_empty() {
            debug!(count = calls.len(), "Dropping pending hook calls");
        }
        calls.clear();
    }

    /// Number of calls awaiting a reply.
    pub fn len(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no call is awaiting a reply.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
