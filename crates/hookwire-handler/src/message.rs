//! Messages exchanged with the hook handler.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use hookwire_hooks::HookEventKind;

/// One JSON document on the wire, in either direction.
///
/// `data` is a single transaction for each events and the transaction list
/// for batch events. Replies echo the request's `uuid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerMessage {
    /// Event name, e.g. `beforeEach`.
    #[serde(default)]
    pub event: String,
    /// Correlation id; replies without one are ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Transaction or transaction list.
    #[serde(default)]
    pub data: Value,
}

impl HandlerMessage {
    /// Builds an outbound hook call.
    pub fn request(event: HookEventKind, uuid: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.as_str().to_string(),
            uuid: Some(uuid.into()),
            data,
        }
    }
}
