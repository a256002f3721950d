//! # hookwire-handler
//!
//! Runs hooks written in other languages. The configured language selects a
//! handler executable, which is started under the process supervisor and
//! reached over TCP. Lifecycle events travel to it as newline-delimited JSON
//! documents `{"event", "uuid", "data"}`; replies echo the `uuid` and carry
//! the possibly modified `data`, which is merged back into the transactions
//! in place.

pub mod client;
pub mod codec;
pub mod connection;
pub mod language;
pub mod message;
pub mod pending;

pub use client::{BRIDGED_EVENTS, HOOK_TIMEOUT_MESSAGE, HookHandlerClient};
pub use codec::HandlerCodec;
pub use language::HandlerLanguage;
pub use message::HandlerMessage;
pub use pending::PendingCalls;
