//! Hook handler client: runs the handler process, connects to it, and
//! forwards lifecycle events to it through bridge hooks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use hookwire_core::config::HandlerConfig;
use hookwire_core::{AppError, AppResult, FaultSlot, Transaction};
use hookwire_hooks::{Hook, HookBackend, HookData, HookError, HookEventKind, HookRegistry};
use hookwire_process::{Crash, ManagedProcess, ProcessSupervisor, TerminateOptions};

use crate::connection::{HandlerConnection, connect_with_retry};
use crate::language::HandlerLanguage;
use crate::message::HandlerMessage;
use crate::pending::PendingCalls;

/// Message a bridge hook sets as `fail` when the handler does not answer.
pub const HOOK_TIMEOUT_MESSAGE: &str = "Hook timed out.";

/// Events forwarded to the handler, in registration order.
pub const BRIDGED_EVENTS: [HookEventKind; 5] = [
    HookEventKind::BeforeEach,
    HookEventKind::BeforeEachValidation,
    HookEventKind::AfterEach,
    HookEventKind::BeforeAll,
    HookEventKind::AfterAll,
];

/// How a remote call ended.
#[derive(Debug)]
enum CallOutcome {
    Reply(Value),
    TimedOut,
    Aborted(AppError),
}

/// State shared by the client and its bridge hooks.
#[derive(Debug)]
struct HandlerLink {
    config: HandlerConfig,
    process: ManagedProcess,
    connection: HandlerConnection,
    pending: Arc<PendingCalls>,
    fault: FaultSlot,
    stopped: AtomicBool,
}

/// Client for an out-of-process hook handler.
///
/// Created with [`HookHandlerClient::start`], which leaves bridge hooks in
/// the registry. The last `afterAll` hook it registers stops the handler;
/// [`HookBackend::shutdown`] does the same when a run ends early.
#[derive(Debug, Clone)]
pub struct HookHandlerClient {
    link: Arc<HandlerLink>,
}

impl HookHandlerClient {
    /// Resolves the handler command, spawns it, connects, and registers the
    /// bridge hooks.
    ///
    /// A crash of the handler process at any later point is stored in
    /// `fault`; every bridge hook checks it before sending anything.
    pub async fn start(
        config: &HandlerConfig,
        registry: &HookRegistry,
        fault: FaultSlot,
    ) -> AppResult<Self> {
        Self::start_with(config, registry, fault, ProcessSupervisor::new()).await
    }

    /// Like [`HookHandlerClient::start`], with an explicit supervisor.
    pub async fn start_with(
        config: &HandlerConfig,
        registry: &HookRegistry,
        fault: FaultSlot,
        supervisor: ProcessSupervisor,
    ) -> AppResult<Self> {
        info!(language = %config.language, "Looking up hooks handler implementation");
        let command = HandlerLanguage::parse(&config.language)
            .resolve(&config.hookfiles)
            .await?;
        let command_line = command.command_line();

        info!(language = %config.language, command = %command_line, "Spawning hooks handler process");
        let crash_fault = fault.clone();
        let crash_command = command_line.clone();
        let process = supervisor.spawn(&command, move |crash| {
            let message = crash_message(&crash_command, crash);
            error!(command = %crash_command, "{message}");
            crash_fault.set(AppError::handler_crashed(message));
        })?;

        info!(address = %config.address(), "Connecting to hooks handler");
        let stream = match connect_with_retry(config, &command_line, &fault).await {
            Ok(stream) => stream,
            Err(err) => {
                process.expect_exit();
                if let Err(term_err) = process.terminate(terminate_options(config)).await {
                    warn!(pid = process.pid(), error = %term_err, "Unable to stop hooks handler");
                }
                return Err(err);
            }
        };

        let pending = Arc::new(PendingCalls::new());
        let connection = HandlerConnection::start(stream, Arc::clone(&pending));

        let link = Arc::new(HandlerLink {
            config: config.clone(),
            process,
            connection,
            pending,
            fault,
            stopped: AtomicBool::new(false),
        });

        debug!("Registering hooks");
        for event in BRIDGED_EVENTS {
            let hook: Arc<dyn Hook> = Arc::new(BridgeHook {
                event,
                link: Arc::clone(&link),
            });
            registry.register(event, None, hook)?;
        }
        registry.after_all(Arc::new(ShutdownHook {
            link: Arc::clone(&link),
        }));

        Ok(Self { link })
    }

    /// PID of the handler process.
    pub fn pid(&self) -> u32 {
        self.link.process.pid()
    }

    /// Command line the handler was started with.
    pub fn command_line(&self) -> &str {
        self.link.process.command_line()
    }

    /// Number of calls still waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.link.pending.len()
    }

    /// Closes the connection, then terminates the handler, killing it if it
    /// ignores the graceful request. Later calls do nothing.
    pub async fn stop(&self) -> AppResult<()> {
        self.link.stop().await
    }
}

#[async_trait]
impl HookBackend for HookHandlerClient {
    fn name(&self) -> &str {
        "hooks-handler"
    }

    async fn shutdown(&self) -> AppResult<()> {
        self.stop().await
    }
}

fn terminate_options(config: &HandlerConfig) -> TerminateOptions {
    TerminateOptions {
        timeout: config.term_timeout(),
        retry_delay: config.term_retry(),
        force: true,
    }
}

fn crash_message(command_line: &str, crash: Crash) -> String {
    match crash {
        Crash { killed: true, .. } => {
            format!("Hooks handler process '{command_line}' was killed.")
        }
        Crash {
            exit_status: Some(status),
            ..
        } => format!("Hooks handler process '{command_line}' exited with status: {status}"),
        Crash {
            exit_status: None, ..
        } => format!("Hooks handler process '{command_line}' was terminated by a signal."),
    }
}

impl HandlerLink {
    async fn stop(&self) -> AppResult<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            debug!("Hooks handler already stopped");
            return Ok(());
        }

        self.process.expect_exit();
        self.connection.close().await;
        self.pending.clear();

        info!(pid = self.process.pid(), "Terminating hooks handler process");
        self.process
            .terminate(terminate_options(&self.config))
            .await
            .map_err(AppError::from)
    }

    /// Sends `data` for `event` and waits for the reply or the call timeout.
    async fn call(&self, event: HookEventKind, data: &HookData<'_>) -> Result<CallOutcome, HookError> {
        if let Some(err) = self.fault.get() {
            return Ok(CallOutcome::Aborted(err));
        }

        let payload = data
            .to_json()
            .map_err(|e| HookError::failed(format!("Unable to serialize hook data: {e}")))?;
        let uuid = Uuid::new_v4();
        let deadline = Instant::now() + self.config.call_timeout();
        let mut reply = self
            .pending
            .register(uuid, event, deadline)
            .map_err(HookError::Aborted)?;

        debug!(event = %event, uuid = %uuid, "Sending transaction data to hooks handler");
        let sent = self
            .connection
            .send(HandlerMessage::request(event, uuid.to_string(), payload))
            .await;

        if let Err(err) = &sent {
            debug!(event = %event, uuid = %uuid, error = %err, "Hook call not delivered");
        }

        if sent.is_err() || self.connection.is_closed() {
            self.pending.cancel(&uuid);
            return Ok(self.await_exit_until(deadline).await);
        }

        let outcome = tokio::select! {
            received = &mut reply => match received {
                Ok(value) => CallOutcome::Reply(value),
                // Connection dropped while waiting.
                Err(_) => self.await_exit_until(deadline).await,
            },
            _ = self.process.wait_exit() => match self.fault.get() {
                Some(err) => CallOutcome::Aborted(err),
                // A clean exit may still leave a reply in flight.
                None => match tokio::time::timeout_at(deadline, reply).await {
                    Ok(Ok(value)) => CallOutcome::Reply(value),
                    _ => CallOutcome::TimedOut,
                },
            },
            _ = tokio::time::sleep_until(deadline) => match self.fault.get() {
                Some(err) => CallOutcome::Aborted(err),
                None => CallOutcome::TimedOut,
            },
        };

        self.pending.cancel(&uuid);
        Ok(outcome)
    }

    /// With no connection left, gives the handler until `deadline` to exit so
    /// a crash is reported as such rather than as a timeout.
    async fn await_exit_until(&self, deadline: Instant) -> CallOutcome {
        let _ = tokio::time::timeout_at(deadline, self.process.wait_exit()).await;
        match self.fault.get() {
            Some(err) => CallOutcome::Aborted(err),
            None => CallOutcome::TimedOut,
        }
    }
}

/// Forwards one lifecycle event to the handler.
#[derive(Debug)]
struct BridgeHook {
    event: HookEventKind,
    link: Arc<HandlerLink>,
}

#[async_trait]
impl Hook for BridgeHook {
    async fn call(&self, _event: HookEventKind, mut data: HookData<'_>) -> Result<(), HookError> {
        match self.link.call(self.event, &data).await? {
            CallOutcome::Reply(reply) => apply_reply(&mut data, reply),
            CallOutcome::TimedOut => {
                warn!(
                    event = %self.event,
                    transaction = %data.describe(),
                    timeout_ms = self.link.config.timeout,
                    "Hook handling timed out"
                );
                if !self.event.is_batch() {
                    for transaction in data.transactions_mut() {
                        transaction.fail = Some(HOOK_TIMEOUT_MESSAGE.to_string());
                    }
                }
                Ok(())
            }
            CallOutcome::Aborted(err) => Err(HookError::Aborted(err)),
        }
    }

    fn source(&self) -> &str {
        "hooks-handler"
    }
}

/// Merges a reply into the data that was sent, in place.
///
/// A single transaction takes every key of the reply. A list replaces the
/// element at each index present in the reply; originals past the end of
/// the reply are left as they are. A reply without data changes nothing.
fn apply_reply(data: &mut HookData<'_>, reply: Value) -> Result<(), HookError> {
    if reply.is_null() {
        return Ok(());
    }
    match data {
        HookData::Transaction(transaction) => transaction
            .merge_json(reply)
            .map_err(|e| HookError::failed(format!("Invalid reply from hooks handler: {e}"))),
        HookData::Transactions(transactions) => {
            let Value::Array(items) = reply else {
                return Err(HookError::failed(
                    "Invalid reply from hooks handler: expected a list of transactions",
                ));
            };
            for (index, item) in items.into_iter().enumerate() {
                let transaction: Transaction = serde_json::from_value(item).map_err(|e| {
                    HookError::failed(format!(
                        "Invalid transaction at index {index} in hooks handler reply: {e}"
                    ))
                })?;
                match transactions.get_mut(index) {
                    Some(slot) => *slot = transaction,
                    None => transactions.push(transaction),
                }
            }
            Ok(())
        }
    }
}

/// Final `afterAll` hook: tears the handler down.
#[derive(Debug)]
struct ShutdownHook {
    link: Arc<HandlerLink>,
}

#[async_trait]
impl Hook for ShutdownHook {
    async fn call(&self, _event: HookEventKind, _data: HookData<'_>) -> Result<(), HookError> {
        self.link.stop().await.map_err(HookError::Aborted)
    }

    fn source(&self) -> &str {
        "hooks-handler"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn crash_messages_name_the_command() {
        assert_eq!(
            crash_message(
                "dredd-hooks-ruby hooks.rb",
                Crash {
                    exit_status: Some(3),
                    killed: false
                }
            ),
            "Hooks handler process 'dredd-hooks-ruby hooks.rb' exited with status: 3"
        );
        assert_eq!(
            crash_message(
                "goodman",
                Crash {
                    exit_status: None,
                    killed: true
                }
            ),
            "Hooks handler process 'goodman' was killed."
        );
    }

    #[test]
    fn single_reply_overlays_keys() {
        let mut t = Transaction::new("POST /y");
        t.extra.insert("hooks_modifications".into(), json!([]));
        let mut data = HookData::Transaction(&mut t);

        apply_reply(
            &mut data,
            json!({"name": "POST /y", "hooks_modifications": ["before each"]}),
        )
        .unwrap();

        assert_eq!(t.extra["hooks_modifications"], json!(["before each"]));
        assert_eq!(t.id, "POST /y");
    }

    #[test]
    fn reply_without_data_or_with_null_fields_keeps_the_transaction() {
        let mut t = Transaction::new("POST /y");
        t.skip = true;
        t.mark_failed("Failed in before hook: nope");
        let before = t.clone();

        apply_reply(&mut HookData::Transaction(&mut t), Value::Null).unwrap();
        assert_eq!(t, before);

        apply_reply(
            &mut HookData::Transaction(&mut t),
            json!({"name": "POST /y", "errors": null, "skip": null}),
        )
        .unwrap();
        assert_eq!(t, before);

        let mut ts = vec![Transaction::new("a")];
        apply_reply(&mut HookData::Transactions(&mut ts), Value::Null).unwrap();
        apply_reply(
            &mut HookData::Transactions(&mut ts),
            json!([{"name": "a", "errors": null}]),
        )
        .unwrap();
        assert_eq!(ts, vec![Transaction::new("a")]);
    }

    #[test]
    fn list_reply_replaces_by_index_and_keeps_the_tail() {
        let mut ts = vec![
            Transaction::new("a"),
            Transaction::new("b"),
            Transaction::new("c"),
        ];
        let mut data = HookData::Transactions(&mut ts);

        apply_reply(&mut data, json!([{"name": "a", "skip": true}, {"name": "b2"}])).unwrap();

        assert!(ts[0].skip);
        assert_eq!(ts[1].name, "b2");
        assert_eq!(ts[2], Transaction::new("c"));
    }

    #[test]
    fn non_list_reply_to_batch_fails_the_hook() {
        let mut ts = vec![Transaction::new("a")];
        let mut data = HookData::Transactions(&mut ts);
        let err = apply_reply(&mut data, json!({"name": "a"})).unwrap_err();
        assert!(matches!(err, HookError::Failed(_)));
    }
}
