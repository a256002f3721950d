//! Shared test helpers for integration tests.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;

use hookwire_core::config::{HandlerConfig, RunnerConfig};
use hookwire_core::{FaultSlot, Transaction};
use hookwire_handler::HookHandlerClient;
use hookwire_hooks::{HookBackend, HookDispatcher, HookRegistry};
use hookwire_runner::TransactionRunner;

/// Handler process that stays up and does nothing by itself.
pub const IDLE_HANDLER: &str = "sh -c 'sleep 30'";

/// Requests the fake handler has received, in order.
pub type Received = Arc<Mutex<Vec<Value>>>;

/// Listens on a free port, accepts one connection and records every request
/// without ever answering.
pub async fn silent_handler() -> (u16, Received) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake handler");
    let port = listener.local_addr().expect("local addr").port();
    let received: Received = Arc::default();
    let log = Arc::clone(&received);

    tokio::spawn(async move {
        let Ok((socket, _)) = listener.accept().await else {
            return;
        };
        let mut lines = BufReader::new(socket).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Ok(request) = serde_json::from_str::<Value>(&line) {
                log.lock().expect("log lock").push(request);
            }
        }
    });

    (port, received)
}

/// Handler settings with short timings for tests.
pub fn handler_config(language: &str, port: u16, timeout: u64) -> HandlerConfig {
    HandlerConfig {
        language: language.to_string(),
        port,
        timeout,
        connect_timeout: 2000,
        connect_retry: 50,
        after_connect_wait: 0,
        term_timeout: 500,
        term_retry: 50,
        ..HandlerConfig::default()
    }
}

/// Test run context: a started handler and a runner wired to it.
pub struct TestRun {
    /// The started handler client.
    pub client: HookHandlerClient,
    /// Pipeline with the client as its backend.
    pub runner: TransactionRunner,
    /// Fault slot shared by both.
    pub fault: FaultSlot,
}

impl TestRun {
    /// Starts the handler and builds the runner without a request executor.
    pub async fn start(config: &HandlerConfig) -> Self {
        let registry = Arc::new(HookRegistry::new());
        let fault = FaultSlot::new();
        let client = HookHandlerClient::start(config, &registry, fault.clone())
            .await
            .expect("handler starts");
        let runner = TransactionRunner::new(
            HookDispatcher::new(registry, fault.clone()),
            RunnerConfig::default(),
        )
        .with_backend(Arc::new(client.clone()) as Arc<dyn HookBackend>);

        Self {
            client,
            runner,
            fault,
        }
    }
}

/// Names of the events in `received`, in order.
pub fn events(received: &Received) -> Vec<String> {
    received
        .lock()
        .expect("log lock")
        .iter()
        .filter_map(|r| r["event"].as_str().map(str::to_string))
        .collect()
}

/// One transaction per name.
pub fn transactions(names: &[&str]) -> Vec<Transaction> {
    names.iter().map(|name| Transaction::new(*name)).collect()
}
