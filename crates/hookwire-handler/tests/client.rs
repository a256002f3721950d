//! Hook handler client against a fake handler.
//!
//! The handler process is a plain `sh` command; the test itself listens on
//! the handler port and plays the handler's side of the protocol.

#![cfg(unix)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use hookwire_core::config::HandlerConfig;
use hookwire_core::{ErrorKind, FaultSlot, Transaction};
use hookwire_handler::{HOOK_TIMEOUT_MESSAGE, HookHandlerClient};
use hookwire_hooks::{HookData, HookDispatcher, HookEventKind, HookRegistry};

type Received = Arc<Mutex<Vec<Value>>>;

/// A scripted handler reply: how long to wait, then what to send.
struct Reply {
    delay: Duration,
    message: Value,
}

/// Accepts one connection and answers each request with `respond`.
async fn fake_handler<F>(respond: F) -> (u16, Received, JoinHandle<()>)
where
    F: Fn(&Value) -> Option<Reply> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let received: Received = Arc::default();
    let log = Arc::clone(&received);

    let server = tokio::spawn(async move {
        let Ok((socket, _)) = listener.accept().await else {
            return;
        };
        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let request: Value = serde_json::from_str(&line).unwrap();
            log.lock().unwrap().push(request.clone());
            if let Some(reply) = respond(&request) {
                tokio::time::sleep(reply.delay).await;
                let frame = format!("{}\n", reply.message);
                if write.write_all(frame.as_bytes()).await.is_err() {
                    break;
                }
            }
        }
    });

    (port, received, server)
}

/// Echoes the request after applying `edit` to its data.
fn echo_with(edit: impl Fn(&mut Value) + Send + 'static) -> impl Fn(&Value) -> Option<Reply> + Send + 'static {
    move |request| {
        let mut message = request.clone();
        edit(&mut message["data"]);
        Some(Reply {
            delay: Duration::ZERO,
            message,
        })
    }
}

fn config(language: &str, port: u16, timeout: u64) -> HandlerConfig {
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

const IDLE_HANDLER: &str = "sh -c 'sleep 30'";

async fn start(config: &HandlerConfig) -> (HookHandlerClient, HookDispatcher, FaultSlot) {
    let registry = Arc::new(HookRegistry::new());
    let fault = FaultSlot::new();
    let client = HookHandlerClient::start(config, &registry, fault.clone())
        .await
        .expect("handler starts");
    let dispatcher = HookDispatcher::new(registry, fault.clone());
    (client, dispatcher, fault)
}

#[tokio::test]
async fn start_registers_bridge_and_shutdown_hooks() {
    let (port, _received, _server) = fake_handler(|_| None).await;
    let registry = HookRegistry::new();

    let client = HookHandlerClient::start(&config(IDLE_HANDLER, port, 500), &registry, FaultSlot::new())
        .await
        .unwrap();

    assert_eq!(registry.hook_count(HookEventKind::BeforeEach, None), 1);
    assert_eq!(registry.hook_count(HookEventKind::BeforeEachValidation, None), 1);
    assert_eq!(registry.hook_count(HookEventKind::AfterEach, None), 1);
    assert_eq!(registry.hook_count(HookEventKind::BeforeAll, None), 1);
    assert_eq!(registry.hook_count(HookEventKind::AfterAll, None), 2);
    assert!(client.command_line().starts_with("sh -c sleep 30"));

    client.stop().await.unwrap();
}

#[tokio::test]
async fn each_reply_is_merged_into_the_transaction() {
    let (port, received, _server) = fake_handler(echo_with(|data| {
        data["fail"] = json!("failed by handler");
        data["hooks_modifications"] = json!(["beforeEach"]);
    }))
    .await;
    let (client, dispatcher, _fault) = start(&config(IDLE_HANDLER, port, 2000)).await;

    let mut t = Transaction::new("GET /x");
    let result = dispatcher
        .invoke_global(HookEventKind::BeforeEach, HookData::Transaction(&mut t))
        .await;

    assert!(!result.is_aborted());
    assert_eq!(t.fail.as_deref(), Some("failed by handler"));
    assert_eq!(t.extra["hooks_modifications"], json!(["beforeEach"]));

    let sent = received.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["event"], json!("beforeEach"));
    assert_eq!(sent[0]["data"]["name"], json!("GET /x"));
    assert!(sent[0]["uuid"].as_str().is_some_and(|u| !u.is_empty()));

    client.stop().await.unwrap();
}

#[tokio::test]
async fn batch_reply_replaces_transactions_by_index() {
    let (port, _received, _server) = fake_handler(echo_with(|data| {
        for transaction in data.as_array_mut().unwrap() {
            transaction["skip"] = json!(true);
        }
    }))
    .await;
    let (client, dispatcher, _fault) = start(&config(IDLE_HANDLER, port, 2000)).await;

    let mut ts = vec![Transaction::new("a"), Transaction::new("b")];
    dispatcher
        .invoke_global(HookEventKind::BeforeAll, HookData::Transactions(&mut ts))
        .await;

    assert!(ts.iter().all(|t| t.skip));
    assert_eq!(ts[1].name, "b");

    client.stop().await.unwrap();
}

#[tokio::test]
async fn unanswered_each_call_times_out_softly() {
    let (port, _received, _server) = fake_handler(|_| None).await;
    let (client, dispatcher, fault) = start(&config(IDLE_HANDLER, port, 50)).await;

    let mut t = Transaction::new("POST /y");
    let result = dispatcher
        .invoke_global(HookEventKind::BeforeEachValidation, HookData::Transaction(&mut t))
        .await;

    assert!(!result.is_aborted());
    assert!(result.failures.is_empty());
    assert_eq!(t.fail.as_deref(), Some(HOOK_TIMEOUT_MESSAGE));
    assert!(!fault.is_set());
    assert_eq!(client.pending_calls(), 0);

    client.stop().await.unwrap();
}

#[tokio::test]
async fn unanswered_batch_call_leaves_data_alone() {
    let (port, _received, _server) = fake_handler(|_| None).await;
    let (client, dispatcher, _fault) = start(&config(IDLE_HANDLER, port, 50)).await;

    let mut ts = vec![Transaction::new("a")];
    let result = dispatcher
        .invoke_global(HookEventKind::BeforeAll, HookData::Transactions(&mut ts))
        .await;

    assert!(!result.is_aborted());
    assert_eq!(ts, vec![Transaction::new("a")]);

    client.stop().await.unwrap();
}

#[tokio::test]
async fn late_reply_is_ignored() {
    let (port, received, _server) = fake_handler(|request| {
        let mut message = request.clone();
        message["data"]["fail"] = json!("too late");
        Some(Reply {
            delay: Duration::from_millis(150),
            message,
        })
    })
    .await;
    let (client, dispatcher, _fault) = start(&config(IDLE_HANDLER, port, 50)).await;

    let mut t = Transaction::new("POST /y");
    dispatcher
        .invoke_global(HookEventKind::AfterEach, HookData::Transaction(&mut t))
        .await;
    assert_eq!(t.fail.as_deref(), Some(HOOK_TIMEOUT_MESSAGE));

    // Let the late reply arrive, then make sure a fresh call is unaffected.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(client.pending_calls(), 0);
    assert_eq!(received.lock().unwrap().len(), 1);

    client.stop().await.unwrap();
}

#[tokio::test]
async fn crash_during_a_call_aborts_and_blocks_later_calls() {
    let (port, received, _server) = fake_handler(|_| None).await;
    let handler = "sh -c 'sleep 0.3; exit 3'";
    let (client, dispatcher, fault) = start(&config(handler, port, 5000)).await;

    let mut t = Transaction::new("GET /x");
    let result = dispatcher
        .invoke_global(HookEventKind::BeforeEach, HookData::Transaction(&mut t))
        .await;

    let err = result.aborted.expect("crash aborts the call");
    assert_eq!(err.kind, ErrorKind::HandlerCrashed);
    assert_eq!(
        err.message,
        "Hooks handler process 'sh -c sleep 0.3; exit 3' exited with status: 3"
    );
    assert!(fault.is_set());
    assert!(t.fail.is_none());

    let mut next = Transaction::new("GET /z");
    let result = dispatcher
        .invoke_global(HookEventKind::BeforeEach, HookData::Transaction(&mut next))
        .await;
    assert!(result.is_aborted());
    assert_eq!(received.lock().unwrap().len(), 1);

    client.stop().await.unwrap();
}

#[tokio::test]
async fn crash_while_connecting_is_reported_instead_of_a_timeout() {
    // Nothing listens on this port.
    let port = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let registry = HookRegistry::new();

    let err = HookHandlerClient::start(&config("sh -c 'exit 2'", port, 500), &registry, FaultSlot::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::HandlerCrashed);
    assert!(err.message.ends_with("exited with status: 2"));
    assert_eq!(registry.hook_count(HookEventKind::AfterAll, None), 0);
}

#[tokio::test]
async fn connect_timeout_names_the_handler_command() {
    // Nothing listens on this port.
    let port = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let registry = HookRegistry::new();
    let config = HandlerConfig {
        connect_timeout: 300,
        ..config(IDLE_HANDLER, port, 500)
    };

    let err = HookHandlerClient::start(&config, &registry, FaultSlot::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Connection);
    assert_eq!(
        err.message,
        format!(
            "Connection timeout 0.3s to hooks handler 'sh -c sleep 30' on 127.0.0.1:{port} exceeded. Try increasing the limit."
        )
    );
}

#[tokio::test]
async fn reply_without_data_leaves_the_transaction_passing() {
    let (port, _received, _server) = fake_handler(|request: &Value| {
        Some(Reply {
            delay: Duration::ZERO,
            message: json!({"event": request["event"], "uuid": request["uuid"], "data": null}),
        })
    })
    .await;
    let (client, dispatcher, _fault) = start(&config(IDLE_HANDLER, port, 2000)).await;

    let mut t = Transaction::new("GET /null");
    let result = dispatcher
        .invoke_global(HookEventKind::BeforeEach, HookData::Transaction(&mut t))
        .await;

    assert!(result.failures.is_empty());
    assert_eq!(t, Transaction::new("GET /null"));

    client.stop().await.unwrap();
}

#[tokio::test]
async fn missing_handler_command_fails_before_spawning() {
    let registry = HookRegistry::new();
    let err = HookHandlerClient::start(
        &config("hookwire-no-such-handler", 1, 500),
        &registry,
        FaultSlot::new(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind, ErrorKind::HandlerNotFound);
}

#[tokio::test]
async fn final_after_all_hook_stops_the_handler() {
    let (port, received, _server) = fake_handler(echo_with(|_| {})).await;
    let (client, dispatcher, fault) = start(&config(IDLE_HANDLER, port, 2000)).await;

    let mut ts = vec![Transaction::new("a")];
    let result = dispatcher
        .invoke_global(HookEventKind::AfterAll, HookData::Transactions(&mut ts))
        .await;

    assert_eq!(result.completed, 2);
    assert!(!result.is_aborted());
    assert_eq!(received.lock().unwrap()[0]["event"], json!("afterAll"));
    assert!(!fault.is_set());

    // Already stopped by the hook.
    client.stop().await.unwrap();
}
