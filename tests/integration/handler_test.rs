//! Integration tests for runs driven through an out-of-process handler.

#![cfg(unix)]

mod helpers;

use hookwire_core::{ErrorKind, TestStatus};
use hookwire_handler::HOOK_TIMEOUT_MESSAGE;

use helpers::{IDLE_HANDLER, TestRun, events, handler_config, silent_handler, transactions};

#[tokio::test]
async fn test_unanswered_hooks_time_out_without_aborting_the_run() {
    let (port, received) = silent_handler().await;
    let run = TestRun::start(&handler_config(IDLE_HANDLER, port, 50)).await;

    let mut ts = transactions(&["POST /y"]);
    let report = run
        .runner
        .run(&mut ts)
        .await
        .expect("a timeout is not fatal");

    assert_eq!(ts[0].fail.as_deref(), Some(HOOK_TIMEOUT_MESSAGE));
    assert_eq!(ts[0].status(), TestStatus::Fail);
    assert_eq!(report.stats.failures, 1);
    assert!(!run.fault.is_set());
    assert_eq!(
        events(&received),
        vec![
            "beforeAll",
            "beforeEach",
            "beforeEachValidation",
            "afterEach",
            "afterAll"
        ]
    );
    assert_eq!(run.client.pending_calls(), 0);
}

#[tokio::test]
async fn test_handler_crash_aborts_the_run_with_its_message() {
    let (port, received) = silent_handler().await;
    let run = TestRun::start(&handler_config("sh -c 'sleep 0.3; exit 3'", port, 5000)).await;

    let mut ts = transactions(&["GET /1", "GET /2"]);
    let err = run
        .runner
        .run(&mut ts)
        .await
        .expect_err("a crash is fatal");

    assert_eq!(err.kind, ErrorKind::HandlerCrashed);
    assert_eq!(
        err.message,
        "Hooks handler process 'sh -c sleep 0.3; exit 3' exited with status: 3"
    );
    assert_eq!(events(&received), vec!["beforeAll"]);
    assert!(ts.iter().all(|t| t.status() == TestStatus::Pending));
}
