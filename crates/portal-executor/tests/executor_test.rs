// Integration tests for portal-executor
//
// These tests drive a listening executor with raw protocol messages over an
// in-process channel and inspect the responses it sends back.

use portal_common::protocol::{
    Action, CallbackId, ErrorPayload, Message, Payload, ResolvedValue, Source,
};
use portal_common::transport::{channel, ChannelTransport, Inbox, Transport};
use portal_executor::{Executor, ExecutorConfig};
use serde_json::json;
use std::future::Future;
use std::time::Duration;
use tokio::task::LocalSet;

// ============================================================================
// Test Helpers
// ============================================================================

/// A listening executor served on the current LocalSet, plus the initiator
/// end of its channel.
struct Harness {
    executor: Executor,
    to_executor: ChannelTransport,
    replies: Inbox,
}

impl Harness {
    fn start() -> Self {
        let ((to_executor, replies), (executor_side, inbox)) = channel::duplex();
        let executor = Executor::with_config(executor_side, ExecutorConfig::default()).unwrap();
        executor.start();

        let server = executor.clone();
        tokio::task::spawn_local(async move { server.serve(inbox).await });

        Self {
            executor,
            to_executor,
            replies,
        }
    }

    fn send(&self, action: Action, payload: Payload, id: &str) {
        self.to_executor
            .send(Message::request(action, payload, CallbackId::from(id)))
            .unwrap();
    }

    async fn reply(&mut self) -> Message {
        tokio::time::timeout(Duration::from_secs(5), self.replies.recv())
            .await
            .expect("timed out waiting for a reply")
            .expect("executor channel closed")
    }

    async fn add(&mut self, name: &str, source: &str) {
        self.send(Action::AddFunction, Payload::add_function(name, source), name);
        let reply = self.reply().await;
        assert!(reply.success, "adding {} failed: {:?}", name, reply.payload.error);
    }

    async fn call(&mut self, name: &str, params: Vec<ResolvedValue>) -> Message {
        self.send(Action::RunFunction, Payload::run_function(name, params), "call");
        self.reply().await
    }

    async fn script(&mut self, script: &str) -> Message {
        self.send(Action::RunScript, Payload::run_script(script), "script");
        self.reply().await
    }

    /// True if no reply arrives within a short grace period.
    async fn stays_silent(&mut self) -> bool {
        tokio::time::timeout(Duration::from_millis(50), self.replies.recv())
            .await
            .is_err()
    }
}

fn local<F: Future<Output = ()>>(test: F) -> impl Future<Output = ()> {
    async move { LocalSet::new().run_until(test).await }
}

// ============================================================================
// addFunction / runFunction
// ============================================================================

#[tokio::test]
async fn test_add_then_run_function() {
    local(async {
        let mut h = Harness::start();

        h.send(Action::AddFunction, Payload::add_function("sum", "(a, b) => a + b"), "1");
        let reply = h.reply().await;
        assert_eq!(reply.source, Source::Executor);
        assert_eq!(reply.action, Some(Action::AddFunctionComplete));
        assert_eq!(reply.callback_id, CallbackId::from("1"));
        assert!(reply.success);
        assert_eq!(reply.payload.result, Some(ResolvedValue::from("sum")));

        h.send(
            Action::RunFunction,
            Payload::run_function("sum", vec![10.into(), 20.into()]),
            "2",
        );
        let reply = h.reply().await;
        assert_eq!(reply.action, Some(Action::RunFunctionComplete));
        assert_eq!(reply.callback_id, CallbackId::from("2"));
        assert_eq!(reply.payload.result, Some(ResolvedValue::from(30)));
        assert_eq!(h.executor.functions(), vec!["sum"]);
    })
    .await;
}

#[tokio::test]
async fn test_unknown_function_fails_without_invoking() {
    local(async {
        let mut h = Harness::start();
        h.add("sum", "(a, b) => a + b").await;

        let reply = h.call("notfunction", vec![]).await;
        assert!(!reply.success);
        assert_eq!(reply.action, Some(Action::RunFunctionComplete));
        assert_eq!(
            reply.payload.error,
            Some(ErrorPayload::Value("Unknown function 'notfunction'".into()))
        );
        assert_eq!(h.executor.functions(), vec!["sum"]);
    })
    .await;
}

#[tokio::test]
async fn test_non_string_name_is_rejected() {
    local(async {
        let mut h = Harness::start();

        let mut payload = Payload::add_function("ignored", "() => 1");
        payload.name = Some(ResolvedValue::from(42));
        h.send(Action::AddFunction, payload, "1");

        let reply = h.reply().await;
        assert!(!reply.success);
        assert_eq!(reply.action, Some(Action::AddFunctionComplete));
        assert_eq!(
            reply.payload.error,
            Some(ErrorPayload::Value("Function name must be a string".into()))
        );
        assert!(h.executor.functions().is_empty());
    })
    .await;
}

#[tokio::test]
async fn test_parameters_keep_their_types() {
    local(async {
        let mut h = Harness::start();
        h.add("echo", "(...args) => args").await;

        let params = vec![
            ResolvedValue::from("'); alert(1); ('"),
            ResolvedValue::from(1.5),
            ResolvedValue::Undefined,
            ResolvedValue::Null,
            ResolvedValue::Number(f64::NAN),
            ResolvedValue::from_json(json!({"nested": [true, "x"]})),
        ];
        let reply = h.call("echo", params.clone()).await;
        assert_eq!(reply.payload.result, Some(ResolvedValue::Array(params)));
    })
    .await;
}

#[tokio::test]
async fn test_added_functions_share_globals() {
    local(async {
        let mut h = Harness::start();
        h.add("square", "x => x * x").await;
        h.add("sumOfSquares", "(a, b) => square(a) + square(b)").await;

        let reply = h.call("sumOfSquares", vec![3.into(), 4.into()]).await;
        assert_eq!(reply.payload.result, Some(ResolvedValue::from(25)));
    })
    .await;
}

#[tokio::test]
async fn test_function_results_are_deep_resolved() {
    local(async {
        let mut h = Harness::start();
        h.add(
            "returnArray",
            "() => [1, Promise.resolve(2), () => 3, { four: Promise.resolve([4]) }]",
        )
        .await;

        let reply = h.call("returnArray", vec![]).await;
        assert_eq!(
            reply.payload.result.map(|v| v.to_json()),
            Some(json!([1, 2, 3, {"four": [4]}]))
        );
    })
    .await;
}

#[tokio::test]
async fn test_thrown_error_is_reported() {
    local(async {
        let mut h = Harness::start();
        h.add("throwError", "() => { throw new Error('some error'); }").await;

        let reply = h.call("throwError", vec![]).await;
        assert!(!reply.success);
        assert_eq!(
            reply.payload.error,
            Some(ErrorPayload::exception("Error", "some error"))
        );
    })
    .await;
}

// ============================================================================
// runScript
// ============================================================================

#[tokio::test]
async fn test_script_result() {
    local(async {
        let mut h = Harness::start();
        let reply = h.script("console.log('test'); return 4;").await;
        assert!(reply.success);
        assert_eq!(reply.action, Some(Action::RunScriptComplete));
        assert_eq!(reply.payload.result, Some(ResolvedValue::from(4)));
    })
    .await;
}

#[tokio::test]
async fn test_script_throw_reports_name_and_message() {
    local(async {
        let mut h = Harness::start();
        let reply = h.script("throw new Error('boom');").await;
        assert!(!reply.success);
        assert_eq!(reply.action, Some(Action::RunScriptComplete));
        assert_eq!(reply.payload.error, Some(ErrorPayload::exception("Error", "boom")));
    })
    .await;
}

#[tokio::test]
async fn test_script_rejection_with_string() {
    local(async {
        let mut h = Harness::start();
        let reply = h.script("return Promise.reject('because i said so');").await;
        assert!(!reply.success);
        assert_eq!(
            reply.payload.error,
            Some(ErrorPayload::Value("because i said so".into()))
        );
    })
    .await;
}

#[tokio::test]
async fn test_script_can_call_added_functions() {
    local(async {
        let mut h = Harness::start();
        h.add("add", "(a, b) => a + b").await;
        let reply = h.script("return add(2, 3);").await;
        assert_eq!(reply.payload.result, Some(ResolvedValue::from(5)));
    })
    .await;
}

#[tokio::test]
async fn test_unresolvable_result_is_an_execution_error() {
    local(async {
        let mut h = Harness::start();
        let reply = h.script("return Symbol('nope');").await;
        assert!(!reply.success);
        assert_eq!(
            reply.payload.error,
            Some(ErrorPayload::exception(
                "Error",
                "unresolvable value of kind 'symbol'"
            ))
        );
    })
    .await;
}

// ============================================================================
// Validation and lifecycle
// ============================================================================

#[tokio::test]
async fn test_stopped_executor_sends_nothing() {
    local(async {
        let mut h = Harness::start();
        h.executor.stop();

        h.send(Action::RunScript, Payload::run_script("return 1;"), "1");
        assert!(h.stays_silent().await);

        h.executor.start();
        let reply = h.script("return 2;").await;
        assert_eq!(reply.payload.result, Some(ResolvedValue::from(2)));
    })
    .await;
}

#[tokio::test]
async fn test_messages_from_other_sources_are_dropped() {
    local(async {
        let mut h = Harness::start();

        let mut foreign = Message::request(
            Action::RunScript,
            Payload::run_script("return 1;"),
            CallbackId::from("1"),
        );
        foreign.source = Source::Executor;
        h.to_executor.send(foreign).unwrap();

        let mut no_action = Message::request(
            Action::RunScript,
            Payload::run_script("return 1;"),
            CallbackId::from("2"),
        );
        no_action.action = None;
        h.to_executor.send(no_action).unwrap();

        assert!(h.stays_silent().await);
    })
    .await;
}

#[tokio::test]
async fn test_unknown_action_gets_error_response() {
    local(async {
        let mut h = Harness::start();
        h.send(Action::Unrecognized("explode".into()), Payload::default(), "7");

        let reply = h.reply().await;
        assert!(!reply.success);
        assert_eq!(reply.action, Some(Action::Error));
        assert_eq!(reply.callback_id, CallbackId::from("7"));
        assert_eq!(
            reply.payload.error,
            Some(ErrorPayload::Value("unknown action: explode".into()))
        );
    })
    .await;
}

#[tokio::test]
async fn test_concurrent_requests_are_each_answered() {
    local(async {
        let mut h = Harness::start();
        h.add(
            "slow",
            "() => { let p = Promise.resolve(0); for (let i = 0; i < 200; i++) { p = p.then(v => v + 1); } return p; }",
        )
        .await;

        h.send(Action::RunFunction, Payload::run_function("slow", vec![]), "slow");
        h.send(Action::RunScript, Payload::run_script("return 'fast';"), "fast");

        let mut results = Vec::new();
        for _ in 0..2 {
            let reply = h.reply().await;
            results.push((reply.callback_id.to_string(), reply.payload.result));
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            results,
            vec![
                ("fast".to_string(), Some(ResolvedValue::from("fast"))),
                ("slow".to_string(), Some(ResolvedValue::from(200))),
            ]
        );
    })
    .await;
}

#[tokio::test]
async fn test_direct_calls_bypass_listening_gate() {
    local(async {
        let ((transport, _), (_, mut replies)) = channel::duplex();
        let executor = Executor::new(transport).unwrap();

        let result = executor
            .run_script("return 6 * 7;", CallbackId::from("direct"))
            .await
            .unwrap();
        assert_eq!(result, ResolvedValue::from(42));

        let reply = replies.recv().await.unwrap();
        assert_eq!(reply.callback_id, CallbackId::from("direct"));
        assert_eq!(reply.payload.result, Some(ResolvedValue::from(42)));
    })
    .await;
}

#[tokio::test]
async fn test_serve_returns_when_inbox_closes_with_unsettled_request() {
    local(async {
        let ((to_executor, _replies), (executor_side, inbox)) = channel::duplex();
        let executor = Executor::new(executor_side).unwrap();
        executor.start();

        let server = executor.clone();
        let serving = tokio::task::spawn_local(async move { server.serve(inbox).await });

        to_executor
            .send(Message::request(
                Action::RunScript,
                Payload::run_script("return new Promise(() => {});"),
                CallbackId::from("never"),
            ))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(to_executor);

        tokio::time::timeout(Duration::from_secs(3), serving)
            .await
            .expect("serve kept running after its inbox closed")
            .unwrap();
    })
    .await;
}
