//! Integration tests for the test case lifecycle
//!
//! Covers:
//! - event order seen by listeners
//! - skipping of disabled tests
//! - final actions, forked actions and failure precedence
//! - before/after test hooks

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use quince::error::COMPLETION_TIMEOUT_MESSAGE;
use quince::report::{TestActionListener, TestListener, TestListenerAware};
use quince::{
    action, fork, EngineError, HookFilter, Outcome, SequenceAfterTest, SequenceBeforeTest, TestAction,
    TestCase, TestCaseMetaInfo, TestCaseState, TestCaseStatus, TestContext, Value,
};

/// Records every event it receives, in order
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn push(&self, event: impl Into<String>) {
        self.events.lock().push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl TestListener for Recorder {
    fn on_test_start(&self, _test: &TestCase) {
        self.push("test-start");
    }
    fn on_test_end(&self, _test: &TestCase) {
        self.push("test-end");
    }
    fn on_test_success(&self, _test: &TestCase) {
        self.push("test-success");
    }
    fn on_test_failure(&self, _test: &TestCase, cause: &EngineError) {
        self.push(format!("test-failure: {}", cause));
    }
    fn on_test_skipped(&self, _test: &TestCase) {
        self.push("test-skipped");
    }
    fn on_test_execution_start(&self, _test: &TestCase) {
        self.push("execution-start");
    }
    fn on_test_execution_end(&self, _test: &TestCase) {
        self.push("execution-end");
    }
    fn on_before_test_start(&self, _test: &TestCase) {
        self.push("before-start");
    }
    fn on_before_test_end(&self, _test: &TestCase) {
        self.push("before-end");
    }
    fn on_after_test_start(&self, _test: &TestCase) {
        self.push("after-start");
    }
    fn on_after_test_end(&self, _test: &TestCase) {
        self.push("after-end");
    }
    fn on_final_actions_start(&self, _test: &TestCase) {
        self.push("final-start");
    }
    fn on_final_actions_end(&self, _test: &TestCase) {
        self.push("final-end");
    }
}

impl TestActionListener for Recorder {
    fn on_test_action_start(&self, _test: &TestCase, action: &dyn TestAction) {
        self.push(format!("action-start: {}", action.name()));
    }
    fn on_test_action_finish(&self, _test: &TestCase, action: &dyn TestAction) {
        self.push(format!("action-finish: {}", action.name()));
    }
    fn on_test_action_skipped(&self, _test: &TestCase, action: &dyn TestAction) {
        self.push(format!("action-skipped: {}", action.name()));
    }
}

fn recorded_context() -> (TestContext, Arc<Recorder>) {
    let context = TestContext::new();
    let recorder = Arc::new(Recorder::default());
    context.test_listeners().add(recorder.clone());
    context.test_action_listeners().add(recorder.clone());
    (context, recorder)
}

fn noop(name: &str) -> quince::FnAction {
    action(name, |_: &TestContext| Ok(()))
}

fn failing(name: &str, message: &'static str) -> quince::FnAction {
    action(name, move |_: &TestContext| Err(EngineError::runtime(message)))
}

#[test]
fn test_event_order_for_successful_test() {
    let (context, recorder) = recorded_context();
    let mut test = TestCase::new("ordered")
        .add_action(noop("send"))
        .add_action(noop("skip-me").disabled())
        .add_final_action(noop("cleanup"));

    test.run(&context).unwrap();

    assert_eq!(
        recorder.events(),
        vec![
            "test-start",
            "execution-start",
            "action-start: send",
            "action-finish: send",
            "action-skipped: skip-me",
            "final-start",
            "action-start: cleanup",
            "action-finish: cleanup",
            "final-end",
            "execution-end",
            "test-success",
            "test-end",
        ]
    );
}

#[test]
fn test_event_order_with_hooks() {
    let (context, recorder) = recorded_context();
    context.add_before_test(Arc::new(SequenceBeforeTest::new("setup").add_action(noop("prepare"))));
    context.add_after_test(Arc::new(SequenceAfterTest::new("teardown").add_action(noop("reset"))));

    let mut test = TestCase::new("hooked").add_action(noop("send"));
    test.run(&context).unwrap();

    assert_eq!(
        recorder.events(),
        vec![
            "test-start",
            "before-start",
            "before-end",
            "execution-start",
            "action-start: send",
            "action-finish: send",
            "execution-end",
            "test-success",
            "after-start",
            "after-end",
            "test-end",
        ]
    );
}

#[test]
fn test_disabled_test_is_skipped() {
    let (context, recorder) = recorded_context();
    let mut test = TestCase::new("disabled")
        .with_meta_info(TestCaseMetaInfo::with_status(TestCaseStatus::Disabled))
        .add_action(action("never", |ctx: &TestContext| ctx.set_variable("ran", true)))
        .add_final_action(action("never-final", |ctx: &TestContext| {
            ctx.set_variable("final-ran", true)
        }));

    test.run(&context).unwrap();

    assert_eq!(test.result().map(|r| r.outcome()), Some(Outcome::Skipped));
    assert_eq!(test.state(), TestCaseState::Skipped);
    assert_eq!(recorder.events(), vec!["test-skipped"]);
    assert!(context.find_variable("ran").is_none());
    assert!(context.find_variable("final-ran").is_none());
}

#[test]
fn test_final_actions_run_after_failure() {
    let (context, recorder) = recorded_context();
    let mut test = TestCase::new("broken")
        .add_action(failing("explode", "action failed"))
        .add_action(noop("unreached"))
        .add_final_action(action("cleanup", |ctx: &TestContext| ctx.set_variable("cleaned", true)));

    let err = test.run(&context).unwrap_err();

    assert_eq!(err, EngineError::test_case_failed(EngineError::runtime("action failed")));
    assert_eq!(context.find_variable("cleaned"), Some(Value::Bool(true)));
    assert_eq!(test.executed_actions(), ["explode"]);

    let result = test.result().unwrap();
    assert!(result.is_failed());
    assert_eq!(result.error_message(), Some("action failed"));

    let events = recorder.events();
    assert!(events.contains(&"action-finish: cleanup".to_string()));
    assert!(!events.iter().any(|e| e.ends_with("unreached")));
    assert_eq!(events[events.len() - 2], "test-failure: action failed");
}

#[test]
fn test_every_final_action_runs_and_first_failure_wins() {
    let context = TestContext::new();
    let mut test = TestCase::new("finals")
        .add_final_action(failing("first", "first final failed"))
        .add_final_action(failing("second", "second final failed"))
        .add_final_action(action("third", |ctx: &TestContext| ctx.set_variable("third", true)));

    let err = test.run(&context).unwrap_err();

    assert_eq!(err.root_cause(), &EngineError::runtime("first final failed"));
    assert_eq!(context.find_variable("third"), Some(Value::Bool(true)));
}

#[test]
fn test_context_final_actions_run_for_every_test() {
    let context = TestContext::new();
    context.add_final_action(action("count", |ctx: &TestContext| {
        let count = ctx.find_variable("count").and_then(|v| v.as_number()).unwrap_or(0.0);
        ctx.set_variable("count", count + 1.0)
    }));

    for name in ["one", "two"] {
        TestCase::new(name).run(&context).unwrap();
    }
    assert_eq!(context.find_variable("count"), Some(Value::Float(2.0)));
}

#[test]
fn test_timeout_waiting_for_forked_action() {
    let context = TestContext::new();
    let mut test = TestCase::new("slow")
        .with_timeout(Duration::from_millis(50))
        .add_action(fork(action("sleepy", |_: &TestContext| {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        })))
        .add_final_action(action("cleanup", |ctx: &TestContext| ctx.set_variable("cleaned", true)));

    let err = test.run(&context).unwrap_err();

    assert!(err.is_completion_timeout());
    assert_eq!(err.to_string(), COMPLETION_TIMEOUT_MESSAGE);
    assert_eq!(test.result().and_then(|r| r.error_message()), Some(COMPLETION_TIMEOUT_MESSAGE));
    assert_eq!(context.find_variable("cleaned"), Some(Value::Bool(true)));
}

#[test]
fn test_short_forked_action_completes_in_time() {
    let context = TestContext::new();
    let mut test = TestCase::new("quick")
        .with_timeout(Duration::from_secs(5))
        .add_action(fork(action("quick", |ctx: &TestContext| {
            thread::sleep(Duration::from_millis(10));
            ctx.set_variable("forked", "done")
        })));

    test.run(&context).unwrap();

    assert!(test.result().unwrap().is_success());
    assert_eq!(context.get_variable("forked").unwrap(), "done");
    assert_eq!(context.pending_actions(), 0);
}

#[test]
fn test_forked_failure_fails_the_test() {
    let context = TestContext::new();
    let mut test = TestCase::new("forked-failure")
        .with_timeout(Duration::from_secs(5))
        .add_action(fork(action("failing", |_: &TestContext| {
            thread::sleep(Duration::from_millis(20));
            Err(EngineError::runtime("This failed in forked action"))
        })))
        .add_final_action(action("cleanup", |ctx: &TestContext| ctx.set_variable("cleaned", true)));

    let err = test.run(&context).unwrap_err();

    assert_eq!(err.to_string(), "This failed in forked action");
    assert_eq!(context.find_variable("cleaned"), Some(Value::Bool(true)));
    assert!(test.result().unwrap().is_failed());
    assert!(!context.has_exceptions());
}

#[test]
fn test_final_action_failure_beats_queued_exception() {
    let context = TestContext::new();
    let mut test = TestCase::new("precedence")
        .add_action(action("queue", |ctx: &TestContext| {
            ctx.add_exception(EngineError::runtime("queued failure"));
            Ok(())
        }))
        .add_final_action(failing("cleanup", "final action failed"));

    let err = test.run(&context).unwrap_err();

    assert_eq!(err.root_cause(), &EngineError::runtime("final action failed"));
    assert_eq!(test.result().unwrap().error_message(), Some("final action failed"));
}

#[test]
fn test_final_action_failure_beats_action_failure() {
    let context = TestContext::new();
    let mut test = TestCase::new("double-failure")
        .add_action(failing("explode", "action failed"))
        .add_final_action(failing("cleanup", "final action failed"));

    let err = test.run(&context).unwrap_err();

    assert_eq!(err.root_cause(), &EngineError::runtime("final action failed"));
    assert_eq!(test.result().unwrap().error_message(), Some("final action failed"));
    assert_eq!(test.executed_actions(), ["explode"]);
}

#[test]
fn test_exception_queued_by_final_action_beats_timeout() {
    let context = TestContext::new();
    let mut test = TestCase::new("late")
        .with_timeout(Duration::from_millis(30))
        .add_action(fork(action("sleepy", |_: &TestContext| {
            thread::sleep(Duration::from_millis(300));
            Ok(())
        })))
        .add_final_action(action("report", |ctx: &TestContext| {
            ctx.add_exception(EngineError::runtime("late async"));
            Ok(())
        }));

    let err = test.run(&context).unwrap_err();

    assert_eq!(err.root_cause(), &EngineError::runtime("late async"));
    assert!(!err.is_completion_timeout());
    assert_eq!(test.result().unwrap().error_message(), Some("late async"));
}

#[test]
fn test_unlimited_timeout_waits_for_forked_action() {
    let context = TestContext::new();
    let mut test = TestCase::new("forever")
        .with_timeout(Duration::MAX)
        .add_action(fork(action("quick", |ctx: &TestContext| {
            thread::sleep(Duration::from_millis(10));
            ctx.set_variable("forked", "done")
        })));

    test.run(&context).unwrap();

    assert!(test.result().unwrap().is_success());
    assert_eq!(test.state(), TestCaseState::Terminated);
    assert_eq!(context.get_variable("forked").unwrap(), "done");
}

#[test]
fn test_queued_exception_aborts_next_action() {
    let context = TestContext::new();
    let mut test = TestCase::new("abort")
        .add_action(action("queue", |ctx: &TestContext| {
            ctx.add_exception(EngineError::runtime("queued failure"));
            Ok(())
        }))
        .add_action(action("unreached", |ctx: &TestContext| ctx.set_variable("reached", true)));

    let err = test.run(&context).unwrap_err();

    assert_eq!(err.root_cause(), &EngineError::runtime("queued failure"));
    assert!(context.find_variable("reached").is_none());
    assert_eq!(test.executed_actions(), ["queue"]);
}

#[test]
fn test_before_test_failure_is_wrapped() {
    let (context, recorder) = recorded_context();
    context.add_before_test(Arc::new(
        SequenceBeforeTest::new("setup").add_action(failing("prepare", "database down")),
    ));

    let mut test = TestCase::new("guarded").add_action(action("never", |ctx: &TestContext| {
        ctx.set_variable("ran", true)
    }));
    let err = test.run(&context).unwrap_err();

    match err.root_cause() {
        EngineError::BeforeTest(cause) => assert_eq!(**cause, EngineError::runtime("database down")),
        other => panic!("Expected BeforeTest, got {:?}", other),
    }
    assert!(context.find_variable("ran").is_none());
    assert!(test.result().unwrap().is_failed());
    assert!(!recorder.events().contains(&"execution-start".to_string()));
}

#[test]
fn test_before_test_respects_filter() {
    let context = TestContext::new();
    let filter = HookFilter::default().with_groups(["smoke"]);
    context.add_before_test(Arc::new(
        SequenceBeforeTest::new("smoke-only")
            .with_filter(filter)
            .add_action(failing("prepare", "should not run")),
    ));

    let mut test = TestCase::new("unit").with_groups(["unit"]);
    test.run(&context).unwrap();
    assert!(test.result().unwrap().is_success());
}

#[test]
fn test_after_test_failure_is_not_propagated() {
    let context = TestContext::new();
    context.add_after_test(Arc::new(
        SequenceAfterTest::new("teardown").add_action(failing("reset", "teardown failed")),
    ));

    let mut test = TestCase::new("survives").add_action(noop("send"));
    test.run(&context).unwrap();
    assert!(test.result().unwrap().is_success());
}

#[test]
fn test_handle_error_reports_placeholder_test() {
    let (context, recorder) = recorded_context();

    let err = context.handle_error("setup", "shop", "Failed to load test", EngineError::runtime("no such file"));

    assert_eq!(err.root_cause(), &EngineError::runtime("no such file"));
    assert_eq!(
        recorder.events(),
        vec![
            "test-start",
            "test-failure: Failed to load test: no such file",
            "test-end",
        ]
    );
}

#[test]
fn test_listener_registered_once() {
    let context = TestContext::new();
    let recorder = Arc::new(Recorder::default());
    context.add_test_listener(recorder.clone());
    context.add_test_listener(recorder.clone());

    TestCase::new("once").run(&context).unwrap();

    assert_eq!(context.test_listeners().len(), 1);
    assert_eq!(
        recorder.events().iter().filter(|e| *e == "test-start").count(),
        1
    );
}

#[test]
fn test_test_name_and_package_variables() {
    let context = TestContext::new();
    let mut test = TestCase::new("named").with_package("shop.orders").add_action(action(
        "check",
        |ctx: &TestContext| {
            assert_eq!(ctx.get_variable("quince.test.name")?, "named");
            assert_eq!(ctx.get_variable("quince.test.package")?, "shop.orders");
            Ok(())
        },
    ));
    test.run(&context).unwrap();
}
