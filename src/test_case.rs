//! Test case lifecycle
//!
//! A [`TestCase`] is driven through `do_execute` and `finish` (or [`TestCase::run`],
//! which pairs them):
//!
//! ```text
//! Created -> Started -> Running -> Finalizing -> Terminated
//!    \
//!     +---> Skipped (status Disabled)
//! ```
//!
//! Every run commits exactly one [`TestResult`]. When several things go wrong the
//! failure reported is, from strongest to weakest: a failing final action, an
//! exception queued by a forked action and noticed after the final actions, the
//! timeout waiting for forked actions, a failure of the main action loop.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::action::{TestAction, TestActionBuilder};
use crate::context::TestContext;
use crate::error::{EngineError, Result};
use crate::result::TestResult;
use crate::value::Value;

/// Authoring status of a test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestCaseStatus {
    #[default]
    Draft,
    ReadyForReview,
    /// The test is skipped without running anything
    Disabled,
    Final,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestCaseMetaInfo {
    pub author: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
    pub status: TestCaseStatus,
    pub last_updated_by: Option<String>,
    pub last_updated_on: Option<DateTime<Utc>>,
}

impl TestCaseMetaInfo {
    pub fn with_status(status: TestCaseStatus) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestCaseState {
    Created,
    Started,
    Running,
    Finalizing,
    Terminated,
    Skipped,
}

pub struct TestCase {
    name: String,
    package_name: String,
    groups: Vec<String>,
    test_class: Option<String>,
    description: Option<String>,
    actions: Vec<Box<dyn TestActionBuilder>>,
    final_actions: Vec<Box<dyn TestActionBuilder>>,
    variable_definitions: IndexMap<String, Value>,
    parameters: IndexMap<String, Value>,
    meta_info: TestCaseMetaInfo,
    result: Option<TestResult>,
    timeout: Option<Duration>,
    state: TestCaseState,
    active_action: Option<String>,
    executed_actions: Vec<String>,
    started_at: Option<Instant>,
    elapsed: Option<Duration>,
}

impl TestCase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package_name: env!("CARGO_PKG_NAME").to_string(),
            groups: Vec::new(),
            test_class: None,
            description: None,
            actions: Vec::new(),
            final_actions: Vec::new(),
            variable_definitions: IndexMap::new(),
            parameters: IndexMap::new(),
            meta_info: TestCaseMetaInfo::default(),
            result: None,
            timeout: None,
            state: TestCaseState::Created,
            active_action: None,
            executed_actions: Vec::new(),
            started_at: None,
            elapsed: None,
        }
    }

    // ========== Builder ==========

    pub fn with_package(mut self, package_name: impl Into<String>) -> Self {
        self.package_name = package_name.into();
        self
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Identity of the code defining the test, used in results
    pub fn with_test_class(mut self, test_class: impl Into<String>) -> Self {
        self.test_class = Some(test_class.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_meta_info(mut self, meta_info: TestCaseMetaInfo) -> Self {
        self.meta_info = meta_info;
        self
    }

    /// Time to wait for forked actions when finishing, defaults to the settings
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Variable defined when the test starts. String values may reference other
    /// variables and functions.
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variable_definitions.insert(name.into(), value.into());
        self
    }

    pub fn add_action(mut self, action: impl TestActionBuilder + 'static) -> Self {
        self.actions.push(Box::new(action));
        self
    }

    /// Action that runs when the test finishes, whatever the outcome
    pub fn add_final_action(mut self, action: impl TestActionBuilder + 'static) -> Self {
        self.final_actions.push(Box::new(action));
        self
    }

    /// Set externally supplied parameters. `None` values are dropped.
    pub fn set_parameters(&mut self, names: &[&str], values: Vec<Option<Value>>) -> Result<()> {
        if names.len() != values.len() {
            return Err(EngineError::InvalidParameters {
                names: names.len(),
                values: values.len(),
            });
        }

        for (name, value) in names.iter().zip(values) {
            if let Some(value) = value {
                self.parameters.insert(name.to_string(), value);
            }
        }
        Ok(())
    }

    // ========== Accessors ==========

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn test_class(&self) -> &str {
        self.test_class
            .as_deref()
            .unwrap_or_else(|| std::any::type_name::<TestCase>())
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn meta_info(&self) -> &TestCaseMetaInfo {
        &self.meta_info
    }

    pub fn is_disabled(&self) -> bool {
        self.meta_info.status == TestCaseStatus::Disabled
    }

    pub fn variable_definitions(&self) -> &IndexMap<String, Value> {
        &self.variable_definitions
    }

    pub fn parameters(&self) -> &IndexMap<String, Value> {
        &self.parameters
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    pub fn final_action_count(&self) -> usize {
        self.final_actions.len()
    }

    pub fn result(&self) -> Option<&TestResult> {
        self.result.as_ref()
    }

    pub fn set_result(&mut self, result: TestResult) {
        self.result = Some(result);
    }

    pub fn state(&self) -> TestCaseState {
        self.state
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Name of the action currently (or last) running
    pub fn active_action(&self) -> Option<&str> {
        self.active_action.as_deref()
    }

    /// Names of the actions of the main loop that were run or skipped, in order
    pub fn executed_actions(&self) -> &[String] {
        &self.executed_actions
    }

    /// Measured duration, once the test has completed
    pub fn duration(&self) -> Option<Duration> {
        self.elapsed
    }

    // ========== Lifecycle ==========

    /// Run the test: [`do_execute`](Self::do_execute), then always [`finish`](Self::finish).
    ///
    /// Returns the failure that wins by precedence, if any.
    pub fn run(&mut self, context: &TestContext) -> Result<()> {
        let executed = self.do_execute(context);
        let finished = self.finish(context);
        finished.and(executed)
    }

    /// Initialize variables and run the before-test hooks
    pub fn start(&mut self, context: &TestContext) -> Result<()> {
        self.state = TestCaseState::Started;
        self.active_action = None;
        self.executed_actions.clear();
        context.test_listeners().on_test_start(self);

        if let Err(cause) = self.initialize(context) {
            tracing::debug!(test = %self.name, error = %cause, "Test initialization failed");
            self.set_failed(cause.clone());
            self.stop_timer();
            return Err(EngineError::test_case_failed(cause));
        }
        Ok(())
    }

    fn initialize(&mut self, context: &TestContext) -> Result<()> {
        tracing::debug!(test = %self.name, "Initializing test case");
        self.debug_variables("Global", context);

        let settings = context.settings();
        context.set_variable(&settings.test_name_variable, self.name.as_str())?;
        context.set_variable(&settings.test_package_variable, self.package_name.as_str())?;

        for (name, value) in &self.parameters {
            tracing::debug!(parameter = %name, "Initializing test parameter as variable");
            context.set_variable(name, value.clone())?;
        }

        for (name, value) in &self.variable_definitions {
            match value {
                Value::String(text) => {
                    let resolved = context.replace_dynamic_content(text, false)?;
                    context.set_variable(name, resolved)?;
                }
                other => context.set_variable(name, other.clone())?,
            }
        }
        self.debug_variables("Test", context);

        self.before_test(context)
    }

    fn debug_variables(&self, scope: &str, context: &TestContext) {
        if context.has_variables() && tracing::enabled!(tracing::Level::DEBUG) {
            for (name, value) in context.variables() {
                tracing::debug!(scope, variable = %name, value = %value, "Variable");
            }
        }
    }

    fn before_test(&mut self, context: &TestContext) -> Result<()> {
        self.restart_timer();

        let hooks = context.before_tests();
        if hooks.is_empty() {
            return Ok(());
        }

        context.test_listeners().on_before_test_start(self);
        let outcome = hooks
            .iter()
            .filter(|hook| hook.should_execute(&self.name, &self.package_name, &self.groups))
            .try_for_each(|hook| hook.execute(context))
            .map_err(|cause| EngineError::BeforeTest(Box::new(cause)));
        context.test_listeners().on_before_test_end(self);

        outcome
    }

    /// Run the main action loop.
    ///
    /// Disabled tests are marked skipped without running anything. A failure sets a
    /// failed result and is returned wrapped in [`EngineError::TestCaseFailed`].
    pub fn do_execute(&mut self, context: &TestContext) -> Result<()> {
        if self.is_disabled() {
            tracing::debug!(test = %self.name, "Skipping disabled test");
            self.result = Some(TestResult::skipped(&self.name, self.test_class()));
            self.state = TestCaseState::Skipped;
            context.test_listeners().on_test_skipped(self);
            return Ok(());
        }

        self.start(context)?;

        if let Err(cause) = self.execute_test(context) {
            self.set_failed(cause.clone());
            return Err(EngineError::test_case_failed(cause));
        }

        // Leftover exceptions are picked up by finish
        if !context.has_exceptions() {
            self.set_success();
        }
        Ok(())
    }

    fn execute_test(&mut self, context: &TestContext) -> Result<()> {
        self.state = TestCaseState::Running;
        context.test_listeners().on_test_execution_start(self);

        for index in 0..self.actions.len() {
            let action = self.actions[index].build();
            self.execute_action(action, context)?;
        }
        Ok(())
    }

    fn execute_action(&mut self, action: Box<dyn TestAction>, context: &TestContext) -> Result<()> {
        if let Some(queued) = context.pop_exception() {
            tracing::debug!(test = %self.name, error = %queued, "Aborting on queued exception");
            return Err(queued);
        }

        let name = action.name().to_string();
        self.active_action = Some(name.clone());

        let outcome = self.run_action(action.as_ref(), context);
        self.executed_actions.push(name);
        outcome
    }

    fn run_action(&self, action: &dyn TestAction, context: &TestContext) -> Result<()> {
        let listeners = context.test_action_listeners();
        if action.is_disabled(context) {
            tracing::debug!(test = %self.name, action = action.name(), "Skipping disabled action");
            listeners.on_test_action_skipped(self, action);
            return Ok(());
        }

        listeners.on_test_action_start(self, action);
        tracing::debug!(test = %self.name, action = action.name(), "Executing action");
        action.execute(context)?;
        listeners.on_test_action_finish(self, action);
        Ok(())
    }

    /// Complete the test: wait for forked actions, run final actions, report the
    /// outcome and run the after-test hooks. No-op for disabled tests.
    pub fn finish(&mut self, context: &TestContext) -> Result<()> {
        if self.is_disabled() {
            return Ok(());
        }

        self.state = TestCaseState::Finalizing;
        let outcome = self.complete(context);

        context.test_listeners().on_test_execution_end(self);
        self.finish_test(context);
        self.state = TestCaseState::Terminated;

        outcome.map_err(EngineError::test_case_failed)
    }

    fn complete(&mut self, context: &TestContext) -> Result<()> {
        let mut failure = None;

        if self.result.is_none() {
            match context.pop_exception() {
                Some(queued) => {
                    self.set_failed(queued.clone());
                    failure = Some(queued);
                }
                None => self.set_success(),
            }
        }

        if context.is_success(self.result.as_ref()) {
            let timeout = self.timeout.unwrap_or_else(|| context.settings().default_timeout());
            if let Err(timed_out) = context.wait_for_completion(timeout) {
                self.set_failed(timed_out.clone());
                failure = Some(timed_out);
            }
        }

        let final_failure = self.execute_final_actions(context);

        let timed_out_only = failure.as_ref().map_or(false, EngineError::is_completion_timeout);
        let succeeded = self.result.as_ref().map_or(false, TestResult::is_success);
        if succeeded || timed_out_only {
            if let Some(queued) = context.pop_exception() {
                self.set_failed(queued.clone());
                failure = Some(queued);
            }
        }

        if let Some(cause) = final_failure {
            self.set_failed(cause.clone());
            return Err(cause);
        }

        failure.map_or(Ok(()), Err)
    }

    /// Runs every final action, returning the first failure
    fn execute_final_actions(&self, context: &TestContext) -> Option<EngineError> {
        let context_actions = context.final_actions();
        if self.final_actions.is_empty() && context_actions.is_empty() {
            return None;
        }

        context.test_listeners().on_final_actions_start(self);
        tracing::debug!(test = %self.name, "Entering final actions");

        let mut first_failure = None;
        let test_actions = self.final_actions.iter().map(|builder| builder.build());
        let shared_actions = context_actions.iter().map(|builder| builder.build());
        for action in test_actions.chain(shared_actions) {
            if let Err(cause) = self.run_action(action.as_ref(), context) {
                tracing::debug!(test = %self.name, action = action.name(), error = %cause, "Final action failed");
                first_failure.get_or_insert(cause);
            }
        }

        context.test_listeners().on_final_actions_end(self);
        first_failure
    }

    fn finish_test(&mut self, context: &TestContext) {
        let listeners = context.test_listeners();
        match self.result.as_ref() {
            Some(result) if result.is_success() => listeners.on_test_success(self),
            Some(result) => {
                let cause = result
                    .cause()
                    .cloned()
                    .unwrap_or_else(|| EngineError::runtime("Test failed"));
                listeners.on_test_failure(self, &cause);
            }
            None => {}
        }

        self.after_test(context);
        self.complete_duration();
        listeners.on_test_end(self);
    }

    fn after_test(&self, context: &TestContext) {
        let hooks = context.after_tests();
        if hooks.is_empty() {
            return;
        }

        context.test_listeners().on_after_test_start(self);
        for hook in hooks
            .iter()
            .filter(|hook| hook.should_execute(&self.name, &self.package_name, &self.groups))
        {
            if let Err(err) = hook.execute(context) {
                tracing::warn!(test = %self.name, error = %err, "After test failed with errors");
            }
        }
        context.test_listeners().on_after_test_end(self);
    }

    /// Force a failed result, overriding any earlier one
    pub fn fail(&mut self, cause: EngineError) {
        self.set_failed(cause);
        self.complete_duration();
    }

    fn set_success(&mut self) {
        self.result = Some(
            TestResult::success(&self.name, self.test_class()).with_parameters(self.parameters.clone()),
        );
    }

    fn set_failed(&mut self, cause: EngineError) {
        self.result = Some(
            TestResult::failed(&self.name, self.test_class(), cause)
                .with_parameters(self.parameters.clone()),
        );
    }

    fn restart_timer(&mut self) {
        self.started_at = Some(Instant::now());
        self.elapsed = None;
    }

    fn stop_timer(&mut self) {
        if let Some(started) = self.started_at.take() {
            self.elapsed = Some(started.elapsed());
        }
    }

    fn complete_duration(&mut self) {
        self.stop_timer();
        if let (Some(result), Some(elapsed)) = (self.result.as_mut(), self.elapsed) {
            result.set_duration(elapsed);
        }
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("package_name", &self.package_name)
            .field("groups", &self.groups)
            .field("state", &self.state)
            .field("actions", &self.actions.len())
            .field("final_actions", &self.final_actions.len())
            .field("variables", &self.variable_definitions)
            .field("parameters", &self.parameters)
            .field("result", &self.result)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::action;
    use crate::result::Outcome;

    fn noop(name: &str) -> crate::action::FnAction {
        action(name, |_: &TestContext| Ok(()))
    }

    #[test]
    fn test_set_parameters() {
        let mut test = TestCase::new("params");
        test.set_parameters(&["a", "b", "c"], vec![Some(Value::Int(1)), None, Some(Value::string("x"))])
            .unwrap();
        assert_eq!(test.parameters().len(), 2);
        assert_eq!(test.parameters().get("c"), Some(&Value::string("x")));

        assert_eq!(
            test.set_parameters(&["a"], vec![]),
            Err(EngineError::InvalidParameters { names: 1, values: 0 })
        );
    }

    #[test]
    fn test_successful_run() {
        let ctx = TestContext::new();
        let mut test = TestCase::new("ok")
            .with_package("shop")
            .add_action(noop("first"))
            .add_action(noop("second").disabled());

        test.run(&ctx).unwrap();

        let result = test.result().unwrap();
        assert_eq!(result.outcome(), Outcome::Success);
        assert!(result.duration().is_some());
        assert_eq!(test.state(), TestCaseState::Terminated);
        assert_eq!(test.executed_actions(), ["first", "second"]);
        assert_eq!(test.active_action(), Some("second"));
        assert_eq!(ctx.get_variable("quince.test.name").unwrap(), "ok");
        assert_eq!(ctx.get_variable("quince.test.package").unwrap(), "shop");
    }

    #[test]
    fn test_rerun_starts_fresh() {
        let ctx = TestContext::new();
        let mut test = TestCase::new("again").add_action(noop("first"));

        test.run(&ctx).unwrap();
        test.run(&ctx).unwrap();

        assert_eq!(test.executed_actions(), ["first"]);
        assert_eq!(test.active_action(), Some("first"));
        assert!(test.result().unwrap().is_success());
    }

    #[test]
    fn test_disabled_test_is_skipped() {
        let ctx = TestContext::new();
        let mut test = TestCase::new("disabled")
            .with_meta_info(TestCaseMetaInfo::with_status(TestCaseStatus::Disabled))
            .add_action(action("boom", |_: &TestContext| Err(EngineError::runtime("must not run"))));

        test.run(&ctx).unwrap();
        assert_eq!(test.result().map(TestResult::outcome), Some(Outcome::Skipped));
        assert_eq!(test.state(), TestCaseState::Skipped);
        assert!(test.executed_actions().is_empty());
    }

    #[test]
    fn test_action_failure_aborts_loop() {
        let ctx = TestContext::new();
        let mut test = TestCase::new("failing")
            .add_action(action("boom", |_: &TestContext| Err(EngineError::runtime("boom"))))
            .add_action(noop("never"));

        let err = test.run(&ctx).unwrap_err();
        assert_eq!(err.root_cause(), &EngineError::runtime("boom"));
        assert_eq!(test.executed_actions(), ["boom"]);
        assert!(test.result().unwrap().is_failed());
    }

    #[test]
    fn test_variable_definitions_are_resolved() {
        let ctx = TestContext::new();
        let mut test = TestCase::new("vars")
            .with_variable("name", "Quince")
            .with_variable("greeting", "Hello ${name}!")
            .with_variable("count", 3);

        test.run(&ctx).unwrap();
        assert_eq!(ctx.get_variable("greeting").unwrap(), "Hello Quince!");
        assert_eq!(ctx.find_variable("count"), Some(Value::Int(3)));
    }

    #[test]
    fn test_parameters_become_variables() {
        let ctx = TestContext::new();
        let mut test = TestCase::new("params");
        test.set_parameters(&["user"], vec![Some(Value::string("ann"))]).unwrap();

        test.run(&ctx).unwrap();
        assert_eq!(ctx.get_variable("user").unwrap(), "ann");
        assert_eq!(test.result().unwrap().parameters().len(), 1);
    }

    #[test]
    fn test_start_failure_sets_result() {
        let ctx = TestContext::new();
        let mut test = TestCase::new("bad-vars").with_variable("greeting", "Hello ${unknown}");

        let err = test.do_execute(&ctx).unwrap_err();
        assert!(matches!(err.root_cause(), EngineError::NoSuchVariable { .. }));
        assert!(test.result().unwrap().is_failed());
        assert_eq!(test.state(), TestCaseState::Started);
    }

    #[test]
    fn test_fail_overrides_result() {
        let ctx = TestContext::new();
        let mut test = TestCase::new("forced");
        test.run(&ctx).unwrap();
        assert!(test.result().unwrap().is_success());

        test.fail(EngineError::runtime("forced"));
        assert!(test.result().unwrap().is_failed());
        assert_eq!(test.result().unwrap().error_message(), Some("forced"));
    }

    #[test]
    fn test_queued_exception_at_finish() {
        let ctx = TestContext::new();
        let mut test = TestCase::new("queued")
            .add_action(action("queue", |ctx: &TestContext| {
                ctx.add_exception(EngineError::runtime("late"));
                Ok(())
            }));

        test.do_execute(&ctx).unwrap();
        assert!(test.result().is_none());

        let err = test.finish(&ctx).unwrap_err();
        assert_eq!(err.root_cause(), &EngineError::runtime("late"));
        assert!(test.result().unwrap().is_failed());
    }

    #[test]
    fn test_default_test_class() {
        assert_eq!(TestCase::new("t").test_class(), "quince::test_case::TestCase");
        assert_eq!(TestCase::new("t").with_test_class("ShopIT").test_class(), "ShopIT");
    }
}
