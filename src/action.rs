//! Test actions and their builders
//!
//! A test case holds [`TestActionBuilder`]s, not actions. Each execution pass builds
//! every action exactly once, right before it runs, so builders can capture state
//! that should be fresh per run.

use std::fmt;
use std::sync::Arc;

use crate::context::TestContext;
use crate::error::Result;

/// A single step of a test
pub trait TestAction: Send + Sync {
    fn name(&self) -> &str;

    /// Disabled actions are reported as skipped and never executed
    fn is_disabled(&self, _context: &TestContext) -> bool {
        false
    }

    fn execute(&self, context: &TestContext) -> Result<()>;
}

/// Produces a fresh action for each execution pass
pub trait TestActionBuilder: Send + Sync {
    fn build(&self) -> Box<dyn TestAction>;
}

impl<F> TestActionBuilder for F
where
    F: Fn() -> Box<dyn TestAction> + Send + Sync,
{
    fn build(&self) -> Box<dyn TestAction> {
        self()
    }
}

type ActionFn = dyn Fn(&TestContext) -> Result<()> + Send + Sync;
type ConditionFn = dyn Fn(&TestContext) -> bool + Send + Sync;

/// Action backed by a closure
#[derive(Clone)]
pub struct FnAction {
    name: String,
    func: Arc<ActionFn>,
    disabled: Option<Arc<ConditionFn>>,
}

/// Create an action from a closure
pub fn action<F>(name: impl Into<String>, func: F) -> FnAction
where
    F: Fn(&TestContext) -> Result<()> + Send + Sync + 'static,
{
    FnAction {
        name: name.into(),
        func: Arc::new(func),
        disabled: None,
    }
}

impl FnAction {
    /// Always skip this action
    pub fn disabled(self) -> Self {
        self.disabled_when(|_| true)
    }

    /// Skip this action whenever the condition holds for the running context
    pub fn disabled_when<C>(mut self, condition: C) -> Self
    where
        C: Fn(&TestContext) -> bool + Send + Sync + 'static,
    {
        self.disabled = Some(Arc::new(condition));
        self
    }
}

impl TestAction for FnAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_disabled(&self, context: &TestContext) -> bool {
        self.disabled.as_ref().map_or(false, |condition| condition(context))
    }

    fn execute(&self, context: &TestContext) -> Result<()> {
        (self.func)(context)
    }
}

impl TestActionBuilder for FnAction {
    fn build(&self) -> Box<dyn TestAction> {
        Box::new(self.clone())
    }
}

impl fmt::Debug for FnAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction")
            .field("name", &self.name)
            .field("conditional", &self.disabled.is_some())
            .finish()
    }
}

/// Runs the wrapped action on its own thread and returns immediately.
///
/// Failures of the forked action are queued on the context and picked up by the
/// test case at its next checkpoint. The test waits for forked actions when it
/// finishes, bounded by the test timeout.
#[derive(Clone)]
pub struct ForkedAction {
    name: String,
    action: Arc<dyn TestAction>,
}

/// Wrap an action so that it runs asynchronously
pub fn fork<A>(action: A) -> ForkedAction
where
    A: TestAction + 'static,
{
    ForkedAction {
        name: format!("fork:{}", action.name()),
        action: Arc::new(action),
    }
}

impl TestAction for ForkedAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_disabled(&self, context: &TestContext) -> bool {
        self.action.is_disabled(context)
    }

    fn execute(&self, context: &TestContext) -> Result<()> {
        let action = Arc::clone(&self.action);
        context.fork(action.name().to_string(), move |ctx| action.execute(ctx))
    }
}

impl TestActionBuilder for ForkedAction {
    fn build(&self) -> Box<dyn TestAction> {
        Box::new(self.clone())
    }
}

impl fmt::Debug for ForkedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForkedAction").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use std::time::Duration;

    #[test]
    fn test_fn_action() {
        let ctx = TestContext::new();
        let set = action("set", |ctx: &TestContext| ctx.set_variable("done", "yes"));

        assert_eq!(set.name(), "set");
        assert!(!set.is_disabled(&ctx));
        set.execute(&ctx).unwrap();
        assert_eq!(ctx.get_variable("done").unwrap(), "yes");
    }

    #[test]
    fn test_disabled_action() {
        let ctx = TestContext::new();
        assert!(action("noop", |_: &TestContext| Ok(())).disabled().is_disabled(&ctx));

        let conditional = action("noop", |_: &TestContext| Ok(()))
            .disabled_when(|ctx: &TestContext| ctx.find_variable("skip").is_some());
        assert!(!conditional.is_disabled(&ctx));
        ctx.set_variable("skip", true).unwrap();
        assert!(conditional.is_disabled(&ctx));
    }

    #[test]
    fn test_closure_builder() {
        let builder = || -> Box<dyn TestAction> { Box::new(action("built", |_: &TestContext| Ok(()))) };
        assert_eq!(TestActionBuilder::build(&builder).name(), "built");
    }

    #[test]
    fn test_forked_action_queues_failure() {
        let ctx = TestContext::new();
        let forked = fork(action("failing", |_: &TestContext| {
            Err(EngineError::runtime("This failed in forked action"))
        }));

        assert_eq!(forked.name(), "fork:failing");
        forked.execute(&ctx).unwrap();
        ctx.wait_for_completion(Duration::from_secs(5)).unwrap();

        assert!(ctx.has_exceptions());
        assert_eq!(
            ctx.pop_exception(),
            Some(EngineError::runtime("This failed in forked action"))
        );
    }
}
