//! Listener traits and their registries
//!
//! Registries keep listeners in insertion order and ignore a listener that is already
//! registered (same `Arc`). Events are dispatched synchronously on the calling thread
//! over a snapshot of the registry, so a listener may register further listeners
//! while being notified. A panicking listener unwinds through dispatch and later
//! listeners are not notified.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::action::TestAction;
use crate::context::TestContext;
use crate::error::EngineError;
use crate::message::Message;
use crate::test_case::TestCase;

/// Test suite lifecycle events
pub trait TestSuiteListener: Send + Sync {
    fn on_start(&self) {}
    fn on_start_success(&self) {}
    fn on_start_failure(&self, _cause: &EngineError) {}
    fn on_finish(&self) {}
    fn on_finish_success(&self) {}
    fn on_finish_failure(&self, _cause: &EngineError) {}
}

/// Test case lifecycle events
pub trait TestListener: Send + Sync {
    fn on_test_start(&self, _test: &TestCase) {}
    fn on_test_end(&self, _test: &TestCase) {}
    fn on_test_success(&self, _test: &TestCase) {}
    fn on_test_failure(&self, _test: &TestCase, _cause: &EngineError) {}
    fn on_test_skipped(&self, _test: &TestCase) {}
    fn on_test_execution_start(&self, _test: &TestCase) {}
    fn on_test_execution_end(&self, _test: &TestCase) {}
    fn on_before_test_start(&self, _test: &TestCase) {}
    fn on_before_test_end(&self, _test: &TestCase) {}
    fn on_after_test_start(&self, _test: &TestCase) {}
    fn on_after_test_end(&self, _test: &TestCase) {}
    fn on_final_actions_start(&self, _test: &TestCase) {}
    fn on_final_actions_end(&self, _test: &TestCase) {}
}

/// Per action events
pub trait TestActionListener: Send + Sync {
    fn on_test_action_start(&self, _test: &TestCase, _action: &dyn TestAction) {}
    fn on_test_action_finish(&self, _test: &TestCase, _action: &dyn TestAction) {}
    fn on_test_action_skipped(&self, _test: &TestCase, _action: &dyn TestAction) {}
}

/// Messages sent to or received from systems under test
pub trait MessageListener: Send + Sync {
    fn on_inbound_message(&self, _message: &Message, _context: &TestContext) {}
    fn on_outbound_message(&self, _message: &Message, _context: &TestContext) {}
}

/// Ordered, de-duplicated list of listeners
pub struct ListenerRegistry<L: ?Sized> {
    listeners: RwLock<Vec<Arc<L>>>,
}

impl<L: ?Sized> ListenerRegistry<L> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener. Returns false if this exact listener is already present.
    pub fn add(&self, listener: Arc<L>) -> bool {
        let mut listeners = self.listeners.write();
        if listeners.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Copy of the current listeners in registration order
    pub fn snapshot(&self) -> Vec<Arc<L>> {
        self.listeners.read().clone()
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    fn dispatch(&self, mut notify: impl FnMut(&L)) {
        for listener in self.snapshot() {
            notify(&listener);
        }
    }
}

impl<L: ?Sized> Default for ListenerRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> std::fmt::Debug for ListenerRegistry<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

/// Identity comparison on the data pointer, ignoring vtables
fn same_listener<L: ?Sized>(a: &Arc<L>, b: &Arc<L>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

pub type TestSuiteListeners = ListenerRegistry<dyn TestSuiteListener>;
pub type TestListeners = ListenerRegistry<dyn TestListener>;
pub type TestActionListeners = ListenerRegistry<dyn TestActionListener>;
pub type MessageListeners = ListenerRegistry<dyn MessageListener>;

impl ListenerRegistry<dyn TestSuiteListener> {
    pub fn on_start(&self) {
        self.dispatch(|l| l.on_start());
    }

    pub fn on_start_success(&self) {
        self.dispatch(|l| l.on_start_success());
    }

    pub fn on_start_failure(&self, cause: &EngineError) {
        self.dispatch(|l| l.on_start_failure(cause));
    }

    pub fn on_finish(&self) {
        self.dispatch(|l| l.on_finish());
    }

    pub fn on_finish_success(&self) {
        self.dispatch(|l| l.on_finish_success());
    }

    pub fn on_finish_failure(&self, cause: &EngineError) {
        self.dispatch(|l| l.on_finish_failure(cause));
    }
}

impl ListenerRegistry<dyn TestListener> {
    pub fn on_test_start(&self, test: &TestCase) {
        self.dispatch(|l| l.on_test_start(test));
    }

    pub fn on_test_end(&self, test: &TestCase) {
        self.dispatch(|l| l.on_test_end(test));
    }

    pub fn on_test_success(&self, test: &TestCase) {
        self.dispatch(|l| l.on_test_success(test));
    }

    pub fn on_test_failure(&self, test: &TestCase, cause: &EngineError) {
        self.dispatch(|l| l.on_test_failure(test, cause));
    }

    pub fn on_test_skipped(&self, test: &TestCase) {
        self.dispatch(|l| l.on_test_skipped(test));
    }

    pub fn on_test_execution_start(&self, test: &TestCase) {
        self.dispatch(|l| l.on_test_execution_start(test));
    }

    pub fn on_test_execution_end(&self, test: &TestCase) {
        self.dispatch(|l| l.on_test_execution_end(test));
    }

    pub fn on_before_test_start(&self, test: &TestCase) {
        self.dispatch(|l| l.on_before_test_start(test));
    }

    pub fn on_before_test_end(&self, test: &TestCase) {
        self.dispatch(|l| l.on_before_test_end(test));
    }

    pub fn on_after_test_start(&self, test: &TestCase) {
        self.dispatch(|l| l.on_after_test_start(test));
    }

    pub fn on_after_test_end(&self, test: &TestCase) {
        self.dispatch(|l| l.on_after_test_end(test));
    }

    pub fn on_final_actions_start(&self, test: &TestCase) {
        self.dispatch(|l| l.on_final_actions_start(test));
    }

    pub fn on_final_actions_end(&self, test: &TestCase) {
        self.dispatch(|l| l.on_final_actions_end(test));
    }
}

impl ListenerRegistry<dyn TestActionListener> {
    pub fn on_test_action_start(&self, test: &TestCase, action: &dyn TestAction) {
        self.dispatch(|l| l.on_test_action_start(test, action));
    }

    pub fn on_test_action_finish(&self, test: &TestCase, action: &dyn TestAction) {
        self.dispatch(|l| l.on_test_action_finish(test, action));
    }

    pub fn on_test_action_skipped(&self, test: &TestCase, action: &dyn TestAction) {
        self.dispatch(|l| l.on_test_action_skipped(test, action));
    }
}

impl ListenerRegistry<dyn MessageListener> {
    pub fn on_inbound_message(&self, message: &Message, context: &TestContext) {
        self.dispatch(|l| l.on_inbound_message(message, context));
    }

    pub fn on_outbound_message(&self, message: &Message, context: &TestContext) {
        self.dispatch(|l| l.on_outbound_message(message, context));
    }
}

pub trait TestSuiteListenerAware {
    fn add_test_suite_listener(&self, listener: Arc<dyn TestSuiteListener>);
}

pub trait TestListenerAware {
    fn add_test_listener(&self, listener: Arc<dyn TestListener>);
}

pub trait TestActionListenerAware {
    fn add_test_action_listener(&self, listener: Arc<dyn TestActionListener>);
}

pub trait MessageListenerAware {
    fn add_message_listener(&self, listener: Arc<dyn MessageListener>);
}

impl TestSuiteListenerAware for TestSuiteListeners {
    fn add_test_suite_listener(&self, listener: Arc<dyn TestSuiteListener>) {
        self.add(listener);
    }
}

impl TestListenerAware for TestListeners {
    fn add_test_listener(&self, listener: Arc<dyn TestListener>) {
        self.add(listener);
    }
}

impl TestActionListenerAware for TestActionListeners {
    fn add_test_action_listener(&self, listener: Arc<dyn TestActionListener>) {
        self.add(listener);
    }
}

impl MessageListenerAware for MessageListeners {
    fn add_message_listener(&self, listener: Arc<dyn MessageListener>) {
        self.add(listener);
    }
}
