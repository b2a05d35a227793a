//! Runtime context shared by the actions of a test
//!
//! [`TestContext`] is a cheap handle around shared state: the variable store, the
//! queue of exceptions raised by forked actions, listener registries, hooks and the
//! registries used to resolve dynamic content. Clones refer to the same context,
//! which is what forked actions receive.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex, RwLock};

use crate::action::TestActionBuilder;
use crate::error::{EngineError, Result};
use crate::functions::{FunctionLibrary, FunctionRegistry};
use crate::hooks::{AfterTest, BeforeTest};
use crate::message::{Message, MessageDirection};
use crate::report::listeners::{
    MessageListener, MessageListenerAware, MessageListeners, TestActionListener,
    TestActionListenerAware, TestActionListeners, TestListener, TestListenerAware, TestListeners,
    TestSuiteListener, TestSuiteListenerAware, TestSuiteListeners,
};
use crate::result::TestResult;
use crate::settings::Settings;
use crate::test_case::TestCase;
use crate::value::Value;
use crate::variable::extractor::{SegmentVariableExtractor, SegmentVariableExtractorRegistry};
use crate::variable::iterator::get_last_expression_value;
use crate::variable::replace::{
    cut_off_escaping, cut_off_variables_prefix, is_escaped, is_variable_name,
    replace_variables_in_string, VARIABLE_PREFIX, VARIABLE_SUFFIX,
};

struct Inner {
    settings: Settings,
    variables: RwLock<IndexMap<String, Value>>,
    global_variables: RwLock<IndexMap<String, Value>>,
    exceptions: Mutex<VecDeque<EngineError>>,

    test_listeners: Arc<TestListeners>,
    action_listeners: Arc<TestActionListeners>,
    suite_listeners: Arc<TestSuiteListeners>,
    message_listeners: Arc<MessageListeners>,

    before_test: RwLock<Vec<Arc<dyn BeforeTest>>>,
    after_test: RwLock<Vec<Arc<dyn AfterTest>>>,
    final_actions: RwLock<Vec<Arc<dyn TestActionBuilder>>>,

    // Swapped on registration so resolution never holds the lock
    extractors: RwLock<Arc<SegmentVariableExtractorRegistry>>,
    functions: RwLock<Arc<FunctionRegistry>>,

    pending: Mutex<usize>,
    completed: Condvar,
}

/// Shared test runtime context
#[derive(Clone)]
pub struct TestContext {
    inner: Arc<Inner>,
}

/// Builds a [`TestContext`], optionally sharing listener registries with other contexts
#[derive(Default)]
pub struct TestContextBuilder {
    settings: Settings,
    test_listeners: Arc<TestListeners>,
    action_listeners: Arc<TestActionListeners>,
    suite_listeners: Arc<TestSuiteListeners>,
    message_listeners: Arc<MessageListeners>,
}

impl TestContextBuilder {
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn test_listeners(mut self, listeners: Arc<TestListeners>) -> Self {
        self.test_listeners = listeners;
        self
    }

    pub fn test_action_listeners(mut self, listeners: Arc<TestActionListeners>) -> Self {
        self.action_listeners = listeners;
        self
    }

    pub fn test_suite_listeners(mut self, listeners: Arc<TestSuiteListeners>) -> Self {
        self.suite_listeners = listeners;
        self
    }

    pub fn message_listeners(mut self, listeners: Arc<MessageListeners>) -> Self {
        self.message_listeners = listeners;
        self
    }

    pub fn build(self) -> TestContext {
        let globals = self.settings.global_variables.clone();
        let functions = FunctionRegistry::with_core_library(&self.settings.function_prefix);

        TestContext {
            inner: Arc::new(Inner {
                variables: RwLock::new(globals.clone()),
                global_variables: RwLock::new(globals),
                exceptions: Mutex::new(VecDeque::new()),
                test_listeners: self.test_listeners,
                action_listeners: self.action_listeners,
                suite_listeners: self.suite_listeners,
                message_listeners: self.message_listeners,
                before_test: RwLock::new(Vec::new()),
                after_test: RwLock::new(Vec::new()),
                final_actions: RwLock::new(Vec::new()),
                extractors: RwLock::new(Arc::new(SegmentVariableExtractorRegistry::default())),
                functions: RwLock::new(Arc::new(functions)),
                pending: Mutex::new(0),
                completed: Condvar::new(),
                settings: self.settings,
            }),
        }
    }
}

/// Decrements the pending counter when a forked action ends, however it ends
struct PendingGuard {
    context: TestContext,
    name: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            tracing::error!(action = %self.name, "Forked action panicked");
            self.context
                .add_exception(EngineError::ForkedActionPanicked(self.name.clone()));
        }

        let mut pending = self.context.inner.pending.lock();
        *pending = pending.saturating_sub(1);
        self.context.inner.completed.notify_all();
    }
}

impl TestContext {
    /// Context with default settings
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self::builder().settings(settings).build()
    }

    pub fn builder() -> TestContextBuilder {
        TestContextBuilder::default()
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    // ========== Variables ==========

    /// Exact lookup in the variable store, no expression evaluation
    pub fn find_variable(&self, name: &str) -> Option<Value> {
        self.inner.variables.read().get(name).cloned()
    }

    /// Resolve a variable expression and render it as text
    pub fn get_variable(&self, expression: &str) -> Result<String> {
        self.get_variable_object(expression).map(|value| value.to_string())
    }

    /// Resolve a variable expression such as `${order.items[0].sku}`.
    ///
    /// Exact store hits win over expression evaluation, so names containing dots
    /// can be looked up directly. `${//name//}` yields the literal `${name}`.
    pub fn get_variable_object(&self, expression: &str) -> Result<Value> {
        let name = cut_off_variables_prefix(expression);

        if is_escaped(name) {
            return Ok(Value::String(format!(
                "{}{}{}",
                VARIABLE_PREFIX,
                cut_off_escaping(name),
                VARIABLE_SUFFIX
            )));
        }

        if let Some(value) = self.find_variable(name) {
            return Ok(value);
        }

        let extractors = self.segment_extractors();
        get_last_expression_value(name, self, extractors.extractors())?.ok_or_else(|| {
            EngineError::NoSuchVariable {
                name: name.to_string(),
                expression: expression.to_string(),
            }
        })
    }

    pub fn set_variable(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let key = cut_off_variables_prefix(name.trim());
        if key.is_empty() {
            return Err(EngineError::InvalidVariableName(name.to_string()));
        }

        let value = value.into();
        if value.is_null() {
            return Err(EngineError::NullVariableValue(key.to_string()));
        }

        tracing::debug!(variable = %key, value = %value, "Setting variable");
        self.inner.variables.write().insert(key.to_string(), value);
        Ok(())
    }

    /// Set variables pairwise, skipping `None` values
    pub fn add_variables(&self, names: &[&str], values: Vec<Option<Value>>) -> Result<()> {
        if names.len() != values.len() {
            return Err(EngineError::validation(format!(
                "Invalid context variable usage - received '{}' variables with '{}' values",
                names.len(),
                values.len()
            )));
        }

        for (name, value) in names.iter().zip(values) {
            if let Some(value) = value {
                self.set_variable(name, value)?;
            }
        }
        Ok(())
    }

    /// Set all variables of the map, `None` values are stored as empty strings
    pub fn add_variables_map(&self, variables: IndexMap<String, Option<Value>>) -> Result<()> {
        for (name, value) in variables {
            self.set_variable(&name, value.unwrap_or_else(|| Value::string("")))?;
        }
        Ok(())
    }

    pub fn has_variables(&self) -> bool {
        !self.inner.variables.read().is_empty()
    }

    /// Snapshot of the variable store
    pub fn variables(&self) -> IndexMap<String, Value> {
        self.inner.variables.read().clone()
    }

    pub fn global_variables(&self) -> IndexMap<String, Value> {
        self.inner.global_variables.read().clone()
    }

    /// Add a global variable, also visible in the current variable store
    pub fn set_global_variable(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.set_variable(name, value.clone())?;
        self.inner
            .global_variables
            .write()
            .insert(cut_off_variables_prefix(name.trim()).to_string(), value);
        Ok(())
    }

    /// Reset the variable store to the global variables
    pub fn clear(&self) {
        let globals = self.inner.global_variables.read().clone();
        *self.inner.variables.write() = globals;
    }

    // ========== Exceptions ==========

    /// Queue an error raised outside the main action loop
    pub fn add_exception(&self, error: EngineError) {
        tracing::debug!(error = %error, "Queued test exception");
        self.inner.exceptions.lock().push_back(error);
    }

    pub fn has_exceptions(&self) -> bool {
        !self.inner.exceptions.lock().is_empty()
    }

    /// Remove and return the oldest queued error
    pub fn pop_exception(&self) -> Option<EngineError> {
        self.inner.exceptions.lock().pop_front()
    }

    pub fn exceptions(&self) -> Vec<EngineError> {
        self.inner.exceptions.lock().iter().cloned().collect()
    }

    /// A result counts as success only while no exception is queued
    pub fn is_success(&self, result: Option<&TestResult>) -> bool {
        !self.has_exceptions() && result.map_or(false, TestResult::is_success)
    }

    // ========== Dynamic content ==========

    /// Replace `${...}` references, then inline function calls
    pub fn replace_dynamic_content(&self, text: &str, quote: bool) -> Result<String> {
        let replaced = replace_variables_in_string(text, self, quote)?;
        self.function_registry()
            .replace_functions_in_string(&replaced, self, quote)
    }

    /// Resolve a whole-string variable reference or function call, other text is returned as is
    pub fn resolve_dynamic_value(&self, expression: &str) -> Result<String> {
        if is_variable_name(expression) {
            return self.get_variable(expression);
        }

        let functions = self.function_registry();
        if functions.is_function(expression) {
            return functions.resolve_function(expression, self);
        }
        Ok(expression.to_string())
    }

    pub fn resolve_dynamic_values_in_list(&self, values: &[String]) -> Result<Vec<String>> {
        values
            .iter()
            .map(|value| self.replace_dynamic_content(value, false))
            .collect()
    }

    /// Resolve keys and string values, other values are kept verbatim
    pub fn resolve_dynamic_values_in_map(
        &self,
        map: &IndexMap<String, Value>,
    ) -> Result<IndexMap<String, Value>> {
        let mut resolved = IndexMap::with_capacity(map.len());
        for (key, value) in map {
            let key = self.replace_dynamic_content(key, false)?;
            let value = match value {
                Value::String(text) => Value::String(self.replace_dynamic_content(text, false)?),
                other => other.clone(),
            };
            resolved.insert(key, value);
        }
        Ok(resolved)
    }

    // ========== Forked actions ==========

    /// Run `work` on a new named thread, tracked until it completes.
    ///
    /// An error returned by `work`, or a panic, is queued as a test exception.
    pub fn fork<F>(&self, name: impl Into<String>, work: F) -> Result<()>
    where
        F: FnOnce(&TestContext) -> Result<()> + Send + 'static,
    {
        let name = name.into();
        *self.inner.pending.lock() += 1;

        let guard = PendingGuard {
            context: self.clone(),
            name: name.clone(),
        };

        tracing::debug!(action = %name, "Forking action");
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let guard = guard;
                if let Err(err) = work(&guard.context) {
                    tracing::debug!(action = %guard.name, error = %err, "Forked action failed");
                    guard.context.add_exception(err);
                }
            })
            .map(|_| ())
            .map_err(|e| EngineError::runtime(format!("Failed to fork action '{}': {}", name, e)))
    }

    /// Number of forked actions still running
    pub fn pending_actions(&self) -> usize {
        *self.inner.pending.lock()
    }

    /// Block until all forked actions completed or the timeout elapsed.
    ///
    /// A timeout too large to form a deadline waits without limit.
    pub fn wait_for_completion(&self, timeout: Duration) -> Result<()> {
        let mut pending = self.inner.pending.lock();
        let deadline = match Instant::now().checked_add(timeout) {
            Some(deadline) => deadline,
            None => {
                while *pending > 0 {
                    self.inner.completed.wait(&mut pending);
                }
                return Ok(());
            }
        };

        while *pending > 0 {
            if self.inner.completed.wait_until(&mut pending, deadline).timed_out() && *pending > 0 {
                tracing::warn!(pending = *pending, ?timeout, "Forked actions did not complete in time");
                return Err(EngineError::CompletionTimeout);
            }
        }
        Ok(())
    }

    // ========== Hooks and final actions ==========

    pub fn add_before_test(&self, hook: Arc<dyn BeforeTest>) {
        self.inner.before_test.write().push(hook);
    }

    pub fn before_tests(&self) -> Vec<Arc<dyn BeforeTest>> {
        self.inner.before_test.read().clone()
    }

    pub fn add_after_test(&self, hook: Arc<dyn AfterTest>) {
        self.inner.after_test.write().push(hook);
    }

    pub fn after_tests(&self) -> Vec<Arc<dyn AfterTest>> {
        self.inner.after_test.read().clone()
    }

    /// Final action run after every test using this context
    pub fn add_final_action(&self, action: impl TestActionBuilder + 'static) {
        self.inner.final_actions.write().push(Arc::new(action));
    }

    pub fn final_actions(&self) -> Vec<Arc<dyn TestActionBuilder>> {
        self.inner.final_actions.read().clone()
    }

    // ========== Registries ==========

    pub fn test_listeners(&self) -> &TestListeners {
        &self.inner.test_listeners
    }

    pub fn test_action_listeners(&self) -> &TestActionListeners {
        &self.inner.action_listeners
    }

    pub fn test_suite_listeners(&self) -> &TestSuiteListeners {
        &self.inner.suite_listeners
    }

    pub fn message_listeners(&self) -> &MessageListeners {
        &self.inner.message_listeners
    }

    pub fn segment_extractors(&self) -> Arc<SegmentVariableExtractorRegistry> {
        Arc::clone(&*self.inner.extractors.read())
    }

    /// Append an extractor to the chain
    pub fn register_extractor(&self, extractor: Arc<dyn SegmentVariableExtractor>) {
        let mut guard = self.inner.extractors.write();
        let mut registry = (**guard).clone();
        registry.register(extractor);
        *guard = Arc::new(registry);
    }

    pub fn function_registry(&self) -> Arc<FunctionRegistry> {
        Arc::clone(&*self.inner.functions.read())
    }

    pub fn add_function_library(&self, library: FunctionLibrary) {
        let mut guard = self.inner.functions.write();
        let mut registry = (**guard).clone();
        registry.add_library(library);
        *guard = Arc::new(registry);
    }

    // ========== Messages and errors ==========

    pub fn on_inbound_message(&self, message: &Message) {
        self.log_message(message, MessageDirection::Inbound);
    }

    pub fn on_outbound_message(&self, message: &Message) {
        self.log_message(message, MessageDirection::Outbound);
    }

    fn log_message(&self, message: &Message, direction: MessageDirection) {
        let listeners = self.message_listeners();
        if !listeners.is_empty() {
            match direction {
                MessageDirection::Inbound => listeners.on_inbound_message(message, self),
                MessageDirection::Outbound => listeners.on_outbound_message(message, self),
            }
        } else if self.inner.settings.log_messages {
            tracing::debug!("{} message:\n{}", direction.operation(), message);
        }
    }

    /// Report an error that happened outside a running test case.
    ///
    /// Listeners see a start, failure and end event for a placeholder test with the
    /// given name; the returned error wraps the original cause.
    pub fn handle_error(
        &self,
        test_name: &str,
        package_name: &str,
        message: &str,
        cause: EngineError,
    ) -> EngineError {
        let placeholder = TestCase::new(test_name).with_package(package_name);
        let failure = EngineError::runtime(format!("{}: {}", message, cause));

        tracing::error!(test = test_name, package = package_name, "{}", failure);
        let listeners = self.test_listeners();
        listeners.on_test_start(&placeholder);
        listeners.on_test_failure(&placeholder, &failure);
        listeners.on_test_end(&placeholder);

        EngineError::test_case_failed(cause)
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestContext")
            .field("variables", &self.inner.variables.read().len())
            .field("exceptions", &self.inner.exceptions.lock().len())
            .field("pending", &self.pending_actions())
            .field("extractors", &self.segment_extractors().names())
            .finish()
    }
}

impl TestListenerAware for TestContext {
    fn add_test_listener(&self, listener: Arc<dyn TestListener>) {
        self.inner.test_listeners.add(listener);
    }
}

impl TestActionListenerAware for TestContext {
    fn add_test_action_listener(&self, listener: Arc<dyn TestActionListener>) {
        self.inner.action_listeners.add(listener);
    }
}

impl TestSuiteListenerAware for TestContext {
    fn add_test_suite_listener(&self, listener: Arc<dyn TestSuiteListener>) {
        self.inner.suite_listeners.add(listener);
    }
}

impl MessageListenerAware for TestContext {
    fn add_message_listener(&self, listener: Arc<dyn MessageListener>) {
        self.inner.message_listeners.add(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_set_and_get_variable() {
        let ctx = TestContext::new();
        ctx.set_variable("${greeting}", "Hello").unwrap();

        assert_eq!(ctx.get_variable("greeting").unwrap(), "Hello");
        assert_eq!(ctx.get_variable("${greeting}").unwrap(), "Hello");
        assert!(ctx.has_variables());
    }

    #[test]
    fn test_invalid_variable_name_and_value() {
        let ctx = TestContext::new();
        assert_eq!(
            ctx.set_variable("  ", "x"),
            Err(EngineError::InvalidVariableName("  ".to_string()))
        );
        assert_eq!(
            ctx.set_variable("${}", "x"),
            Err(EngineError::InvalidVariableName("${}".to_string()))
        );
        assert_eq!(
            ctx.set_variable("nothing", Value::Null),
            Err(EngineError::NullVariableValue("nothing".to_string()))
        );
    }

    #[test]
    fn test_dotted_names_win_over_expressions() {
        let ctx = TestContext::new();
        ctx.set_variable("quince.test.name", "MyTest").unwrap();
        assert_eq!(ctx.get_variable("${quince.test.name}").unwrap(), "MyTest");
    }

    #[test]
    fn test_escaped_variable_object() {
        let ctx = TestContext::new();
        assert_eq!(
            ctx.get_variable_object("${//literal//}").unwrap(),
            Value::string("${literal}")
        );
    }

    #[test]
    fn test_unknown_variable() {
        let ctx = TestContext::new();
        match ctx.get_variable("${missing}") {
            Err(EngineError::NoSuchVariable { name, .. }) => assert_eq!(name, "missing"),
            other => panic!("Expected NoSuchVariable, got {:?}", other),
        }
    }

    #[test]
    fn test_add_variables() {
        let ctx = TestContext::new();
        ctx.add_variables(&["a", "b"], vec![Some(Value::Int(1)), None]).unwrap();
        assert_eq!(ctx.find_variable("a"), Some(Value::Int(1)));
        assert_eq!(ctx.find_variable("b"), None);
        assert!(ctx.add_variables(&["a"], vec![]).is_err());

        ctx.add_variables_map(IndexMap::from([("c".to_string(), None)])).unwrap();
        assert_eq!(ctx.find_variable("c"), Some(Value::string("")));
    }

    #[test]
    fn test_clear_restores_globals() {
        let mut settings = Settings::default();
        settings
            .global_variables
            .insert("env".to_string(), Value::string("staging"));
        let ctx = TestContext::with_settings(settings);

        ctx.set_variable("local", "x").unwrap();
        ctx.set_global_variable("region", "eu").unwrap();
        ctx.clear();

        assert_eq!(ctx.find_variable("local"), None);
        assert_eq!(ctx.get_variable("env").unwrap(), "staging");
        assert_eq!(ctx.get_variable("region").unwrap(), "eu");
    }

    #[test]
    fn test_replace_dynamic_content() {
        let ctx = TestContext::new();
        ctx.set_variable("name", "quince").unwrap();

        assert_eq!(
            ctx.replace_dynamic_content("Hello quince:upperCase('${name}')!", false).unwrap(),
            "Hello QUINCE!"
        );
        assert_eq!(
            ctx.replace_dynamic_content("quince:concat(${name}, '-', ${name})", false).unwrap(),
            "quince-quince"
        );
        assert_eq!(ctx.replace_dynamic_content("${name}", true).unwrap(), "'quince'");
    }

    #[test]
    fn test_resolve_dynamic_value() {
        let ctx = TestContext::new();
        ctx.set_variable("name", "quince").unwrap();

        assert_eq!(ctx.resolve_dynamic_value("${name}").unwrap(), "quince");
        assert_eq!(ctx.resolve_dynamic_value("quince:upperCase('x')").unwrap(), "X");
        assert_eq!(ctx.resolve_dynamic_value("plain").unwrap(), "plain");
        assert_eq!(
            ctx.resolve_dynamic_value("see quince:upperCase('a')").unwrap(),
            "see quince:upperCase('a')"
        );
    }

    #[test]
    fn test_resolve_dynamic_values_in_collections() {
        let ctx = TestContext::new();
        ctx.set_variable("id", "42").unwrap();

        assert_eq!(
            ctx.resolve_dynamic_values_in_list(&["order-${id}".to_string(), "x".to_string()])
                .unwrap(),
            vec!["order-42", "x"]
        );

        let map = IndexMap::from([
            ("key-${id}".to_string(), Value::string("${id}")),
            ("count".to_string(), Value::Int(3)),
        ]);
        let resolved = ctx.resolve_dynamic_values_in_map(&map).unwrap();
        assert_eq!(resolved.get("key-42"), Some(&Value::string("42")));
        assert_eq!(resolved.get("count"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_exception_queue_is_fifo() {
        let ctx = TestContext::new();
        ctx.add_exception(EngineError::runtime("first"));
        ctx.add_exception(EngineError::runtime("second"));

        assert_eq!(ctx.exceptions().len(), 2);
        assert_eq!(ctx.pop_exception(), Some(EngineError::runtime("first")));
        assert_eq!(ctx.pop_exception(), Some(EngineError::runtime("second")));
        assert!(!ctx.has_exceptions());
    }

    #[test]
    fn test_is_success() {
        let ctx = TestContext::new();
        let success = TestResult::success("t", "c");
        assert!(ctx.is_success(Some(&success)));
        assert!(!ctx.is_success(None));

        ctx.add_exception(EngineError::runtime("queued"));
        assert!(!ctx.is_success(Some(&success)));
    }

    #[test]
    fn test_fork_and_wait() {
        let ctx = TestContext::new();
        ctx.fork("worker", |ctx| {
            std::thread::sleep(Duration::from_millis(20));
            ctx.set_variable("worker", "done")
        })
        .unwrap();

        ctx.wait_for_completion(Duration::from_secs(5)).unwrap();
        assert_eq!(ctx.pending_actions(), 0);
        assert_eq!(ctx.get_variable("worker").unwrap(), "done");
    }

    #[test]
    fn test_wait_times_out() {
        let ctx = TestContext::new();
        ctx.fork("sleeper", |_| {
            std::thread::sleep(Duration::from_millis(500));
            Ok(())
        })
        .unwrap();

        assert_eq!(
            ctx.wait_for_completion(Duration::from_millis(20)),
            Err(EngineError::CompletionTimeout)
        );
        ctx.wait_for_completion(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_wait_without_limit() {
        let ctx = TestContext::new();
        ctx.fork("quick", |ctx| {
            std::thread::sleep(Duration::from_millis(10));
            ctx.set_variable("quick", "done")
        })
        .unwrap();

        ctx.wait_for_completion(Duration::MAX).unwrap();
        assert_eq!(ctx.pending_actions(), 0);
        assert_eq!(ctx.get_variable("quick").unwrap(), "done");
    }

    #[test]
    fn test_forked_panic_is_queued() {
        let ctx = TestContext::new();
        ctx.fork("exploding", |_| panic!("boom")).unwrap();

        ctx.wait_for_completion(Duration::from_secs(5)).unwrap();
        assert_eq!(
            ctx.pop_exception(),
            Some(EngineError::ForkedActionPanicked("exploding".to_string()))
        );
    }

    #[test]
    fn test_register_extractor_appends() {
        struct Upper;
        impl SegmentVariableExtractor for Upper {
            fn name(&self) -> &str {
                "upper"
            }
            fn can_extract(
                &self,
                _context: &TestContext,
                parent: &Value,
                segment: &crate::variable::matcher::SegmentMatch,
            ) -> bool {
                matches!(parent, Value::String(_)) && segment.name == "upper"
            }
            fn extract_value(
                &self,
                _context: &TestContext,
                parent: &Value,
                _segment: &crate::variable::matcher::SegmentMatch,
            ) -> std::result::Result<Value, crate::variable::extractor::SegmentEvaluationError> {
                Ok(Value::string(parent.to_string().to_uppercase()))
            }
        }

        let ctx = TestContext::new();
        ctx.register_extractor(Arc::new(Upper));
        ctx.set_variable("word", "quince").unwrap();

        assert_eq!(
            ctx.segment_extractors().names(),
            vec!["map", "object-field", "json-path", "upper"]
        );
        assert_eq!(ctx.get_variable("word.upper").unwrap(), "QUINCE");
    }
}
