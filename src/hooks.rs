//! Before and after test hooks
//!
//! Hooks are registered on the [`TestContext`] and run around every test case whose
//! name, package and groups they accept.

use std::fmt;

use regex::Regex;

use crate::action::TestActionBuilder;
use crate::context::TestContext;
use crate::error::{EngineError, Result};

/// Runs before the actions of a test
pub trait BeforeTest: Send + Sync {
    fn should_execute(&self, test_name: &str, package_name: &str, groups: &[String]) -> bool;
    fn execute(&self, context: &TestContext) -> Result<()>;
}

/// Runs after a test has finished, failures are only logged
pub trait AfterTest: Send + Sync {
    fn should_execute(&self, test_name: &str, package_name: &str, groups: &[String]) -> bool;
    fn execute(&self, context: &TestContext) -> Result<()>;
}

/// Name, package, group and environment restrictions shared by hook sequences
#[derive(Debug, Clone, Default)]
pub struct HookFilter {
    name_pattern: Option<Regex>,
    package_pattern: Option<Regex>,
    groups: Vec<String>,
    env: Vec<(String, String)>,
}

/// Compile a `*` wildcard pattern into an anchored regex
fn wildcard(pattern: &str) -> Result<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("^{}$", body))
        .map_err(|e| EngineError::validation(format!("Invalid pattern '{}': {}", pattern, e)))
}

impl HookFilter {
    pub fn with_name_pattern(mut self, pattern: &str) -> Result<Self> {
        self.name_pattern = Some(wildcard(pattern)?);
        Ok(self)
    }

    pub fn with_package_pattern(mut self, pattern: &str) -> Result<Self> {
        self.package_pattern = Some(wildcard(pattern)?);
        Ok(self)
    }

    /// Restrict to tests carrying at least one of these groups
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict to runs where the environment variable is set to the given value.
    /// An empty value only requires the variable to be set.
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((name.into(), value.into()));
        self
    }

    pub fn matches(&self, hook: &str, test_name: &str, package_name: &str, groups: &[String]) -> bool {
        if let Some(pattern) = &self.package_pattern {
            if !pattern.is_match(package_name) {
                tracing::debug!(hook, test_name, package_name, "Skipping hook, package restriction");
                return false;
            }
        }

        if let Some(pattern) = &self.name_pattern {
            if !pattern.is_match(test_name) {
                tracing::debug!(hook, test_name, "Skipping hook, test name restriction");
                return false;
            }
        }

        if !self.groups.is_empty() && !groups.iter().any(|g| self.groups.contains(g)) {
            tracing::debug!(hook, test_name, ?groups, "Skipping hook, test group restriction");
            return false;
        }

        for (name, expected) in &self.env {
            let matched = match std::env::var(name) {
                Ok(actual) => expected.is_empty() || &actual == expected,
                Err(_) => false,
            };
            if !matched {
                tracing::debug!(hook, test_name, env = %name, "Skipping hook, environment restriction");
                return false;
            }
        }

        true
    }
}

/// Runs a list of action builders in order, stopping at the first failure
fn run_sequence(actions: &[Box<dyn TestActionBuilder>], context: &TestContext) -> Result<()> {
    for builder in actions {
        let action = builder.build();
        if action.is_disabled(context) {
            tracing::debug!(action = action.name(), "Skipping disabled hook action");
            continue;
        }
        action.execute(context)?;
    }
    Ok(())
}

macro_rules! sequence_hook {
    ($(#[$doc:meta])* $name:ident, $hook:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Default)]
        pub struct $name {
            name: String,
            filter: HookFilter,
            actions: Vec<Box<dyn TestActionBuilder>>,
        }

        impl $name {
            pub fn new(name: impl Into<String>) -> Self {
                Self {
                    name: name.into(),
                    ..Default::default()
                }
            }

            pub fn with_filter(mut self, filter: HookFilter) -> Self {
                self.filter = filter;
                self
            }

            pub fn add_action(mut self, action: impl TestActionBuilder + 'static) -> Self {
                self.actions.push(Box::new(action));
                self
            }

            pub fn name(&self) -> &str {
                &self.name
            }

            pub fn action_count(&self) -> usize {
                self.actions.len()
            }
        }

        impl $hook for $name {
            fn should_execute(&self, test_name: &str, package_name: &str, groups: &[String]) -> bool {
                self.filter.matches(&self.name, test_name, package_name, groups)
            }

            fn execute(&self, context: &TestContext) -> Result<()> {
                tracing::debug!(hook = %self.name, actions = self.actions.len(), "Running {} sequence", $label);
                run_sequence(&self.actions, context)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("name", &self.name)
                    .field("filter", &self.filter)
                    .field("actions", &self.actions.len())
                    .finish()
            }
        }
    };
}

sequence_hook!(
    /// Action sequence run before matching tests
    SequenceBeforeTest,
    BeforeTest,
    "before test"
);

sequence_hook!(
    /// Action sequence run after matching tests
    SequenceAfterTest,
    AfterTest,
    "after test"
);
