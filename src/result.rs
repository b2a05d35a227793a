//! Test results and the result aggregator

use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::error::EngineError;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    Failure,
    Skipped,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "SUCCESS"),
            Outcome::Failure => write!(f, "FAILURE"),
            Outcome::Skipped => write!(f, "SKIP"),
        }
    }
}

/// Outcome of a single test run
///
/// Two results are equal when outcome, test name, class and parameters match;
/// duration and failure details are not part of a result's identity.
#[derive(Debug, Clone)]
pub struct TestResult {
    outcome: Outcome,
    test_name: String,
    class_name: String,
    parameters: IndexMap<String, Value>,
    cause: Option<EngineError>,
    error_message: Option<String>,
    failure_type: Option<String>,
    duration: Option<Duration>,
}

impl TestResult {
    fn new(outcome: Outcome, test_name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            outcome,
            test_name: test_name.into(),
            class_name: class_name.into(),
            parameters: IndexMap::new(),
            cause: None,
            error_message: None,
            failure_type: None,
            duration: None,
        }
    }

    pub fn success(test_name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self::new(Outcome::Success, test_name, class_name)
    }

    pub fn failed(test_name: impl Into<String>, class_name: impl Into<String>, cause: EngineError) -> Self {
        let mut result = Self::new(Outcome::Failure, test_name, class_name);
        result.error_message = Some(cause.to_string());
        result.cause = Some(cause);
        result
    }

    pub fn skipped(test_name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self::new(Outcome::Skipped, test_name, class_name)
    }

    pub fn with_parameters(mut self, parameters: IndexMap<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_failure_type(mut self, failure_type: impl Into<String>) -> Self {
        self.failure_type = Some(failure_type.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = Some(duration);
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub fn is_failed(&self) -> bool {
        self.outcome == Outcome::Failure
    }

    pub fn is_skipped(&self) -> bool {
        self.outcome == Outcome::Skipped
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn parameters(&self) -> &IndexMap<String, Value> {
        &self.parameters
    }

    pub fn cause(&self) -> Option<&EngineError> {
        self.cause.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn failure_type(&self) -> Option<&str> {
        self.failure_type.as_deref()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
}

impl PartialEq for TestResult {
    fn eq(&self, other: &Self) -> bool {
        self.outcome == other.outcome
            && self.test_name == other.test_name
            && self.class_name == other.class_name
            && self.parameters == other.parameters
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.outcome, self.test_name)?;
        if !self.parameters.is_empty() {
            write!(f, " {}", Value::Map(self.parameters.clone()))?;
        }
        if let Some(message) = &self.error_message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

/// Insertion ordered, de-duplicated collection of test results
#[derive(Debug, Default)]
pub struct TestResults {
    results: Mutex<Vec<TestResult>>,
}

fn percentage(count: usize, total: usize) -> String {
    if total == 0 || count == 0 {
        return "0.0".to_string();
    }
    format!("{:.1}", count as f64 / total as f64 * 100.0)
}

impl TestResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a result. Returns false if an equal result was already recorded.
    pub fn add_result(&self, result: TestResult) -> bool {
        let mut results = self.results.lock();
        if results.contains(&result) {
            return false;
        }
        results.push(result);
        true
    }

    /// Visit a snapshot of all results in insertion order
    pub fn do_with_results(&self, mut visit: impl FnMut(&TestResult)) {
        for result in self.as_vec() {
            visit(&result);
        }
    }

    pub fn as_vec(&self) -> Vec<TestResult> {
        self.results.lock().clone()
    }

    fn count(&self, outcome: Outcome) -> usize {
        self.results.lock().iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn size(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.lock().is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.count(Outcome::Success)
    }

    pub fn failed_count(&self) -> usize {
        self.count(Outcome::Failure)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(Outcome::Skipped)
    }

    pub fn success_percentage(&self) -> String {
        percentage(self.success_count(), self.size())
    }

    pub fn failed_percentage(&self) -> String {
        percentage(self.failed_count(), self.size())
    }

    pub fn skipped_percentage(&self) -> String {
        percentage(self.skipped_count(), self.size())
    }

    /// Sum of all recorded durations, results without a duration count as zero
    pub fn total_duration(&self) -> Duration {
        self.results
            .lock()
            .iter()
            .filter_map(|r| r.duration)
            .sum()
    }
}
