//! Logging reporter and subscriber setup

use parking_lot::Mutex;
use tracing::Level;

use crate::action::TestAction;
use crate::context::TestContext;
use crate::error::EngineError;
use crate::message::Message;
use crate::report::listeners::{MessageListener, TestActionListener, TestListener, TestSuiteListener};
use crate::result::TestResults;
use crate::test_case::TestCase;

/// Install a `fmt` subscriber at INFO level.
///
/// Returns false if a global subscriber is already installed, which makes this safe
/// to call from every test.
pub fn init() -> bool {
    init_with_level(Level::INFO)
}

pub fn init_with_level(level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Logs test progress and collects the results of every finished test
#[derive(Debug, Default)]
pub struct LoggingReporter {
    results: TestResults,
    step: Mutex<usize>,
}

impl LoggingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> &TestResults {
        &self.results
    }

    fn log_summary(&self) {
        let results = &self.results;
        tracing::info!("------------------------------------------------------------------------");
        tracing::info!("TOTAL:\t\t{}", results.size());
        tracing::info!("SUCCESS:\t{} ({}%)", results.success_count(), results.success_percentage());
        tracing::info!("FAILED:\t\t{} ({}%)", results.failed_count(), results.failed_percentage());
        tracing::info!("SKIPPED:\t{} ({}%)", results.skipped_count(), results.skipped_percentage());
        tracing::info!("------------------------------------------------------------------------");
    }
}

impl TestSuiteListener for LoggingReporter {
    fn on_start(&self) {
        tracing::info!("BEFORE TEST SUITE");
    }

    fn on_start_success(&self) {
        tracing::info!("BEFORE TEST SUITE: SUCCESS");
    }

    fn on_start_failure(&self, cause: &EngineError) {
        tracing::error!(error = %cause, "BEFORE TEST SUITE: FAILED");
    }

    fn on_finish(&self) {
        tracing::info!("AFTER TEST SUITE");
    }

    fn on_finish_success(&self) {
        tracing::info!("AFTER TEST SUITE: SUCCESS");
        self.log_summary();
    }

    fn on_finish_failure(&self, cause: &EngineError) {
        tracing::error!(error = %cause, "AFTER TEST SUITE: FAILED");
        self.log_summary();
    }
}

impl TestListener for LoggingReporter {
    fn on_test_start(&self, test: &TestCase) {
        *self.step.lock() = 0;
        tracing::info!("TEST STARTED: {} ({})", test.name(), test.package_name());
    }

    fn on_test_end(&self, test: &TestCase) {
        if let Some(result) = test.result() {
            self.results.add_result(result.clone());
        }
        tracing::info!("TEST FINISHED: {} ({})", test.name(), test.package_name());
    }

    fn on_test_success(&self, test: &TestCase) {
        tracing::info!("TEST SUCCESS: {} ({})", test.name(), test.package_name());
    }

    fn on_test_failure(&self, test: &TestCase, cause: &EngineError) {
        tracing::error!(error = %cause.root_cause(), "TEST FAILED: {} ({})", test.name(), test.package_name());
    }

    fn on_test_skipped(&self, test: &TestCase) {
        if let Some(result) = test.result() {
            self.results.add_result(result.clone());
        }
        tracing::info!("TEST SKIPPED: {} ({})", test.name(), test.package_name());
    }

    fn on_before_test_start(&self, test: &TestCase) {
        tracing::debug!(test = test.name(), "BEFORE TEST");
    }

    fn on_after_test_start(&self, test: &TestCase) {
        tracing::debug!(test = test.name(), "AFTER TEST");
    }

    fn on_final_actions_start(&self, test: &TestCase) {
        tracing::info!("TEST FINAL ACTIONS: {}", test.name());
    }
}

impl TestActionListener for LoggingReporter {
    fn on_test_action_start(&self, test: &TestCase, action: &dyn TestAction) {
        let mut step = self.step.lock();
        *step += 1;
        tracing::info!("TEST STEP {}/{}: {}", *step, test.action_count(), action.name());
    }

    fn on_test_action_finish(&self, test: &TestCase, action: &dyn TestAction) {
        tracing::debug!(test = test.name(), action = action.name(), "TEST STEP SUCCESS");
    }

    fn on_test_action_skipped(&self, test: &TestCase, action: &dyn TestAction) {
        let mut step = self.step.lock();
        *step += 1;
        tracing::info!("SKIPPING TEST STEP {}/{}: {}", *step, test.action_count(), action.name());
    }
}

impl MessageListener for LoggingReporter {
    fn on_inbound_message(&self, message: &Message, _context: &TestContext) {
        tracing::debug!("Receive message: {}", message);
    }

    fn on_outbound_message(&self, message: &Message, _context: &TestContext) {
        tracing::debug!("Send message: {}", message);
    }
}
