//! Reporting: listener traits and registries, the logging reporter and the
//! console summary.

pub mod listeners;
pub mod logging;
pub mod summary;

pub use listeners::{
    ListenerRegistry, MessageListener, MessageListenerAware, MessageListeners, TestActionListener,
    TestActionListenerAware, TestActionListeners, TestListener, TestListenerAware, TestListeners,
    TestSuiteListener, TestSuiteListenerAware, TestSuiteListeners,
};
pub use logging::LoggingReporter;
