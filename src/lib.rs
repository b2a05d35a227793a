//! Quince test orchestration runtime
//!
//! A test is a [`TestCase`]: an ordered list of actions plus final actions, run
//! against a shared [`TestContext`] that holds variables, queued exceptions,
//! hooks and listener registries. Strings flowing through the context may embed
//! `${variable.path[0]}` references and inline `quince:function(...)` calls.

pub mod action;
pub mod context;
pub mod error;
pub mod functions;
pub mod hooks;
pub mod message;
pub mod report;
pub mod result;
pub mod settings;
pub mod test_case;
pub mod value;
pub mod variable;

pub use action::{action, fork, FnAction, ForkedAction, TestAction, TestActionBuilder};
pub use context::{TestContext, TestContextBuilder};
pub use error::{EngineError, Result};
pub use functions::{Function, FunctionLibrary, FunctionRegistry};
pub use hooks::{AfterTest, BeforeTest, HookFilter, SequenceAfterTest, SequenceBeforeTest};
pub use message::{Message, MessageDirection};
pub use report::LoggingReporter;
pub use result::{Outcome, TestResult, TestResults};
pub use settings::Settings;
pub use test_case::{TestCase, TestCaseMetaInfo, TestCaseState, TestCaseStatus};
pub use value::Value;
