//! Error types for the Quince test runtime

use thiserror::Error;

/// Result type alias for Quince operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Message raised when forked actions do not complete within the test timeout.
pub const COMPLETION_TIMEOUT_MESSAGE: &str = "Failed to wait for test container to finish properly";

/// Main error type for test execution and variable resolution
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("{0}")]
    Runtime(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unknown variable '{name}' in expression '{expression}'")]
    NoSuchVariable { name: String, expression: String },

    #[error("Unknown property '{segment}' on root variable in expression '{expression}'")]
    UnknownProperty { segment: String, expression: String },

    #[error("Unknown segment value '{segment}' in expression '{expression}'")]
    UnknownSegment { segment: String, expression: String },

    #[error("Unable to extract value using expression '{expression}'! Failed at segment '{segment}' ({position}/{total})\nReason: {reason}.\nFrom object ({object_type}):\n{rendered}")]
    SegmentExtraction {
        expression: String,
        segment: String,
        position: usize,
        total: usize,
        reason: String,
        object_type: String,
        rendered: String,
    },

    #[error("No segment extractor able to handle '{segment}' of type {object_type} in expression '{expression}'")]
    NoExtractor {
        segment: String,
        object_type: String,
        expression: String,
    },

    #[error("Invalid variable expression '{expression}': {message}")]
    InvalidExpression { expression: String, message: String },

    #[error("Can not create variable '{0}', please define proper variable name")]
    InvalidVariableName(String),

    #[error("Trying to set variable: {0}, but variable value is null")]
    NullVariableValue(String),

    #[error("Invalid test parameter usage - received '{names}' parameters with '{values}' values")]
    InvalidParameters { names: usize, values: usize },

    #[error("Unknown function '{0}'")]
    NoSuchFunction(String),

    #[error("Function '{function}': {message}")]
    FunctionArguments { function: String, message: String },

    #[error("Before test failed with errors: {0}")]
    BeforeTest(#[source] Box<EngineError>),

    #[error("{}", COMPLETION_TIMEOUT_MESSAGE)]
    CompletionTimeout,

    #[error("Forked action '{0}' panicked")]
    ForkedActionPanicked(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    TestCaseFailed(#[source] Box<EngineError>),
}

impl EngineError {
    pub fn runtime(message: impl Into<String>) -> Self {
        EngineError::Runtime(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }

    /// Wraps a cause as a test case failure, never double wrapping.
    pub fn test_case_failed(cause: EngineError) -> Self {
        match cause {
            EngineError::TestCaseFailed(_) => cause,
            other => EngineError::TestCaseFailed(Box::new(other)),
        }
    }

    /// The innermost cause behind test case failure wrappers.
    pub fn root_cause(&self) -> &EngineError {
        match self {
            EngineError::TestCaseFailed(cause) => cause.root_cause(),
            other => other,
        }
    }

    pub fn is_completion_timeout(&self) -> bool {
        matches!(self.root_cause(), EngineError::CompletionTimeout)
    }
}
