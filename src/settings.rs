//! Runtime settings
//!
//! Settings come from three layers, later ones winning:
//! 1. built-in defaults
//! 2. an optional `quince.toml` file
//! 3. `QUINCE_*` environment variables
//!
//! ```toml
//! default_timeout_ms = 5000
//! function_prefix = "quince:"
//!
//! [global_variables]
//! environment = "staging"
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::value::Value;

/// Default settings file name looked up by [`Settings::discover`]
pub const SETTINGS_FILE: &str = "quince.toml";

pub const ENV_TEST_NAME_VARIABLE: &str = "QUINCE_TEST_NAME_VARIABLE";
pub const ENV_TEST_PACKAGE_VARIABLE: &str = "QUINCE_TEST_PACKAGE_VARIABLE";
pub const ENV_DEFAULT_TIMEOUT: &str = "QUINCE_DEFAULT_TIMEOUT_MS";
pub const ENV_FUNCTION_PREFIX: &str = "QUINCE_FUNCTION_PREFIX";
pub const ENV_LOG_MESSAGES: &str = "QUINCE_LOG_MESSAGES";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Variable seeded with the running test's name
    #[serde(default = "default_test_name_variable")]
    pub test_name_variable: String,
    /// Variable seeded with the running test's package
    #[serde(default = "default_test_package_variable")]
    pub test_package_variable: String,
    /// Time to wait for forked actions when a test finishes
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Prefix of inline function calls, e.g. `quince:concat(...)`
    #[serde(default = "default_function_prefix")]
    pub function_prefix: String,
    /// Log inbound/outbound messages when no message listener is registered
    #[serde(default = "default_true")]
    pub log_messages: bool,
    /// Variables present in every fresh test context
    #[serde(default)]
    pub global_variables: IndexMap<String, Value>,
}

fn default_test_name_variable() -> String {
    "quince.test.name".to_string()
}

fn default_test_package_variable() -> String {
    "quince.test.package".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_function_prefix() -> String {
    "quince:".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            test_name_variable: default_test_name_variable(),
            test_package_variable: default_test_package_variable(),
            default_timeout_ms: default_timeout_ms(),
            function_prefix: default_function_prefix(),
            log_messages: true,
            global_variables: IndexMap::new(),
        }
    }
}

impl Settings {
    /// Parse settings from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| EngineError::Settings(e.to_string()))
    }

    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::Settings(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Load `quince.toml` from the given directory if present, defaults otherwise,
    /// then apply environment overrides.
    pub fn discover(dir: &Path) -> Result<Self> {
        let file = dir.join(SETTINGS_FILE);
        let settings = if file.is_file() {
            tracing::debug!(path = %file.display(), "Loading settings file");
            Self::load(&file)?
        } else {
            Self::default()
        };
        settings.with_env_overrides()
    }

    /// Apply `QUINCE_*` environment variables on top of these settings
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(name) = lookup(ENV_TEST_NAME_VARIABLE) {
            self.test_name_variable = name;
        }
        if let Some(name) = lookup(ENV_TEST_PACKAGE_VARIABLE) {
            self.test_package_variable = name;
        }
        if let Some(timeout) = lookup(ENV_DEFAULT_TIMEOUT) {
            self.default_timeout_ms = timeout.trim().parse().map_err(|_| {
                EngineError::Settings(format!(
                    "{} must be a number of milliseconds, got '{}'",
                    ENV_DEFAULT_TIMEOUT, timeout
                ))
            })?;
        }
        if let Some(prefix) = lookup(ENV_FUNCTION_PREFIX) {
            self.function_prefix = prefix;
        }
        if let Some(flag) = lookup(ENV_LOG_MESSAGES) {
            self.log_messages = matches!(flag.trim().to_lowercase().as_str(), "true" | "1" | "yes");
        }
        Ok(self)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}
