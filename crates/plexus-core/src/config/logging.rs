//! Logging configuration.

use serde::{Deserialize, Serialize};

/// Accepted values for [`LoggingConfig::format`].
pub const LOG_FORMATS: &[&str] = &["json", "pretty", "compact"];

/// Logging and tracing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive: `"trace"`, `"debug"`, `"info"`,
    /// `"warn"`, `"error"`, or a full `EnvFilter` expression.
    #[serde(default = "default_level")]
    pub level: String,
    /// Log format: `"json"`, `"pretty"` or `"compact"`.
    #[serde(default = "default_format")]
    pub format: String,
    /// Whether to include the event target (module path) in log lines.
    #[serde(default = "default_true")]
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
            with_target: true,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

fn default_true() -> bool {
    true
}
