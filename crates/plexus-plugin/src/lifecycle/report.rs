//! Lifecycle reports returned by `initialize_all` and `cleanup_all`.

use serde::Serialize;

use crate::error::PluginError;

/// A plugin whose initializer or cleanup ran and failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedPlugin {
    /// Plugin id.
    pub plugin: String,
    /// What went wrong.
    pub error: PluginError,
}

/// A plugin that was not run, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPlugin {
    /// Plugin id.
    pub plugin: String,
    /// Human-readable reason.
    pub reason: String,
}

/// Outcome of one lifecycle sweep, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleReport {
    /// Plugins that completed.
    pub succeeded: Vec<String>,
    /// Plugins that ran and failed.
    pub failed: Vec<FailedPlugin>,
    /// Plugins that were not run.
    pub skipped: Vec<SkippedPlugin>,
}

impl LifecycleReport {
    /// True when nothing failed and nothing was skipped.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    /// Number of plugins that completed.
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    /// Ids of failed plugins.
    pub fn failed_plugins(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.plugin.as_str()).collect()
    }

    /// The skip reason recorded for `plugin`.
    pub fn skip_reason(&self, plugin: &str) -> Option<&str> {
        self.skipped
            .iter()
            .find(|s| s.plugin == plugin)
            .map(|s| s.reason.as_str())
    }

    pub(crate) fn succeed(&mut self, plugin: &str) {
        self.succeeded.push(plugin.to_string());
    }

    pub(crate) fn fail(&mut self, plugin: &str, error: PluginError) {
        self.failed.push(FailedPlugin {
            plugin: plugin.to_string(),
            error,
        });
    }

    pub(crate) fn skip(&mut self, plugin: &str, reason: impl Into<String>) {
        self.skipped.push(SkippedPlugin {
            plugin: plugin.to_string(),
            reason: reason.into(),
        });
    }
}
