//! Lifecycle manager configuration.

use serde::{Deserialize, Serialize};

/// Lifecycle manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Publish `plugin.state_changed` for every transition. Failure and
    /// degradation events are published regardless.
    #[serde(default = "default_true")]
    pub emit_state_events: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            emit_state_events: true,
        }
    }
}

fn default_true() -> bool {
    true
}
