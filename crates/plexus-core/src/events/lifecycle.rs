//! Lifecycle events.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::topics;
use crate::types::PluginState;

/// Lifecycle events published by the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A plugin changed state.
    StateChanged {
        /// Plugin identifier.
        plugin: String,
        /// Previous state.
        from: PluginState,
        /// New state.
        to: PluginState,
    },
    /// A plugin finished initializing.
    Initialized {
        /// Plugin identifier.
        plugin: String,
    },
    /// A plugin failed or was skipped during initialization.
    InitializationFailed {
        /// Plugin identifier.
        plugin: String,
        /// Why the plugin did not come up.
        reason: String,
    },
    /// A plugin came up without an optional or enhancing dependency.
    CapabilityDegraded {
        /// The dependent plugin that lost a capability.
        plugin: String,
        /// The dependency that is unavailable.
        dependency: String,
        /// Edge kind, `"OPTIONAL"` or `"ENHANCES"`.
        kind: String,
        /// Why the dependency is unavailable.
        reason: String,
    },
    /// A plugin finished cleaning up.
    CleanedUp {
        /// Plugin identifier.
        plugin: String,
    },
    /// A plugin's cleanup routine failed.
    CleanupFailed {
        /// Plugin identifier.
        plugin: String,
        /// Failure description.
        reason: String,
    },
}

impl LifecycleEvent {
    /// Event type the event is published under.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => topics::STATE_CHANGED,
            Self::Initialized { .. } => topics::INITIALIZED,
            Self::InitializationFailed { .. } => topics::INITIALIZATION_FAILED,
            Self::CapabilityDegraded { .. } => topics::CAPABILITY_DEGRADED,
            Self::CleanedUp { .. } => topics::CLEANED_UP,
            Self::CleanupFailed { .. } => topics::CLEANUP_FAILED,
        }
    }

    /// The plugin the event is about.
    pub fn plugin(&self) -> &str {
        match self {
            Self::StateChanged { plugin, .. }
            | Self::Initialized { plugin }
            | Self::InitializationFailed { plugin, .. }
            | Self::CapabilityDegraded { plugin, .. }
            | Self::CleanedUp { plugin }
            | Self::CleanupFailed { plugin, .. } => plugin,
        }
    }

    /// Converts the event into the key/value data carried by an event
    /// context. The `type` tag is dropped since the topic already names it.
    pub fn to_data(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => {
                map.shift_remove("type");
                map
            }
            _ => Map::new(),
        }
    }
}
