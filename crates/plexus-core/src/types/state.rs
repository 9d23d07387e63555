//! Plugin lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a plugin node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PluginState {
    /// No node exists for this id.
    Unregistered,
    /// Registered and waiting for initialization.
    Registered,
    /// The initializer is running.
    Initializing,
    /// Initialized and serving.
    Initialized,
    /// Failed during initialization or cleanup. Terminal for the run.
    Failed,
    /// The cleanup routine is running.
    CleanupStarted,
    /// Cleaned up; services and subscriptions have been removed.
    CleanedUp,
}

impl PluginState {
    /// Returns the string name of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unregistered => "UNREGISTERED",
            Self::Registered => "REGISTERED",
            Self::Initializing => "INITIALIZING",
            Self::Initialized => "INITIALIZED",
            Self::Failed => "FAILED",
            Self::CleanupStarted => "CLEANUP_STARTED",
            Self::CleanedUp => "CLEANED_UP",
        }
    }

    /// Whether the lifecycle manager may move from `self` to `next`.
    pub fn can_transition_to(&self, next: PluginState) -> bool {
        use PluginState::*;
        match (self, next) {
            (_, Failed) => !matches!(self, Unregistered | CleanedUp | Failed),
            (Unregistered, Registered) => true,
            (Registered, Initializing) => true,
            (Initializing, Initialized) => true,
            (Initialized, CleanupStarted) => true,
            (CleanupStarted, CleanedUp) => true,
            _ => false,
        }
    }

    /// Whether the plugin's code is currently live.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Initializing | Self::Initialized | Self::CleanupStarted
        )
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
