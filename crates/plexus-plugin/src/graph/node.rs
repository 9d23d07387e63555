//! Plugin nodes.

use chrono::{DateTime, Utc};
use serde::Serialize;

use plexus_core::types::PluginState;

/// A registered plugin in the dependency graph.
#[derive(Debug, Clone, Serialize)]
pub struct PluginNode {
    /// Unique plugin identifier.
    pub id: String,
    /// Current lifecycle state. Mutated only by the lifecycle manager.
    pub state: PluginState,
    /// When the node was added.
    pub registered_at: DateTime<Utc>,
    /// When the state last changed.
    pub state_changed_at: DateTime<Utc>,
}

impl PluginNode {
    /// Creates a node in the `REGISTERED` state.
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            state: PluginState::Registered,
            registered_at: now,
            state_changed_at: now,
        }
    }
}
