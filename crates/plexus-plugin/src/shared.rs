//! Shared runtime state guarded by a single mutex.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use plexus_core::config::resolver::ResolverConfig;
use plexus_core::types::PluginState;

use crate::error::{PluginError, PluginResult};
use crate::events::subscription::SubscriptionTable;
use crate::graph::DependencyGraph;
use crate::services::registry::ServiceTable;
use crate::traits::{Cleanable, Initializable};

/// Lifecycle capabilities a plugin declared at registration.
#[derive(Clone, Default)]
pub(crate) struct PluginCapabilities {
    pub(crate) initializer: Option<Arc<dyn Initializable>>,
    pub(crate) cleanup: Option<Arc<dyn Cleanable>>,
}

/// Everything the components share. Never held across an `.await` or
/// while a handler runs.
pub(crate) struct SharedState {
    pub(crate) graph: DependencyGraph,
    pub(crate) subscriptions: SubscriptionTable,
    pub(crate) services: ServiceTable,
    pub(crate) plugins: HashMap<String, PluginCapabilities>,
    pub(crate) resolver: ResolverConfig,
}

impl SharedState {
    pub(crate) fn new(resolver: ResolverConfig) -> Self {
        Self {
            graph: DependencyGraph::new(),
            subscriptions: SubscriptionTable::default(),
            services: ServiceTable::default(),
            plugins: HashMap::new(),
            resolver,
        }
    }

    /// Fails if `owner` has reached `FAILED` or `CLEANED_UP`. Checked under
    /// the same lock as the insert it guards, so nothing slips in after a
    /// purge.
    pub(crate) fn ensure_owner_active(&self, owner: &str) -> PluginResult<()> {
        let state = self.graph.state(owner);
        if matches!(state, PluginState::Failed | PluginState::CleanedUp) {
            return Err(PluginError::PluginInactive {
                plugin: owner.to_string(),
                state,
            });
        }
        Ok(())
    }

    /// Drops every service and subscription a plugin owns.
    pub(crate) fn purge_owner(&mut self, owner: &str) -> (usize, usize) {
        let services = self.services.remove_owner(owner);
        let subscriptions = self.subscriptions.remove_owner(owner);
        (services, subscriptions)
    }
}

pub(crate) type SharedHandle = Arc<Mutex<SharedState>>;

pub(crate) fn new_handle(resolver: ResolverConfig) -> SharedHandle {
    Arc::new(Mutex::new(SharedState::new(resolver)))
}
