//! Plugin context: the runtime surface handed to a plugin's own code.

use std::time::Duration;

use serde_json::{Map, Value};

use plexus_core::types::SubscriptionId;

use crate::error::PluginResult;
use crate::events::{ContextData, EventBus, EventContext, SubscriptionSpec};
use crate::services::{ServiceHandler, ServiceRegistry, ServiceScope};

/// Context passed to initializers and cleanups.
///
/// Every helper acts as the owning plugin: events are published with it as
/// the source, services are called with it as the consumer.
#[derive(Clone)]
pub struct PluginContext {
    /// Owning plugin.
    pub plugin_id: String,
    /// Event bus.
    pub bus: EventBus,
    /// Service registry.
    pub services: ServiceRegistry,
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin_id", &self.plugin_id)
            .finish()
    }
}

impl PluginContext {
    pub(crate) fn new(plugin_id: &str, bus: EventBus, services: ServiceRegistry) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            bus,
            services,
        }
    }

    /// Publishes an event with this plugin as the source.
    pub fn publish(&self, event_type: &str, data: Map<String, Value>) -> EventContext {
        self.bus
            .publish(event_type, data, ContextData::from_source(&self.plugin_id))
    }

    /// Subscribes a handler owned by this plugin.
    pub fn subscribe<F>(&self, spec: SubscriptionSpec, handler: F) -> PluginResult<SubscriptionId>
    where
        F: Fn(&mut EventContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.bus.subscribe(&self.plugin_id, spec, handler)
    }

    /// Registers a service owned by this plugin.
    pub fn register_service(
        &self,
        name: &str,
        handler: ServiceHandler,
        scope: ServiceScope,
    ) -> PluginResult<()> {
        self.services
            .register_service(&self.plugin_id, name, handler, scope, Map::new())
    }

    /// Calls a synchronous service as this plugin.
    pub fn call_service(&self, provider: &str, name: &str, args: &[Value]) -> PluginResult<Value> {
        self.services
            .call_service(provider, name, &self.plugin_id, args)
    }

    /// Awaits a service as this plugin.
    pub async fn await_service(
        &self,
        provider: &str,
        name: &str,
        args: Vec<Value>,
        timeout: Option<Duration>,
    ) -> PluginResult<Value> {
        self.services
            .await_service(provider, name, &self.plugin_id, args, timeout)
            .await
    }
}
