//! Runtime: the object that owns one dependency graph, event bus, service
//! registry and lifecycle manager, and hands out cheap clones of itself.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::info;

use plexus_core::config::RuntimeConfig;
use plexus_core::types::{PluginState, SubscriptionId};

use crate::context::PluginContext;
use crate::error::{PluginError, PluginResult};
use crate::events::{ContextData, EventBus, EventContext, SubscriptionSpec};
use crate::graph::{DependencyEdge, DependencyGraph, DependencyKind};
use crate::lifecycle::{LifecycleManager, LifecycleReport};
use crate::registration::PluginRegistration;
use crate::resolver::Resolver;
use crate::services::{ServiceDescriptor, ServiceHandler, ServiceRegistry, ServiceScope};
use crate::shared::{PluginCapabilities, SharedHandle, new_handle};

/// Plugin runtime. Clones share state.
#[derive(Clone)]
pub struct Runtime {
    shared: SharedHandle,
    bus: EventBus,
    services: ServiceRegistry,
    lifecycle: Arc<LifecycleManager>,
    config: Arc<RuntimeConfig>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("plugins", &self.plugin_ids())
            .finish_non_exhaustive()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl Runtime {
    /// Creates an empty runtime.
    pub fn new(config: RuntimeConfig) -> Self {
        let shared = new_handle(config.resolver.clone());
        let bus = EventBus::new(shared.clone());
        let services = ServiceRegistry::new(shared.clone(), config.services.default_timeout());
        let lifecycle = Arc::new(LifecycleManager::new(
            shared.clone(),
            bus.clone(),
            services.clone(),
            config.lifecycle.clone(),
        ));

        Self {
            shared,
            bus,
            services,
            lifecycle,
            config: Arc::new(config),
        }
    }

    /// Configuration the runtime was built with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The event bus.
    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// The service registry.
    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    /// The lifecycle manager.
    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    // ── Registration ─────────────────────────────────────────────

    /// Registers a plugin with its dependencies, services and
    /// subscriptions. Nothing is installed unless everything validates.
    pub fn register(&self, registration: PluginRegistration) -> PluginResult<()> {
        let plugin = registration.resolve()?;
        let id = plugin.id.clone();

        let mut state = self.shared.lock();
        if state.graph.contains(&id) {
            return Err(PluginError::PluginAlreadyRegistered { plugin: id });
        }
        if let Some(taken) = plugin
            .services
            .iter()
            .find(|s| state.services.contains(&id, &s.name))
        {
            return Err(PluginError::ServiceAlreadyRegistered {
                provider: id,
                name: taken.name.clone(),
            });
        }

        state.graph.add_plugin(&id)?;
        for dep in &plugin.dependencies {
            state.graph.add_dependency(&id, &dep.id, dep.kind)?;
        }
        state.plugins.insert(
            id.clone(),
            PluginCapabilities {
                initializer: plugin.initializer,
                cleanup: plugin.cleanup,
            },
        );
        let service_count = plugin.services.len();
        for definition in plugin.services {
            state
                .services
                .insert(ServiceDescriptor::from_definition(&id, definition))?;
        }
        let subscription_count = plugin.subscriptions.len();
        for definition in plugin.subscriptions {
            state.subscriptions.insert(&id, definition);
        }
        drop(state);

        info!(
            plugin_id = %id,
            dependencies = plugin.dependencies.len(),
            services = service_count,
            subscriptions = subscription_count,
            "Registered plugin"
        );
        Ok(())
    }

    /// Removes a plugin that is not running, along with the edges it
    /// declared, its services and its subscriptions.
    pub fn unregister(&self, id: &str) -> PluginResult<()> {
        let mut state = self.shared.lock();
        let current = state.graph.state(id);
        if current == PluginState::Unregistered {
            return Err(PluginError::PluginNotFound {
                plugin: id.to_string(),
            });
        }
        if current.is_active() {
            return Err(PluginError::validation(format!(
                "plugin '{id}' is {current} and cannot be unregistered"
            )));
        }

        state.graph.remove_plugin(id);
        state.plugins.remove(id);
        state.purge_owner(id);
        drop(state);

        info!(plugin_id = %id, "Unregistered plugin");
        Ok(())
    }

    /// A context acting as a registered plugin.
    pub fn context(&self, id: &str) -> PluginResult<PluginContext> {
        if !self.shared.lock().graph.contains(id) {
            return Err(PluginError::PluginNotFound {
                plugin: id.to_string(),
            });
        }
        Ok(self.lifecycle.context_for(id))
    }

    // ── Graph ────────────────────────────────────────────────────

    /// Adds a bare plugin node with no capabilities.
    pub fn add_plugin(&self, id: &str) -> PluginResult<()> {
        self.shared.lock().graph.add_plugin(id)?;
        info!(plugin_id = %id, "Added plugin");
        Ok(())
    }

    /// Records a dependency edge. Returns the kind it replaced.
    pub fn add_dependency(
        &self,
        from: &str,
        to: &str,
        kind: DependencyKind,
    ) -> PluginResult<Option<DependencyKind>> {
        let previous = self.shared.lock().graph.add_dependency(from, to, kind)?;
        info!(from = %from, to = %to, kind = %kind, "Added dependency");
        Ok(previous)
    }

    /// Removes a dependency edge.
    pub fn remove_dependency(&self, from: &str, to: &str) -> Option<DependencyKind> {
        self.shared.lock().graph.remove_dependency(from, to)
    }

    /// See [`Resolver::get_load_order`].
    pub fn get_load_order<S: AsRef<str>>(&self, ids: &[S]) -> PluginResult<Vec<String>> {
        let state = self.shared.lock();
        Resolver::new(&state.graph, &state.resolver).get_load_order(ids)
    }

    /// See [`Resolver::resolve_dependencies`].
    pub fn resolve_dependencies<S: AsRef<str>>(&self, ids: &[S]) -> PluginResult<Vec<String>> {
        let state = self.shared.lock();
        Resolver::new(&state.graph, &state.resolver).resolve_dependencies(ids)
    }

    /// See [`Resolver::check_missing_dependencies`].
    pub fn check_missing_dependencies(&self, id: &str) -> Vec<String> {
        let state = self.shared.lock();
        Resolver::new(&state.graph, &state.resolver).check_missing_dependencies(id)
    }

    /// See [`Resolver::check_conflicts`].
    pub fn check_conflicts(&self, id: &str) -> Vec<String> {
        let state = self.shared.lock();
        Resolver::new(&state.graph, &state.resolver).check_conflicts(id)
    }

    /// Lifecycle state of a plugin.
    pub fn state(&self, id: &str) -> PluginState {
        self.shared.lock().graph.state(id)
    }

    /// Registered plugin ids, sorted.
    pub fn plugin_ids(&self) -> Vec<String> {
        self.shared.lock().graph.plugin_ids()
    }

    /// Edges declared by `id`.
    pub fn dependencies_of(&self, id: &str) -> Vec<DependencyEdge> {
        self.shared.lock().graph.dependencies_of(id)
    }

    /// Dependency edges pointing at `id`.
    pub fn dependents_of(&self, id: &str) -> Vec<DependencyEdge> {
        self.shared.lock().graph.dependents_of(id)
    }

    /// Runs `f` against the graph under the runtime lock. `f` must not
    /// call back into the runtime.
    pub fn with_graph<R>(&self, f: impl FnOnce(&DependencyGraph) -> R) -> R {
        f(&self.shared.lock().graph)
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// See [`LifecycleManager::initialize_all`].
    pub async fn initialize_all<S: AsRef<str> + Sync>(
        &self,
        ids: &[S],
    ) -> PluginResult<LifecycleReport> {
        self.lifecycle.initialize_all(ids).await
    }

    /// See [`LifecycleManager::cleanup_all`].
    pub async fn cleanup_all(&self) -> LifecycleReport {
        self.lifecycle.cleanup_all().await
    }

    // ── Events ───────────────────────────────────────────────────

    /// See [`EventBus::publish`].
    pub fn publish(
        &self,
        event_type: &str,
        data: Map<String, Value>,
        context_data: ContextData,
    ) -> EventContext {
        self.bus.publish(event_type, data, context_data)
    }

    /// See [`EventBus::subscribe`].
    pub fn subscribe<F>(
        &self,
        owner: &str,
        spec: SubscriptionSpec,
        handler: F,
    ) -> PluginResult<SubscriptionId>
    where
        F: Fn(&mut EventContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.bus.subscribe(owner, spec, handler)
    }

    /// See [`EventBus::unsubscribe`].
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// See [`EventBus::unsubscribe_all`].
    pub fn unsubscribe_all(&self, owner: &str) -> usize {
        self.bus.unsubscribe_all(owner)
    }

    // ── Services ─────────────────────────────────────────────────

    /// See [`ServiceRegistry::register_service`].
    pub fn register_service(
        &self,
        owner: &str,
        name: &str,
        handler: ServiceHandler,
        scope: ServiceScope,
        metadata: Map<String, Value>,
    ) -> PluginResult<()> {
        self.services
            .register_service(owner, name, handler, scope, metadata)
    }

    /// See [`ServiceRegistry::call_service`].
    pub fn call_service(
        &self,
        provider: &str,
        name: &str,
        consumer: &str,
        args: &[Value],
    ) -> PluginResult<Value> {
        self.services.call_service(provider, name, consumer, args)
    }

    /// See [`ServiceRegistry::await_service`].
    pub async fn await_service(
        &self,
        provider: &str,
        name: &str,
        consumer: &str,
        args: Vec<Value>,
        timeout: Option<Duration>,
    ) -> PluginResult<Value> {
        self.services
            .await_service(provider, name, consumer, args, timeout)
            .await
    }
}
