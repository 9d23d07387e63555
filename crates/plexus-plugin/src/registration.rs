//! Plugin registration: descriptors and the registration builder.
//!
//! An external loader supplies a [`PluginDescriptor`] (typically deserialized
//! from its own configuration) and pairs it with capability objects through
//! [`PluginRegistration`]. The runtime validates the bundle as a whole before
//! touching any shared state.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::PluginContext;
use crate::error::{PluginError, PluginResult};
use crate::events::{EventContext, Priority, SubscriptionDefinition, SubscriptionSpec};
use crate::graph::DependencyKind;
use crate::services::{ServiceDefinition, ServiceHandler, ServiceScope};
use crate::traits::{
    Cleanable, CleanupFn, EventSubscriber, InitializeFn, Initializable, ServiceProvider,
};

/// A declared dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyDeclaration {
    /// Dependency plugin id.
    pub id: String,
    /// Edge kind.
    pub kind: DependencyKind,
}

/// A declared service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDeclaration {
    /// Service name.
    pub name: String,
    /// Access tier.
    #[serde(default)]
    pub scope: ServiceScope,
}

/// A declared subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionDeclaration {
    /// Event type.
    pub event_type: String,
    /// Dispatch priority.
    #[serde(default)]
    pub priority: Priority,
}

/// What a loader knows about a plugin before any code runs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Unique plugin id.
    pub id: String,
    /// Declared dependencies.
    #[serde(default)]
    pub dependencies: Vec<DependencyDeclaration>,
    /// Declared services; each needs a handler at registration.
    #[serde(default)]
    pub services: Vec<ServiceDeclaration>,
    /// Declared subscriptions; each needs a handler at registration.
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionDeclaration>,
}

impl PluginDescriptor {
    /// Descriptor with no declarations.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// A plugin bundled with its capabilities, ready for
/// [`crate::Runtime::register`].
pub struct PluginRegistration {
    descriptor: PluginDescriptor,
    initializer: Option<Arc<dyn Initializable>>,
    cleanup: Option<Arc<dyn Cleanable>>,
    service_providers: Vec<Arc<dyn ServiceProvider>>,
    event_subscribers: Vec<Arc<dyn EventSubscriber>>,
    services: Vec<ServiceDefinition>,
    subscriptions: Vec<SubscriptionDefinition>,
}

impl std::fmt::Debug for PluginRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistration")
            .field("descriptor", &self.descriptor)
            .field("initializer", &self.initializer.is_some())
            .field("cleanup", &self.cleanup.is_some())
            .field("service_providers", &self.service_providers.len())
            .field("event_subscribers", &self.event_subscribers.len())
            .field("services", &self.services)
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}

impl PluginRegistration {
    /// Starts a registration for `id` with no declarations.
    pub fn new(id: impl Into<String>) -> Self {
        Self::from_descriptor(PluginDescriptor::new(id))
    }

    /// Starts a registration from a loader-supplied descriptor.
    pub fn from_descriptor(descriptor: PluginDescriptor) -> Self {
        Self {
            descriptor,
            initializer: None,
            cleanup: None,
            service_providers: Vec::new(),
            event_subscribers: Vec::new(),
            services: Vec::new(),
            subscriptions: Vec::new(),
        }
    }

    /// Plugin id.
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    /// The descriptor as built so far.
    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    /// Declares a dependency of the given kind.
    pub fn depends_on(mut self, id: impl Into<String>, kind: DependencyKind) -> Self {
        self.descriptor.dependencies.push(DependencyDeclaration {
            id: id.into(),
            kind,
        });
        self
    }

    /// Declares a `REQUIRED` dependency.
    pub fn requires(self, id: impl Into<String>) -> Self {
        self.depends_on(id, DependencyKind::Required)
    }

    /// Declares an `OPTIONAL` dependency.
    pub fn optional(self, id: impl Into<String>) -> Self {
        self.depends_on(id, DependencyKind::Optional)
    }

    /// Declares that `id` enhances this plugin.
    pub fn enhanced_by(self, id: impl Into<String>) -> Self {
        self.depends_on(id, DependencyKind::Enhances)
    }

    /// Declares a conflict with `id`.
    pub fn conflicts_with(self, id: impl Into<String>) -> Self {
        self.depends_on(id, DependencyKind::Conflicts)
    }

    /// Sets the initializer.
    pub fn with_initializer(mut self, initializer: Arc<dyn Initializable>) -> Self {
        self.initializer = Some(initializer);
        self
    }

    /// Sets a closure initializer.
    pub fn on_initialize<F, Fut>(self, f: F) -> Self
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.with_initializer(Arc::new(InitializeFn::new(f)))
    }

    /// Sets the cleanup routine.
    pub fn with_cleanup(mut self, cleanup: Arc<dyn Cleanable>) -> Self {
        self.cleanup = Some(cleanup);
        self
    }

    /// Sets a closure cleanup routine.
    pub fn on_cleanup<F, Fut>(self, f: F) -> Self
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.with_cleanup(Arc::new(CleanupFn::new(f)))
    }

    /// Adds a service provider capability.
    pub fn with_service_provider(mut self, provider: Arc<dyn ServiceProvider>) -> Self {
        self.service_providers.push(provider);
        self
    }

    /// Adds an event subscriber capability.
    pub fn with_event_subscriber(mut self, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.event_subscribers.push(subscriber);
        self
    }

    /// Adds a service.
    pub fn service(
        mut self,
        name: impl Into<String>,
        scope: ServiceScope,
        handler: ServiceHandler,
    ) -> Self {
        self.services
            .push(ServiceDefinition::new(name, scope, handler));
        self
    }

    /// Adds a fully specified service definition.
    pub fn service_definition(mut self, definition: ServiceDefinition) -> Self {
        self.services.push(definition);
        self
    }

    /// Adds a closure subscription.
    pub fn subscribe<F>(mut self, spec: SubscriptionSpec, handler: F) -> Self
    where
        F: Fn(&mut EventContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscriptions
            .push(SubscriptionDefinition::new(spec, handler));
        self
    }

    /// Validates the bundle and flattens every capability into the pieces
    /// the runtime installs.
    pub(crate) fn resolve(self) -> PluginResult<ResolvedPlugin> {
        let id = self.descriptor.id.clone();
        if id.trim().is_empty() {
            return Err(PluginError::validation("plugin id must not be empty"));
        }

        for dep in &self.descriptor.dependencies {
            if dep.id.trim().is_empty() {
                return Err(PluginError::validation(format!(
                    "plugin '{id}' declares a dependency with an empty id"
                )));
            }
            if dep.id == id {
                return Err(PluginError::validation(format!(
                    "plugin '{id}' cannot depend on itself"
                )));
            }
        }

        let mut services = self.services;
        for provider in &self.service_providers {
            services.extend(provider.services());
        }
        let mut names = BTreeSet::new();
        for service in &services {
            if !names.insert(service.name.as_str()) {
                return Err(PluginError::validation(format!(
                    "plugin '{id}' provides service '{}' more than once",
                    service.name
                )));
            }
        }
        for declared in &self.descriptor.services {
            let Some(service) = services.iter_mut().find(|s| s.name == declared.name) else {
                return Err(PluginError::validation(format!(
                    "plugin '{id}' declares service '{}' without a handler",
                    declared.name
                )));
            };
            service.scope = declared.scope;
        }

        let mut subscriptions = self.subscriptions;
        for subscriber in &self.event_subscribers {
            subscriptions.extend(subscriber.subscriptions());
        }
        for declared in &self.descriptor.subscriptions {
            let mut matched = false;
            for sub in subscriptions
                .iter_mut()
                .filter(|s| s.spec.event_type == declared.event_type)
            {
                sub.spec.priority = declared.priority;
                matched = true;
            }
            if !matched {
                return Err(PluginError::validation(format!(
                    "plugin '{id}' declares a subscription to '{}' without a handler",
                    declared.event_type
                )));
            }
        }

        Ok(ResolvedPlugin {
            id,
            dependencies: self.descriptor.dependencies,
            initializer: self.initializer,
            cleanup: self.cleanup,
            services,
            subscriptions,
        })
    }
}

/// A validated registration.
pub(crate) struct ResolvedPlugin {
    pub(crate) id: String,
    pub(crate) dependencies: Vec<DependencyDeclaration>,
    pub(crate) initializer: Option<Arc<dyn Initializable>>,
    pub(crate) cleanup: Option<Arc<dyn Cleanable>>,
    pub(crate) services: Vec<ServiceDefinition>,
    pub(crate) subscriptions: Vec<SubscriptionDefinition>,
}

impl std::fmt::Debug for ResolvedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedPlugin")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .field("initializer", &self.initializer.is_some())
            .field("cleanup", &self.cleanup.is_some())
            .field("services", &self.services)
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}
