//! Service registry: named, scoped call endpoints between plugins.
//!
//! Access is checked on every call against the live dependency graph and
//! the provider's lifecycle state; nothing is cached.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use plexus_core::types::PluginState;

use crate::error::{PluginError, PluginResult, panic_message};
use crate::shared::{SharedHandle, SharedState};

use super::descriptor::{
    ServiceDefinition, ServiceDescriptor, ServiceHandler, ServiceRequest, ServiceScope,
};

/// Provider → name → descriptor.
#[derive(Default)]
pub(crate) struct ServiceTable {
    by_provider: BTreeMap<String, BTreeMap<String, ServiceDescriptor>>,
}

impl ServiceTable {
    pub(crate) fn insert(&mut self, descriptor: ServiceDescriptor) -> PluginResult<()> {
        let services = self.by_provider.entry(descriptor.owner.clone()).or_default();
        if services.contains_key(&descriptor.name) {
            return Err(PluginError::ServiceAlreadyRegistered {
                provider: descriptor.owner,
                name: descriptor.name,
            });
        }
        services.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    pub(crate) fn contains(&self, provider: &str, name: &str) -> bool {
        self.get(provider, name).is_some()
    }

    pub(crate) fn get(&self, provider: &str, name: &str) -> Option<&ServiceDescriptor> {
        self.by_provider.get(provider).and_then(|s| s.get(name))
    }

    pub(crate) fn remove(&mut self, provider: &str, name: &str) -> Option<ServiceDescriptor> {
        let services = self.by_provider.get_mut(provider)?;
        let removed = services.remove(name);
        if services.is_empty() {
            self.by_provider.remove(provider);
        }
        removed
    }

    pub(crate) fn remove_owner(&mut self, owner: &str) -> usize {
        self.by_provider.remove(owner).map(|s| s.len()).unwrap_or(0)
    }

    pub(crate) fn owned_by(&self, owner: &str) -> Vec<ServiceDescriptor> {
        self.by_provider
            .get(owner)
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default()
    }

    fn all(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.by_provider.values().flat_map(|s| s.values())
    }
}

/// Handle to the runtime's service table. Cheap to clone.
#[derive(Clone)]
pub struct ServiceRegistry {
    shared: SharedHandle,
    default_timeout: Option<Duration>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

impl ServiceRegistry {
    pub(crate) fn new(shared: SharedHandle, default_timeout: Option<Duration>) -> Self {
        Self {
            shared,
            default_timeout,
        }
    }

    /// Registers a service owned by `owner`. Rejected once the owner is
    /// `FAILED` or `CLEANED_UP`.
    pub fn register_service(
        &self,
        owner: &str,
        name: &str,
        handler: ServiceHandler,
        scope: ServiceScope,
        metadata: Map<String, Value>,
    ) -> PluginResult<()> {
        self.register_definition(
            owner,
            ServiceDefinition {
                name: name.to_string(),
                scope,
                handler,
                metadata,
            },
        )
    }

    pub(crate) fn register_definition(
        &self,
        owner: &str,
        definition: ServiceDefinition,
    ) -> PluginResult<()> {
        let descriptor = validated_descriptor(owner, definition)?;
        let (name, scope) = (descriptor.name.clone(), descriptor.scope);
        {
            let mut state = self.shared.lock();
            state.ensure_owner_active(owner)?;
            state.services.insert(descriptor)?;
        }

        info!(plugin_id = %owner, service = %name, scope = %scope, "Registered service");
        Ok(())
    }

    /// Removes one service. Returns whether it existed.
    pub fn unregister_service(&self, owner: &str, name: &str) -> bool {
        let removed = self.shared.lock().services.remove(owner, name).is_some();
        if removed {
            info!(plugin_id = %owner, service = %name, "Unregistered service");
        }
        removed
    }

    /// Whether `provider` registered a service called `name`.
    pub fn has_service(&self, provider: &str, name: &str) -> bool {
        self.shared.lock().services.contains(provider, name)
    }

    /// Descriptor of a registered service.
    pub fn get_descriptor(&self, provider: &str, name: &str) -> Option<ServiceDescriptor> {
        self.shared.lock().services.get(provider, name).cloned()
    }

    /// Services registered by `owner`, sorted by name.
    pub fn services_of(&self, owner: &str) -> Vec<ServiceDescriptor> {
        self.shared.lock().services.owned_by(owner)
    }

    /// Services `consumer` may call right now, sorted by provider and name.
    pub fn visible_services(&self, consumer: &str) -> Vec<ServiceDescriptor> {
        let state = self.shared.lock();
        state
            .services
            .all()
            .filter(|d| authorize(&state, &d.owner, &d.name, consumer).is_ok())
            .cloned()
            .collect()
    }

    /// Calls a synchronous service on the caller's stack.
    pub fn call_service(
        &self,
        provider: &str,
        name: &str,
        consumer: &str,
        args: &[Value],
    ) -> PluginResult<Value> {
        let handler = {
            let state = self.shared.lock();
            authorize(&state, provider, name, consumer)?
        };

        let ServiceHandler::Sync(f) = handler else {
            return Err(PluginError::AsyncService {
                provider: provider.to_string(),
                name: name.to_string(),
            });
        };

        debug!(provider = %provider, service = %name, consumer = %consumer, "Calling service");
        run_sync(provider, name, || f(args))
    }

    /// Calls a service and waits for its result.
    ///
    /// Asynchronous handlers run as their own task. If `timeout` (or the
    /// configured default) expires first, the request's cancellation token
    /// is triggered and the task is abandoned, not aborted.
    pub async fn await_service(
        &self,
        provider: &str,
        name: &str,
        consumer: &str,
        args: Vec<Value>,
        timeout: Option<Duration>,
    ) -> PluginResult<Value> {
        let handler = {
            let state = self.shared.lock();
            authorize(&state, provider, name, consumer)?
        };

        debug!(provider = %provider, service = %name, consumer = %consumer, "Awaiting service");

        let f = match handler {
            ServiceHandler::Sync(f) => return run_sync(provider, name, || f(&args)),
            ServiceHandler::Async(f) => f,
        };

        let cancellation = CancellationToken::new();
        let request = ServiceRequest {
            provider: provider.to_string(),
            name: name.to_string(),
            consumer: consumer.to_string(),
            args,
            cancellation: cancellation.clone(),
        };
        let task = tokio::spawn(f(request));

        let joined = match timeout.or(self.default_timeout) {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    cancellation.cancel();
                    warn!(
                        provider = %provider,
                        service = %name,
                        consumer = %consumer,
                        timeout_ms = limit.as_millis() as u64,
                        "Service call timed out, abandoning handler"
                    );
                    return Err(PluginError::ServiceTimeout {
                        provider: provider.to_string(),
                        name: name.to_string(),
                    });
                }
            },
            None => task.await,
        };

        let message = match joined {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => format!("{e:#}"),
            Err(join_err) if join_err.is_panic() => panic_message(join_err.into_panic().as_ref()),
            Err(join_err) => join_err.to_string(),
        };
        Err(service_failed(provider, name, message))
    }
}

fn validated_descriptor(owner: &str, definition: ServiceDefinition) -> PluginResult<ServiceDescriptor> {
    if owner.trim().is_empty() {
        return Err(PluginError::validation("service owner must not be empty"));
    }
    if definition.name.trim().is_empty() {
        return Err(PluginError::validation(format!(
            "service name for plugin '{owner}' must not be empty"
        )));
    }
    Ok(ServiceDescriptor::from_definition(owner, definition))
}

/// Resolves the handler `consumer` may invoke, or why it may not.
///
/// Readiness is not checked beyond the terminal states: a provider that is
/// still `REGISTERED`, or was never added to the graph, serves calls as soon
/// as its services are registered. Scope alone decides access. Retired
/// providers normally surface as `ServiceNotFound` because their services
/// are purged with the state change.
fn authorize(
    state: &SharedState,
    provider: &str,
    name: &str,
    consumer: &str,
) -> PluginResult<ServiceHandler> {
    let descriptor =
        state
            .services
            .get(provider, name)
            .ok_or_else(|| PluginError::ServiceNotFound {
                provider: provider.to_string(),
                name: name.to_string(),
            })?;

    let provider_state = state.graph.state(provider);
    if matches!(provider_state, PluginState::Failed | PluginState::CleanedUp) {
        return Err(PluginError::ServiceUnavailable {
            provider: provider.to_string(),
            name: name.to_string(),
            state: provider_state,
        });
    }

    let allowed = match descriptor.scope {
        ServiceScope::Public => true,
        ServiceScope::Private => consumer == provider,
        ServiceScope::Dependent => {
            consumer == provider || state.graph.depends_on(consumer, provider)
        }
    };
    if !allowed {
        return Err(PluginError::ServiceAccess {
            provider: provider.to_string(),
            name: name.to_string(),
            consumer: consumer.to_string(),
        });
    }

    Ok(descriptor.handler.clone())
}

fn run_sync<F>(provider: &str, name: &str, call: F) -> PluginResult<Value>
where
    F: FnOnce() -> anyhow::Result<Value>,
{
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(service_failed(provider, name, format!("{e:#}"))),
        Err(payload) => Err(service_failed(provider, name, panic_message(payload.as_ref()))),
    }
}

fn service_failed(provider: &str, name: &str, message: String) -> PluginError {
    warn!(provider = %provider, service = %name, error = %message, "Service handler failed");
    PluginError::ServiceFailed {
        provider: provider.to_string(),
        name: name.to_string(),
        message,
    }
}
