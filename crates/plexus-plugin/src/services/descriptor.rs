//! Service descriptors, scopes and handlers.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

/// Which consumers may call a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceScope {
    /// Any plugin.
    #[default]
    Public,
    /// The provider and plugins with a dependency edge to it.
    Dependent,
    /// The provider only.
    Private,
}

impl ServiceScope {
    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "PUBLIC",
            Self::Dependent => "DEPENDENT",
            Self::Private => "PRIVATE",
        }
    }
}

impl fmt::Display for ServiceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments for one asynchronous service invocation.
#[derive(Debug, Clone)]
pub struct ServiceRequest {
    /// Providing plugin.
    pub provider: String,
    /// Service name.
    pub name: String,
    /// Calling plugin.
    pub consumer: String,
    /// Call arguments.
    pub args: Vec<Value>,
    /// Canceled when the caller stops waiting. Handlers should check it
    /// at their own await points; nothing stops them forcibly.
    pub cancellation: CancellationToken,
}

type SyncFn = dyn Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync;
type AsyncFn = dyn Fn(ServiceRequest) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync;

/// A service endpoint.
#[derive(Clone)]
pub enum ServiceHandler {
    /// Runs to completion on the caller's stack.
    Sync(Arc<SyncFn>),
    /// Produces a future; only reachable through `await_service`.
    Async(Arc<AsyncFn>),
}

impl ServiceHandler {
    /// Wraps a synchronous closure.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    /// Wraps a closure returning a future.
    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(ServiceRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::Async(Arc::new(move |req| f(req).boxed()))
    }

    /// Whether the handler needs `await_service`.
    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }
}

impl fmt::Debug for ServiceHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("ServiceHandler::Sync"),
            Self::Async(_) => f.write_str("ServiceHandler::Async"),
        }
    }
}

/// A service as declared by a provider, before an owner is bound.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    /// Service name, unique per provider.
    pub name: String,
    /// Access tier.
    pub scope: ServiceScope,
    /// Endpoint.
    pub handler: ServiceHandler,
    /// Free-form metadata.
    pub metadata: Map<String, Value>,
}

impl ServiceDefinition {
    /// Creates a definition with empty metadata.
    pub fn new(name: impl Into<String>, scope: ServiceScope, handler: ServiceHandler) -> Self {
        Self {
            name: name.into(),
            scope,
            handler,
            metadata: Map::new(),
        }
    }

    /// Adds a metadata entry.
    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// A registered service.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    /// Providing plugin.
    pub owner: String,
    /// Service name.
    pub name: String,
    /// Access tier.
    pub scope: ServiceScope,
    /// Endpoint.
    pub handler: ServiceHandler,
    /// Free-form metadata.
    pub metadata: Map<String, Value>,
}

impl ServiceDescriptor {
    pub(crate) fn from_definition(owner: &str, definition: ServiceDefinition) -> Self {
        Self {
            owner: owner.to_string(),
            name: definition.name,
            scope: definition.scope,
            handler: definition.handler,
            metadata: definition.metadata,
        }
    }
}
