//! Capability traits a plugin declares at registration.
//!
//! A plugin implements only the capabilities it needs. The runtime never
//! probes for them; [`crate::registration::PluginRegistration`] records which
//! ones were supplied.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::context::PluginContext;
use crate::events::SubscriptionDefinition;
use crate::services::ServiceDefinition;

/// Plugins with work to do when they are brought up.
#[async_trait]
pub trait Initializable: Send + Sync {
    /// Runs once, after every required dependency is initialized.
    ///
    /// Returning an error (or panicking) moves the plugin to `FAILED`.
    ///
    /// Runs inside an initialization sweep. Starting another sweep from
    /// here fails with `Validation` and `cleanup_all` returns an empty
    /// report.
    async fn initialize(&self, ctx: &PluginContext) -> anyhow::Result<()>;
}

/// Plugins with work to do when they are torn down.
#[async_trait]
pub trait Cleanable: Send + Sync {
    /// Runs once, before any of the plugin's dependencies are cleaned up.
    ///
    /// Runs inside a cleanup sweep, so the same restriction as
    /// [`Initializable::initialize`] applies.
    async fn cleanup(&self, ctx: &PluginContext) -> anyhow::Result<()>;
}

/// Plugins that expose services.
pub trait ServiceProvider: Send + Sync {
    /// Services to register under the plugin's id.
    fn services(&self) -> Vec<ServiceDefinition>;
}

/// Plugins that listen to events.
pub trait EventSubscriber: Send + Sync {
    /// Subscriptions to install under the plugin's id.
    fn subscriptions(&self) -> Vec<SubscriptionDefinition>;
}

type LifecycleFn = dyn Fn(PluginContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

fn boxed_lifecycle<F, Fut>(f: F) -> Arc<LifecycleFn>
where
    F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |ctx| f(ctx).boxed())
}

/// A closure-based initializer.
#[derive(Clone)]
pub struct InitializeFn {
    handler: Arc<LifecycleFn>,
}

impl InitializeFn {
    /// Wraps a closure that receives an owned context.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            handler: boxed_lifecycle(f),
        }
    }
}

impl std::fmt::Debug for InitializeFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializeFn")
            .field("handler", &"<closure>")
            .finish()
    }
}

#[async_trait]
impl Initializable for InitializeFn {
    async fn initialize(&self, ctx: &PluginContext) -> anyhow::Result<()> {
        (self.handler)(ctx.clone()).await
    }
}

/// A closure-based cleanup routine.
#[derive(Clone)]
pub struct CleanupFn {
    handler: Arc<LifecycleFn>,
}

impl CleanupFn {
    /// Wraps a closure that receives an owned context.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            handler: boxed_lifecycle(f),
        }
    }
}

impl std::fmt::Debug for CleanupFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupFn")
            .field("handler", &"<closure>")
            .finish()
    }
}

#[async_trait]
impl Cleanable for CleanupFn {
    async fn cleanup(&self, ctx: &PluginContext) -> anyhow::Result<()> {
        (self.handler)(ctx.clone()).await
    }
}
