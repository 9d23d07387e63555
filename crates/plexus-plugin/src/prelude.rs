//! Prelude for convenient imports.

pub use async_trait::async_trait;

pub use crate::context::PluginContext;
pub use crate::error::{PluginError, PluginResult};
pub use crate::events::{ContextData, EventContext, EventHandler, Priority, SubscriptionSpec};
pub use crate::graph::DependencyKind;
pub use crate::lifecycle::LifecycleReport;
pub use crate::registration::{PluginDescriptor, PluginRegistration};
pub use crate::runtime::Runtime;
pub use crate::services::{
    ServiceDefinition, ServiceHandler, ServiceRequest, ServiceScope,
};
pub use crate::traits::{Cleanable, EventSubscriber, Initializable, ServiceProvider};

pub use crate::event_data;
