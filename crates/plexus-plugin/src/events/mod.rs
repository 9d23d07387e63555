//! Event system: publish/subscribe between plugins.

pub mod bus;
pub mod context;
pub mod subscription;

pub use bus::EventBus;
pub use context::{ContextData, EventContext};
pub use subscription::{
    EventHandler, Priority, Subscription, SubscriptionDefinition, SubscriptionSpec,
};
