//! # plexus-plugin
//!
//! Plugin runtime core for Plexus. Provides:
//!
//! - Dependency graph with typed edges (required, optional, enhances, conflicts)
//! - Resolver computing deterministic load order, cycles, missing and conflicting plugins
//! - Lifecycle manager with cascading failure and reverse-order cleanup
//! - Priority event bus with cancellation and per-event results
//! - Scoped service registry with sync calls and timed async calls
//!
//! Everything hangs off one [`Runtime`]; its components share a single lock
//! that is never held while plugin code runs.

pub mod context;
pub mod error;
pub mod events;
pub mod graph;
pub mod lifecycle;
pub mod macros;
pub mod prelude;
pub mod registration;
pub mod resolver;
pub mod runtime;
pub mod services;
pub mod traits;

mod shared;

#[doc(hidden)]
pub use serde_json;

pub use context::PluginContext;
pub use error::{PluginError, PluginResult};
pub use events::{ContextData, EventBus, EventContext, Priority, SubscriptionSpec};
pub use graph::{DependencyGraph, DependencyKind};
pub use lifecycle::{LifecycleManager, LifecycleReport};
pub use registration::{PluginDescriptor, PluginRegistration};
pub use resolver::Resolver;
pub use runtime::Runtime;
pub use services::{ServiceHandler, ServiceRegistry, ServiceScope};
