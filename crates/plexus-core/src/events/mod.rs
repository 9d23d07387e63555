//! Structured events emitted by the plugin runtime.
//!
//! The runtime performs no console or file output of its own. Every
//! lifecycle transition and error is described by a [`LifecycleEvent`] and
//! published on the event bus under its [`topic`](LifecycleEvent::topic),
//! where external loggers and CLIs subscribe to it.

pub mod lifecycle;

pub use lifecycle::LifecycleEvent;

/// Source id used for events the runtime publishes on its own behalf.
pub const RUNTIME_SOURCE: &str = "runtime";

/// Stable event type names for runtime-published events.
pub mod topics {
    /// A plugin moved between two lifecycle states.
    pub const STATE_CHANGED: &str = "plugin.state_changed";
    /// A plugin finished initializing.
    pub const INITIALIZED: &str = "plugin.initialized";
    /// A plugin failed to initialize or was skipped because of a dependency.
    pub const INITIALIZATION_FAILED: &str = "plugin.initialization_failed";
    /// A plugin initialized without one of its optional capabilities.
    pub const CAPABILITY_DEGRADED: &str = "capability.degraded";
    /// A plugin finished cleaning up.
    pub const CLEANED_UP: &str = "plugin.cleaned_up";
    /// A plugin's cleanup routine failed.
    pub const CLEANUP_FAILED: &str = "plugin.cleanup_failed";
}
