//! Plugin runtime error taxonomy.
//!
//! [`PluginError`] is what every runtime operation returns. It is `Clone`
//! so lifecycle reports can carry it, and it maps into
//! [`plexus_core::AppError`] at the application boundary.

use std::any::Any;

use serde::Serialize;
use thiserror::Error;

use plexus_core::error::{AppError, ErrorKind};
use plexus_core::types::PluginState;

/// Errors produced by the dependency graph, resolver, lifecycle manager,
/// event bus and service registry.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum PluginError {
    /// Caller input was rejected before touching any state.
    #[error("validation failed: {message}")]
    Validation {
        /// What was wrong.
        message: String,
    },

    /// No plugin with this id is registered.
    #[error("plugin '{plugin}' is not registered")]
    PluginNotFound {
        /// Plugin identifier.
        plugin: String,
    },

    /// A plugin with this id is already registered.
    #[error("plugin '{plugin}' is already registered")]
    PluginAlreadyRegistered {
        /// Plugin identifier.
        plugin: String,
    },

    /// A `FAILED` or `CLEANED_UP` plugin tried to add a subscription or
    /// service.
    #[error("plugin '{plugin}' is {state} and cannot register handlers or services")]
    PluginInactive {
        /// Plugin identifier.
        plugin: String,
        /// Plugin's lifecycle state.
        state: PluginState,
    },

    /// The ordering edges of the requested closure contain a loop.
    #[error("circular dependency: {}", format_cycle(.cycle))]
    CircularDependency {
        /// The loop, rotated to start at its smallest id.
        cycle: Vec<String>,
    },

    /// A plugin declares `REQUIRED` dependencies that are not registered.
    #[error("plugin '{plugin}' is missing required dependencies: {}", .missing.join(", "))]
    MissingDependency {
        /// The dependent plugin.
        plugin: String,
        /// Unregistered dependency ids, sorted.
        missing: Vec<String>,
    },

    /// Two plugins in the same closure declare a conflict.
    #[error("plugins '{a}' and '{b}' conflict")]
    ConflictingDependency {
        /// Lexicographically smaller id of the pair.
        a: String,
        /// Lexicographically larger id of the pair.
        b: String,
    },

    /// A plugin's initializer returned an error or panicked.
    #[error("plugin '{plugin}' failed to initialize: {cause}")]
    PluginInitialization {
        /// Plugin identifier.
        plugin: String,
        /// Rendered cause chain.
        cause: String,
    },

    /// A plugin's cleanup routine returned an error or panicked.
    #[error("plugin '{plugin}' failed to clean up: {cause}")]
    PluginCleanup {
        /// Plugin identifier.
        plugin: String,
        /// Rendered cause chain.
        cause: String,
    },

    /// No service with this name is registered by the provider.
    #[error("service '{provider}.{name}' not found")]
    ServiceNotFound {
        /// Providing plugin.
        provider: String,
        /// Service name.
        name: String,
    },

    /// The consumer is not allowed to call the service.
    #[error("plugin '{consumer}' may not call service '{provider}.{name}'")]
    ServiceAccess {
        /// Providing plugin.
        provider: String,
        /// Service name.
        name: String,
        /// Calling plugin.
        consumer: String,
    },

    /// The awaited service did not complete within its timeout.
    #[error("service '{provider}.{name}' timed out")]
    ServiceTimeout {
        /// Providing plugin.
        provider: String,
        /// Service name.
        name: String,
    },

    /// The provider already registered a service with this name.
    #[error("service '{provider}.{name}' is already registered")]
    ServiceAlreadyRegistered {
        /// Providing plugin.
        provider: String,
        /// Service name.
        name: String,
    },

    /// The provider exists but is not in a state that can serve calls.
    #[error("service '{provider}.{name}' is unavailable: provider is {state}")]
    ServiceUnavailable {
        /// Providing plugin.
        provider: String,
        /// Service name.
        name: String,
        /// Provider's lifecycle state.
        state: PluginState,
    },

    /// The service handler returned an error or panicked.
    #[error("service '{provider}.{name}' failed: {message}")]
    ServiceFailed {
        /// Providing plugin.
        provider: String,
        /// Service name.
        name: String,
        /// Rendered handler error.
        message: String,
    },

    /// `call_service` was used on a handler that only runs asynchronously.
    #[error("service '{provider}.{name}' is asynchronous; use await_service")]
    AsyncService {
        /// Providing plugin.
        provider: String,
        /// Service name.
        name: String,
    },
}

/// Result alias used throughout the plugin runtime.
pub type PluginResult<T> = Result<T, PluginError>;

impl PluginError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// The boundary error kind this error maps to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::PluginNotFound { .. } | Self::ServiceNotFound { .. } => ErrorKind::NotFound,
            Self::PluginAlreadyRegistered { .. }
            | Self::ServiceAlreadyRegistered { .. }
            | Self::ConflictingDependency { .. } => ErrorKind::Conflict,
            Self::CircularDependency { .. } | Self::MissingDependency { .. } => {
                ErrorKind::Dependency
            }
            Self::PluginInitialization { .. }
            | Self::PluginCleanup { .. }
            | Self::PluginInactive { .. } => ErrorKind::Plugin,
            Self::ServiceAccess { .. }
            | Self::ServiceUnavailable { .. }
            | Self::ServiceFailed { .. }
            | Self::AsyncService { .. } => ErrorKind::Service,
            Self::ServiceTimeout { .. } => ErrorKind::Timeout,
        }
    }
}

impl From<PluginError> for AppError {
    fn from(err: PluginError) -> Self {
        AppError::new(err.kind(), err.to_string())
    }
}

fn format_cycle(cycle: &[String]) -> String {
    match cycle.first() {
        Some(first) => format!("{} -> {}", cycle.join(" -> "), first),
        None => String::new(),
    }
}

/// Renders a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
