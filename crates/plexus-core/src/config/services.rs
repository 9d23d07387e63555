//! Service registry configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Service registry configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Timeout in milliseconds applied by `await_service` when the caller
    /// does not pass one. `None` waits indefinitely.
    #[serde(default)]
    pub default_timeout_ms: Option<u64>,
}

impl ServiceConfig {
    /// Returns the default await timeout as a [`Duration`].
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }
}
