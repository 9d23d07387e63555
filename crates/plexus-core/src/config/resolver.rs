//! Dependency resolution policy.

use serde::{Deserialize, Serialize};

/// Which plugins a closure is checked against for `CONFLICTS` edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictScope {
    /// Only pairs where both plugins are inside the resolved closure.
    #[default]
    Closure,
    /// Closure members against every registered plugin.
    Registered,
}

/// Dependency resolver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// When `true`, `ENHANCES` edges order the enhancer before the enhanced
    /// plugin and pull it into the closure. When `false` they are advisory.
    #[serde(default = "default_true")]
    pub enhances_ordering: bool,
    /// Scope of conflict validation.
    #[serde(default)]
    pub conflict_scope: ConflictScope,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            enhances_ordering: true,
            conflict_scope: ConflictScope::Closure,
        }
    }
}

fn default_true() -> bool {
    true
}
