//! Dependency edges.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of relation between a dependent and its dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DependencyKind {
    /// The dependent cannot run without the dependency.
    Required,
    /// The dependent runs degraded without the dependency.
    Optional,
    /// The dependency adds capabilities to the dependent.
    Enhances,
    /// The two plugins must not run together. Symmetric.
    Conflicts,
}

impl DependencyKind {
    /// Returns the string name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "REQUIRED",
            Self::Optional => "OPTIONAL",
            Self::Enhances => "ENHANCES",
            Self::Conflicts => "CONFLICTS",
        }
    }

    /// Whether the edge links a dependent to something it uses, as opposed
    /// to a conflict declaration.
    pub fn is_dependency(&self) -> bool {
        !matches!(self, Self::Conflicts)
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed edge `from → to`; `from` is the dependent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// The dependent plugin.
    pub from: String,
    /// The dependency.
    pub to: String,
    /// Relation kind.
    pub kind: DependencyKind,
}

impl DependencyEdge {
    /// Creates a new edge.
    pub fn new(from: impl Into<String>, to: impl Into<String>, kind: DependencyKind) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind,
        }
    }
}
