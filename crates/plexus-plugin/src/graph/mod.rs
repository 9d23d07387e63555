//! Dependency graph: plugin nodes and typed dependency edges.
//!
//! The graph is a plain data structure. Ordering, cycle detection and
//! conflict validation live in [`crate::resolver`]; state transitions are
//! driven by [`crate::lifecycle`].

pub mod edge;
pub mod node;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Utc;

use plexus_core::types::PluginState;

use crate::error::{PluginError, PluginResult};

pub use edge::{DependencyEdge, DependencyKind};
pub use node::PluginNode;

/// Typed graph of plugin nodes and dependency edges.
///
/// Edges may point at ids that are not (yet) registered; that is how a
/// missing dependency is represented.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    /// Plugin id → node.
    nodes: HashMap<String, PluginNode>,
    /// Dependent → dependency → kind. At most one kind per ordered pair.
    edges: BTreeMap<String, BTreeMap<String, DependencyKind>>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plugin node in the `REGISTERED` state.
    pub fn add_plugin(&mut self, id: &str) -> PluginResult<()> {
        validate_id(id)?;
        if self.nodes.contains_key(id) {
            return Err(PluginError::PluginAlreadyRegistered {
                plugin: id.to_string(),
            });
        }
        self.nodes.insert(id.to_string(), PluginNode::new(id));
        Ok(())
    }

    /// Removes a plugin node and the edges it declared.
    ///
    /// Edges other plugins declared towards it are kept so that those
    /// plugins now report it as missing.
    pub fn remove_plugin(&mut self, id: &str) -> Option<PluginNode> {
        let node = self.nodes.remove(id)?;
        self.edges.remove(id);
        Some(node)
    }

    /// Records a dependency edge, overwriting any previous kind for the
    /// same ordered pair. Returns the previous kind.
    pub fn add_dependency(
        &mut self,
        from: &str,
        to: &str,
        kind: DependencyKind,
    ) -> PluginResult<Option<DependencyKind>> {
        validate_id(from)?;
        validate_id(to)?;
        if from == to {
            return Err(PluginError::validation(format!(
                "plugin '{from}' cannot depend on itself"
            )));
        }
        Ok(self
            .edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string(), kind))
    }

    /// Removes the edge `from → to`, returning its kind.
    pub fn remove_dependency(&mut self, from: &str, to: &str) -> Option<DependencyKind> {
        let targets = self.edges.get_mut(from)?;
        let kind = targets.remove(to);
        if targets.is_empty() {
            self.edges.remove(from);
        }
        kind
    }

    /// Whether a node with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Returns the node for an id.
    pub fn node(&self, id: &str) -> Option<&PluginNode> {
        self.nodes.get(id)
    }

    /// Returns the state of a plugin, `UNREGISTERED` if it has no node.
    pub fn state(&self, id: &str) -> PluginState {
        self.nodes
            .get(id)
            .map(|node| node.state)
            .unwrap_or(PluginState::Unregistered)
    }

    /// Sets a node's state and returns the previous one.
    pub(crate) fn set_state(&mut self, id: &str, state: PluginState) -> Option<PluginState> {
        let node = self.nodes.get_mut(id)?;
        let previous = node.state;
        node.state = state;
        node.state_changed_at = Utc::now();
        Some(previous)
    }

    /// All registered plugin ids, sorted.
    pub fn plugin_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.nodes.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no plugin is registered.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Kind of the edge `from → to`, if any.
    pub fn edge_kind(&self, from: &str, to: &str) -> Option<DependencyKind> {
        self.edges.get(from).and_then(|targets| targets.get(to)).copied()
    }

    /// Edges declared by `id`, sorted by target id.
    pub fn dependencies_of(&self, id: &str) -> Vec<DependencyEdge> {
        self.edges
            .get(id)
            .map(|targets| {
                targets
                    .iter()
                    .map(|(to, kind)| DependencyEdge::new(id, to.as_str(), *kind))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Dependency ids of `id` with the given kind, sorted.
    pub fn dependencies_of_kind(&self, id: &str, kind: DependencyKind) -> Vec<String> {
        self.edges
            .get(id)
            .map(|targets| {
                targets
                    .iter()
                    .filter(|(_, k)| **k == kind)
                    .map(|(to, _)| to.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Non-conflict edges pointing at `id`, sorted by dependent id.
    pub fn dependents_of(&self, id: &str) -> Vec<DependencyEdge> {
        self.edges
            .iter()
            .filter_map(|(from, targets)| {
                targets
                    .get(id)
                    .filter(|kind| kind.is_dependency())
                    .map(|kind| DependencyEdge::new(from.as_str(), id, *kind))
            })
            .collect()
    }

    /// Ids connected to `id` by a `CONFLICTS` edge in either direction,
    /// registered or not.
    pub fn conflicts_of(&self, id: &str) -> BTreeSet<String> {
        let mut conflicts: BTreeSet<String> = self
            .dependencies_of_kind(id, DependencyKind::Conflicts)
            .into_iter()
            .collect();
        for (from, targets) in &self.edges {
            if targets.get(id) == Some(&DependencyKind::Conflicts) {
                conflicts.insert(from.clone());
            }
        }
        conflicts
    }

    /// Whether `consumer` declares a `REQUIRED`, `OPTIONAL` or `ENHANCES`
    /// edge to `provider`.
    pub fn depends_on(&self, consumer: &str, provider: &str) -> bool {
        self.edge_kind(consumer, provider)
            .is_some_and(|kind| kind.is_dependency())
    }

    /// All edges, sorted by `(from, to)`.
    pub fn edges(&self) -> Vec<DependencyEdge> {
        self.edges
            .keys()
            .flat_map(|from| self.dependencies_of(from))
            .collect()
    }
}

fn validate_id(id: &str) -> PluginResult<()> {
    if id.trim().is_empty() {
        return Err(PluginError::validation("plugin id must not be empty"));
    }
    Ok(())
}
