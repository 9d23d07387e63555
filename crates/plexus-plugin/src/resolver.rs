//! Dependency resolver: load ordering, cycle detection, missing and
//! conflict checks over a [`DependencyGraph`].
//!
//! A dependency always loads before its dependent. `REQUIRED` and
//! `OPTIONAL` edges order their endpoints; `ENHANCES` edges do too unless
//! [`ResolverConfig::enhances_ordering`] is off, in which case they are
//! advisory. `CONFLICTS` edges never order anything and are only checked
//! for violations.
//!
//! The closure of a request is the requested ids plus every registered
//! plugin reachable from them over ordering edges. Unregistered ids are
//! never part of a closure.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};

use tracing::debug;

use plexus_core::config::resolver::{ConflictScope, ResolverConfig};

use crate::error::{PluginError, PluginResult};
use crate::graph::{DependencyGraph, DependencyKind};

/// DFS node colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Read-only resolver over a borrowed graph.
#[derive(Debug)]
pub struct Resolver<'g> {
    graph: &'g DependencyGraph,
    config: &'g ResolverConfig,
}

impl<'g> Resolver<'g> {
    /// Creates a resolver applying `config`'s policies to `graph`.
    pub fn new(graph: &'g DependencyGraph, config: &'g ResolverConfig) -> Self {
        Self { graph, config }
    }

    /// Whether an edge of this kind constrains load order.
    pub fn is_ordering(&self, kind: DependencyKind) -> bool {
        match kind {
            DependencyKind::Required | DependencyKind::Optional => true,
            DependencyKind::Enhances => self.config.enhances_ordering,
            DependencyKind::Conflicts => false,
        }
    }

    /// `REQUIRED` dependencies of `id` that are not registered, sorted.
    pub fn check_missing_dependencies(&self, id: &str) -> Vec<String> {
        self.graph
            .dependencies_of_kind(id, DependencyKind::Required)
            .into_iter()
            .filter(|dep| !self.graph.contains(dep))
            .collect()
    }

    /// Fails with [`PluginError::MissingDependency`] when `id` has
    /// unregistered `REQUIRED` dependencies.
    pub fn require_dependencies(&self, id: &str) -> PluginResult<()> {
        let missing = self.check_missing_dependencies(id);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PluginError::MissingDependency {
                plugin: id.to_string(),
                missing,
            })
        }
    }

    /// Registered plugins connected to `id` by a `CONFLICTS` edge, sorted.
    pub fn check_conflicts(&self, id: &str) -> Vec<String> {
        self.graph
            .conflicts_of(id)
            .into_iter()
            .filter(|other| self.graph.contains(other))
            .collect()
    }

    /// Registered plugins reachable from `ids` over ordering edges,
    /// including the registered requested ids themselves.
    pub fn closure<S: AsRef<str>>(&self, ids: &[S]) -> BTreeSet<String> {
        let mut closure = BTreeSet::new();
        let mut stack: Vec<String> = ids
            .iter()
            .map(|id| id.as_ref().to_string())
            .filter(|id| self.graph.contains(id))
            .collect();

        while let Some(id) = stack.pop() {
            if !closure.insert(id.clone()) {
                continue;
            }
            for edge in self.graph.dependencies_of(&id) {
                if self.is_ordering(edge.kind)
                    && self.graph.contains(&edge.to)
                    && !closure.contains(&edge.to)
                {
                    stack.push(edge.to);
                }
            }
        }

        closure
    }

    /// Computes the closure of `ids` and validates it for conflicts.
    ///
    /// Returns the closure sorted by id. Fails with
    /// [`PluginError::ConflictingDependency`] on the first conflicting pair,
    /// scanning members in id order.
    pub fn resolve_dependencies<S: AsRef<str>>(&self, ids: &[S]) -> PluginResult<Vec<String>> {
        let closure = self.closure(ids);

        for member in &closure {
            for other in self.graph.conflicts_of(member) {
                let in_scope = match self.config.conflict_scope {
                    ConflictScope::Closure => closure.contains(&other),
                    ConflictScope::Registered => self.graph.contains(&other),
                };
                if in_scope {
                    let (a, b) = if *member <= other {
                        (member.clone(), other)
                    } else {
                        (other, member.clone())
                    };
                    debug!(a = %a, b = %b, "Conflict found in dependency closure");
                    return Err(PluginError::ConflictingDependency { a, b });
                }
            }
        }

        Ok(closure.into_iter().collect())
    }

    /// Returns the closure of `ids` in load order: every dependency before
    /// its dependents, ties broken by ascending id.
    ///
    /// Fails with [`PluginError::CircularDependency`] if the ordering edges
    /// of the closure contain a loop.
    pub fn get_load_order<S: AsRef<str>>(&self, ids: &[S]) -> PluginResult<Vec<String>> {
        let closure = self.closure(ids);
        let adjacency = self.adjacency(&closure);

        if let Some(cycle) = find_cycle(&adjacency) {
            return Err(PluginError::CircularDependency { cycle });
        }

        // Kahn's algorithm with a min-heap on id.
        let mut remaining: HashMap<&str, usize> = adjacency
            .iter()
            .map(|(node, deps)| (*node, deps.len()))
            .collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for (node, deps) in &adjacency {
            for dep in deps {
                dependents.entry(*dep).or_default().push(*node);
            }
        }

        let mut ready: BinaryHeap<Reverse<&str>> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(node, _)| Reverse(*node))
            .collect();

        let mut order = Vec::with_capacity(adjacency.len());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(node.to_string());
            for dependent in dependents.get(node).into_iter().flatten() {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(Reverse(*dependent));
                    }
                }
            }
        }

        if order.len() != adjacency.len() {
            // Unreachable after the cycle check.
            let cycle = adjacency
                .keys()
                .filter(|node| !order.iter().any(|done| done.as_str() == **node))
                .map(|node| node.to_string())
                .collect();
            return Err(PluginError::CircularDependency { cycle });
        }

        debug!(order = ?order, "Computed load order");
        Ok(order)
    }

    /// Node → sorted ordering dependencies, restricted to `nodes`.
    fn adjacency<'a>(&self, nodes: &'a BTreeSet<String>) -> BTreeMap<&'a str, Vec<&'a str>> {
        nodes
            .iter()
            .map(|node| {
                let deps = self
                    .graph
                    .dependencies_of(node)
                    .into_iter()
                    .filter(|edge| self.is_ordering(edge.kind))
                    .filter_map(|edge| nodes.get(&edge.to).map(String::as_str))
                    .collect();
                (node.as_str(), deps)
            })
            .collect()
    }
}

/// Iterative three-color DFS. Returns the first loop found, rotated so it
/// starts at its smallest id.
fn find_cycle(adjacency: &BTreeMap<&str, Vec<&str>>) -> Option<Vec<String>> {
    let mut colors: HashMap<&str, Color> = adjacency.keys().map(|n| (*n, Color::White)).collect();

    for start in adjacency.keys() {
        if colors.get(start) != Some(&Color::White) {
            continue;
        }

        // Each frame is (node, index of the next neighbor to visit).
        let mut stack: Vec<(&str, usize)> = vec![(*start, 0)];
        colors.insert(*start, Color::Gray);

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let neighbors = adjacency.get(node).map(Vec::as_slice).unwrap_or(&[]);

            if frame.1 < neighbors.len() {
                let next = neighbors[frame.1];
                frame.1 += 1;
                match colors.get(next).copied().unwrap_or(Color::Black) {
                    Color::White => {
                        colors.insert(next, Color::Gray);
                        stack.push((next, 0));
                    }
                    Color::Gray => {
                        let position = stack.iter().position(|(n, _)| *n == next)?;
                        let cycle: Vec<String> =
                            stack[position..].iter().map(|(n, _)| n.to_string()).collect();
                        return Some(minimal_rotation(cycle));
                    }
                    Color::Black => {}
                }
            } else {
                colors.insert(node, Color::Black);
                stack.pop();
            }
        }
    }

    None
}

fn minimal_rotation(mut cycle: Vec<String>) -> Vec<String> {
    if let Some(min_index) = cycle
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(index, _)| index)
    {
        cycle.rotate_left(min_index);
    }
    cycle
}
