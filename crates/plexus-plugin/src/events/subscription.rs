//! Subscriptions: priority-ordered event handlers owned by plugins.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use plexus_core::types::SubscriptionId;

use super::context::EventContext;

/// Dispatch priority. Lower values run first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Value 0.
    Highest,
    /// Value 25.
    High,
    /// Value 50.
    #[default]
    Normal,
    /// Value 75.
    Low,
    /// Value 100.
    Lowest,
}

impl Priority {
    /// Numeric priority value.
    pub fn value(&self) -> u8 {
        match self {
            Self::Highest => 0,
            Self::High => 25,
            Self::Normal => 50,
            Self::Low => 75,
            Self::Lowest => 100,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Trait for event handler implementations.
///
/// Handlers run synchronously inside `publish`. A handler may cancel the
/// context or add a result to it; an `Err` is recorded on the context and
/// dispatch continues with the next handler.
pub trait EventHandler: Send + Sync {
    /// Handles one event.
    fn handle(&self, ctx: &mut EventContext) -> anyhow::Result<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&mut EventContext) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, ctx: &mut EventContext) -> anyhow::Result<()> {
        self(ctx)
    }
}

/// What a subscriber listens to and how it is ordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSpec {
    /// Event type to listen to.
    pub event_type: String,
    /// Dispatch priority.
    #[serde(default)]
    pub priority: Priority,
    /// Run even after an earlier handler canceled the event.
    #[serde(default)]
    pub call_if_canceled: bool,
}

impl SubscriptionSpec {
    /// Subscription to `event_type` at normal priority.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            priority: Priority::Normal,
            call_if_canceled: false,
        }
    }

    /// Sets the priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets whether the handler runs for canceled events.
    pub fn call_if_canceled(mut self, call: bool) -> Self {
        self.call_if_canceled = call;
        self
    }
}

/// A subscription spec paired with its handler, before an owner is bound.
#[derive(Clone)]
pub struct SubscriptionDefinition {
    /// What to listen to.
    pub spec: SubscriptionSpec,
    /// The handler.
    pub handler: Arc<dyn EventHandler>,
}

impl SubscriptionDefinition {
    /// Creates a definition from a closure.
    pub fn new<F>(spec: SubscriptionSpec, handler: F) -> Self
    where
        F: Fn(&mut EventContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            spec,
            handler: Arc::new(handler),
        }
    }
}

impl fmt::Debug for SubscriptionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionDefinition")
            .field("spec", &self.spec)
            .field("handler", &"<handler>")
            .finish()
    }
}

/// A live subscription in the table.
#[derive(Clone)]
pub struct Subscription {
    /// Handle used to unsubscribe.
    pub id: SubscriptionId,
    /// Owning plugin.
    pub owner: String,
    /// What it listens to.
    pub spec: SubscriptionSpec,
    /// Insertion counter; breaks priority ties.
    pub(crate) sequence: u64,
    /// The handler.
    pub(crate) handler: Arc<dyn EventHandler>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("spec", &self.spec)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Event type → subscriptions sorted by `(priority, sequence)`.
#[derive(Default)]
pub(crate) struct SubscriptionTable {
    by_type: HashMap<String, Vec<Subscription>>,
    next_sequence: u64,
}

impl SubscriptionTable {
    pub(crate) fn insert(&mut self, owner: &str, definition: SubscriptionDefinition) -> SubscriptionId {
        let id = SubscriptionId::new();
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let entries = self
            .by_type
            .entry(definition.spec.event_type.clone())
            .or_default();
        entries.push(Subscription {
            id,
            owner: owner.to_string(),
            spec: definition.spec,
            sequence,
            handler: definition.handler,
        });
        entries.sort_by_key(|s| (s.spec.priority, s.sequence));

        id
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> Option<Subscription> {
        let mut removed = None;
        for entries in self.by_type.values_mut() {
            if let Some(index) = entries.iter().position(|s| s.id == id) {
                removed = Some(entries.remove(index));
                break;
            }
        }
        self.by_type.retain(|_, entries| !entries.is_empty());
        removed
    }

    pub(crate) fn remove_owner(&mut self, owner: &str) -> usize {
        let mut removed = 0;
        for entries in self.by_type.values_mut() {
            let before = entries.len();
            entries.retain(|s| s.owner != owner);
            removed += before - entries.len();
        }
        self.by_type.retain(|_, entries| !entries.is_empty());
        removed
    }

    /// Copy of the current subscribers for `event_type`, in dispatch order.
    pub(crate) fn snapshot(&self, event_type: &str) -> Vec<Subscription> {
        self.by_type.get(event_type).cloned().unwrap_or_default()
    }

    pub(crate) fn count(&self, event_type: &str) -> usize {
        self.by_type.get(event_type).map(Vec::len).unwrap_or(0)
    }

    pub(crate) fn owned_by(&self, owner: &str) -> Vec<Subscription> {
        let mut owned: Vec<Subscription> = self
            .by_type
            .values()
            .flatten()
            .filter(|s| s.owner == owner)
            .cloned()
            .collect();
        owned.sort_by_key(|s| s.sequence);
        owned
    }

    pub(crate) fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.by_type.keys().cloned().collect();
        types.sort();
        types
    }
}
