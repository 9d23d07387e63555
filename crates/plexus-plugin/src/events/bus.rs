//! Event bus: priority-ordered publish/subscribe.
//!
//! Dispatch semantics:
//! - Subscribers run in ascending priority value, ties in subscription order.
//! - The subscriber list is snapshotted when `publish` starts; subscribing or
//!   unsubscribing from inside a handler affects the next publish only.
//! - After a handler cancels the context, later handlers run only if they
//!   subscribed with `call_if_canceled`.
//! - A handler that fails or panics is logged and recorded on the context;
//!   dispatch continues.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use plexus_core::types::SubscriptionId;

use crate::error::{PluginResult, panic_message};
use crate::shared::SharedHandle;

use super::context::{ContextData, EventContext};
use super::subscription::{EventHandler, Subscription, SubscriptionDefinition, SubscriptionSpec};

/// Handle to the runtime's subscription table. Cheap to clone.
#[derive(Clone)]
pub struct EventBus {
    shared: SharedHandle,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

impl EventBus {
    pub(crate) fn new(shared: SharedHandle) -> Self {
        Self { shared }
    }

    /// Subscribes a closure on behalf of `owner`.
    ///
    /// Fails with [`PluginError::PluginInactive`](crate::PluginError::PluginInactive) once
    /// the owner is `FAILED` or `CLEANED_UP`.
    pub fn subscribe<F>(
        &self,
        owner: &str,
        spec: SubscriptionSpec,
        handler: F,
    ) -> PluginResult<SubscriptionId>
    where
        F: Fn(&mut EventContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe_definition(owner, SubscriptionDefinition::new(spec, handler))
    }

    /// Subscribes a shared handler object on behalf of `owner`.
    pub fn subscribe_handler(
        &self,
        owner: &str,
        spec: SubscriptionSpec,
        handler: Arc<dyn EventHandler>,
    ) -> PluginResult<SubscriptionId> {
        self.subscribe_definition(owner, SubscriptionDefinition { spec, handler })
    }

    pub(crate) fn subscribe_definition(
        &self,
        owner: &str,
        definition: SubscriptionDefinition,
    ) -> PluginResult<SubscriptionId> {
        let event_type = definition.spec.event_type.clone();
        let priority = definition.spec.priority;
        let id = {
            let mut state = self.shared.lock();
            state.ensure_owner_active(owner)?;
            state.subscriptions.insert(owner, definition)
        };

        debug!(
            plugin_id = %owner,
            event_type = %event_type,
            priority = %priority,
            subscription_id = %id,
            "Subscribed"
        );
        Ok(id)
    }

    /// Removes one subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.shared.lock().subscriptions.remove(id);
        match &removed {
            Some(sub) => debug!(
                plugin_id = %sub.owner,
                event_type = %sub.spec.event_type,
                subscription_id = %id,
                "Unsubscribed"
            ),
            None => debug!(subscription_id = %id, "Unsubscribe of unknown subscription"),
        }
        removed.is_some()
    }

    /// Removes every subscription owned by `owner`. Returns how many.
    pub fn unsubscribe_all(&self, owner: &str) -> usize {
        let removed = self.shared.lock().subscriptions.remove_owner(owner);
        if removed > 0 {
            debug!(plugin_id = %owner, count = removed, "Removed all subscriptions");
        }
        removed
    }

    /// Publishes an event and returns the context after every eligible
    /// handler has run.
    pub fn publish(
        &self,
        event_type: &str,
        data: Map<String, Value>,
        context_data: ContextData,
    ) -> EventContext {
        let mut ctx = EventContext::new(event_type, data, context_data);
        let snapshot = self.shared.lock().subscriptions.snapshot(event_type);

        if snapshot.is_empty() {
            return ctx;
        }

        debug!(
            event_type = %event_type,
            source = %ctx.source,
            handler_count = snapshot.len(),
            "Dispatching event"
        );

        for sub in &snapshot {
            if ctx.is_canceled() && !sub.spec.call_if_canceled {
                debug!(
                    event_type = %event_type,
                    plugin_id = %sub.owner,
                    "Skipping handler for canceled event"
                );
                continue;
            }
            dispatch_one(sub, &mut ctx);
        }

        ctx
    }

    /// Number of subscribers for an event type.
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.shared.lock().subscriptions.count(event_type)
    }

    /// Subscriptions owned by a plugin, in subscription order.
    pub fn subscriptions_of(&self, owner: &str) -> Vec<Subscription> {
        self.shared.lock().subscriptions.owned_by(owner)
    }

    /// Event types with at least one subscriber, sorted.
    pub fn event_types(&self) -> Vec<String> {
        self.shared.lock().subscriptions.event_types()
    }
}

fn dispatch_one(sub: &Subscription, ctx: &mut EventContext) {
    let was_canceled = ctx.is_canceled();
    let outcome = catch_unwind(AssertUnwindSafe(|| sub.handler.handle(ctx)));

    let message = match outcome {
        Ok(Ok(())) => {
            if !was_canceled && ctx.is_canceled() {
                debug!(
                    event_type = %ctx.event_type,
                    plugin_id = %sub.owner,
                    "Handler canceled event"
                );
            }
            return;
        }
        Ok(Err(e)) => format!("{e:#}"),
        Err(payload) => panic_message(payload.as_ref()),
    };

    warn!(
        event_type = %ctx.event_type,
        plugin_id = %sub.owner,
        error = %message,
        "Event handler failed"
    );
    ctx.record_error(&sub.owner, message);
}
