//! Lifecycle manager: drives plugins through their state machine.
//!
//! `initialize_all` walks the resolver's load order and brings each plugin
//! up once its `REQUIRED` dependencies are `INITIALIZED`. A plugin whose
//! required dependency is missing or failed goes straight to `FAILED`
//! without its initializer running, which cascades to its own dependents.
//!
//! `cleanup_all` walks the accumulated initialization sequence in reverse,
//! so a plugin's dependencies are still up while it cleans up.
//!
//! Sweeps never overlap. A sweep requested while another is running,
//! including one started from inside an initializer or cleanup, is refused
//! instead of waiting on the running one.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use plexus_core::config::lifecycle::LifecycleConfig;
use plexus_core::events::{LifecycleEvent, RUNTIME_SOURCE};
use plexus_core::types::PluginState;

use crate::context::PluginContext;
use crate::error::{PluginError, PluginResult, panic_message};
use crate::events::{ContextData, EventBus};
use crate::graph::DependencyKind;
use crate::resolver::Resolver;
use crate::services::ServiceRegistry;
use crate::shared::SharedHandle;
use crate::traits::Initializable;

use super::report::LifecycleReport;

/// What to do with one plugin during `initialize_all`.
enum InitPlan {
    /// Already up; nothing to report.
    AlreadyInitialized,
    /// Leave the state alone and report the plugin as skipped.
    Skip(String),
    /// A required dependency is unusable; fail without running.
    Block(String),
    /// Run the initializer.
    Ready {
        initializer: Option<std::sync::Arc<dyn Initializable>>,
        degraded: Vec<LifecycleEvent>,
    },
}

/// Drives plugin state transitions. Sweeps never overlap.
pub struct LifecycleManager {
    shared: SharedHandle,
    bus: EventBus,
    services: ServiceRegistry,
    config: LifecycleConfig,
    /// Held for the whole of a sweep, across plugin code.
    sweep: tokio::sync::Mutex<()>,
    /// Plugins in the order they reached `INITIALIZED`.
    sequence: Mutex<Vec<String>>,
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LifecycleManager {
    pub(crate) fn new(
        shared: SharedHandle,
        bus: EventBus,
        services: ServiceRegistry,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            shared,
            bus,
            services,
            config,
            sweep: tokio::sync::Mutex::new(()),
            sequence: Mutex::new(Vec::new()),
        }
    }

    /// Brings up `ids` and every registered plugin they transitively
    /// depend on, in load order.
    ///
    /// Circular or conflicting dependencies abort the sweep before any
    /// plugin runs. Per-plugin failures are isolated and reported.
    ///
    /// Fails with [`PluginError::Validation`] if another sweep is running,
    /// which includes a call made from a plugin's own initializer.
    pub async fn initialize_all<S: AsRef<str>>(&self, ids: &[S]) -> PluginResult<LifecycleReport> {
        let Ok(_sweep) = self.sweep.try_lock() else {
            warn!("Initialization requested while a sweep is running");
            return Err(PluginError::validation(
                "initialize_all cannot run while another initialize or cleanup sweep is running",
            ));
        };

        let (order, unregistered) = {
            let state = self.shared.lock();
            let resolver = Resolver::new(&state.graph, &state.resolver);
            resolver
                .resolve_dependencies(ids)
                .and_then(|_| resolver.get_load_order(ids))
                .map(|order| {
                    let mut unregistered: Vec<String> = Vec::new();
                    for id in ids.iter().map(|id| id.as_ref()) {
                        if !state.graph.contains(id) && !unregistered.iter().any(|u| u == id) {
                            unregistered.push(id.to_string());
                        }
                    }
                    (order, unregistered)
                })
                .inspect_err(|e| error!(error = %e, "Dependency resolution failed"))?
        };

        info!(order = ?order, "Initializing plugins");

        let mut report = LifecycleReport::default();
        for id in &unregistered {
            warn!(plugin_id = %id, "Requested plugin is not registered");
            report.skip(id, "plugin not registered");
        }

        for id in &order {
            match self.plan_initialization(id) {
                InitPlan::AlreadyInitialized => {
                    debug!(plugin_id = %id, "Plugin already initialized");
                }
                InitPlan::Skip(reason) => {
                    debug!(plugin_id = %id, reason = %reason, "Skipping plugin");
                    report.skip(id, reason);
                }
                InitPlan::Block(reason) => {
                    warn!(plugin_id = %id, reason = %reason, "Plugin cannot initialize");
                    self.transition(id, PluginState::Failed);
                    self.emit(LifecycleEvent::InitializationFailed {
                        plugin: id.clone(),
                        reason: reason.clone(),
                    });
                    report.skip(id, reason);
                }
                InitPlan::Ready {
                    initializer,
                    degraded,
                } => {
                    if !self.transition(id, PluginState::Initializing) {
                        report.skip(id, "plugin state changed during initialization");
                        continue;
                    }
                    for event in degraded {
                        if let LifecycleEvent::CapabilityDegraded { dependency, reason, .. } =
                            &event
                        {
                            warn!(
                                plugin_id = %id,
                                dependency = %dependency,
                                reason = %reason,
                                "Initializing with degraded capability"
                            );
                        }
                        self.emit(event);
                    }

                    match self.run_initializer(id, initializer).await {
                        Ok(()) => {
                            self.transition(id, PluginState::Initialized);
                            self.sequence.lock().push(id.clone());
                            info!(plugin_id = %id, "Plugin initialized");
                            self.emit(LifecycleEvent::Initialized { plugin: id.clone() });
                            report.succeed(id);
                        }
                        Err(cause) => {
                            error!(plugin_id = %id, error = %cause, "Plugin initialization failed");
                            self.transition(id, PluginState::Failed);
                            self.emit(LifecycleEvent::InitializationFailed {
                                plugin: id.clone(),
                                reason: cause.clone(),
                            });
                            report.fail(
                                id,
                                PluginError::PluginInitialization {
                                    plugin: id.clone(),
                                    cause,
                                },
                            );
                        }
                    }
                }
            }
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "Initialization finished"
        );
        Ok(report)
    }

    /// Cleans up every plugin this manager initialized, most recent first.
    ///
    /// Failures are collected; every initialized plugin gets an attempt.
    /// Plugins already cleaned up are ignored, so a second call is a no-op.
    /// A call made while another sweep is running does nothing and returns
    /// an empty report.
    pub async fn cleanup_all(&self) -> LifecycleReport {
        let mut report = LifecycleReport::default();
        let Ok(_sweep) = self.sweep.try_lock() else {
            warn!("Cleanup requested while a sweep is running, ignoring");
            return report;
        };
        let sequence: Vec<String> = self.sequence.lock().iter().rev().cloned().collect();

        info!(order = ?sequence, "Cleaning up plugins");

        for id in &sequence {
            let (current, cleanup) = {
                let state = self.shared.lock();
                let cleanup = state.plugins.get(id).and_then(|caps| caps.cleanup.clone());
                (state.graph.state(id), cleanup)
            };

            match current {
                PluginState::Initialized => {}
                PluginState::CleanedUp | PluginState::Failed | PluginState::Unregistered => {
                    continue;
                }
                other => {
                    report.skip(id, format!("plugin is {other}"));
                    continue;
                }
            }

            self.transition(id, PluginState::CleanupStarted);
            let ctx = self.context_for(id);
            let outcome = match cleanup {
                Some(cleanup) => AssertUnwindSafe(cleanup.cleanup(&ctx)).catch_unwind().await,
                None => Ok(Ok(())),
            };

            match flatten_outcome(outcome) {
                Ok(()) => {
                    self.transition(id, PluginState::CleanedUp);
                    info!(plugin_id = %id, "Plugin cleaned up");
                    self.emit(LifecycleEvent::CleanedUp { plugin: id.clone() });
                    report.succeed(id);
                }
                Err(cause) => {
                    error!(plugin_id = %id, error = %cause, "Plugin cleanup failed");
                    self.transition(id, PluginState::Failed);
                    self.emit(LifecycleEvent::CleanupFailed {
                        plugin: id.clone(),
                        reason: cause.clone(),
                    });
                    report.fail(
                        id,
                        PluginError::PluginCleanup {
                            plugin: id.clone(),
                            cause,
                        },
                    );
                }
            }
        }

        {
            let state = self.shared.lock();
            self.sequence
                .lock()
                .retain(|id| state.graph.state(id) == PluginState::Initialized);
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "Cleanup finished"
        );
        report
    }

    /// Plugins currently initialized, in the order they came up.
    pub fn initialized_order(&self) -> Vec<String> {
        self.sequence.lock().clone()
    }

    /// A context acting as `plugin_id`.
    pub fn context_for(&self, plugin_id: &str) -> PluginContext {
        PluginContext::new(plugin_id, self.bus.clone(), self.services.clone())
    }

    fn plan_initialization(&self, id: &str) -> InitPlan {
        let state = self.shared.lock();
        match state.graph.state(id) {
            PluginState::Registered => {}
            PluginState::Initialized => return InitPlan::AlreadyInitialized,
            PluginState::Failed => return InitPlan::Skip("plugin previously failed".into()),
            PluginState::CleanupStarted | PluginState::CleanedUp => {
                return InitPlan::Skip("plugin was cleaned up".into());
            }
            PluginState::Initializing => {
                return InitPlan::Skip("initialization already in progress".into());
            }
            PluginState::Unregistered => return InitPlan::Skip("plugin not registered".into()),
        }

        let resolver = Resolver::new(&state.graph, &state.resolver);
        if let Err(PluginError::MissingDependency { missing, .. }) =
            resolver.require_dependencies(id)
        {
            return InitPlan::Block(format!("missing required dependency {}", missing.join(", ")));
        }

        let mut failed = Vec::new();
        let mut not_ready = Vec::new();
        for dep in state.graph.dependencies_of_kind(id, DependencyKind::Required) {
            match state.graph.state(&dep) {
                PluginState::Initialized => {}
                PluginState::Failed => failed.push(dep),
                other => not_ready.push(format!("{dep} ({other})")),
            }
        }
        if !failed.is_empty() {
            return InitPlan::Block(format!("required dependency {} failed", failed.join(", ")));
        }
        if !not_ready.is_empty() {
            return InitPlan::Block(format!(
                "required dependency {} is not initialized",
                not_ready.join(", ")
            ));
        }

        let degraded = state
            .graph
            .dependencies_of(id)
            .into_iter()
            .filter(|edge| match edge.kind {
                DependencyKind::Optional => true,
                DependencyKind::Enhances => state.resolver.enhances_ordering,
                _ => false,
            })
            .filter_map(|edge| {
                let reason = match state.graph.state(&edge.to) {
                    PluginState::Initialized => return None,
                    PluginState::Unregistered => "missing".to_string(),
                    PluginState::Failed => "failed".to_string(),
                    other => format!("not initialized ({other})"),
                };
                Some(LifecycleEvent::CapabilityDegraded {
                    plugin: id.to_string(),
                    dependency: edge.to,
                    kind: edge.kind.as_str().to_string(),
                    reason,
                })
            })
            .collect();

        let initializer = state
            .plugins
            .get(id)
            .and_then(|caps| caps.initializer.clone());
        InitPlan::Ready {
            initializer,
            degraded,
        }
    }

    async fn run_initializer(
        &self,
        id: &str,
        initializer: Option<std::sync::Arc<dyn Initializable>>,
    ) -> Result<(), String> {
        let Some(initializer) = initializer else {
            return Ok(());
        };
        let ctx = self.context_for(id);
        debug!(plugin_id = %id, "Running initializer");
        flatten_outcome(
            AssertUnwindSafe(initializer.initialize(&ctx))
                .catch_unwind()
                .await,
        )
    }

    /// Applies a checked state transition. `FAILED` and `CLEANED_UP`
    /// plugins lose their services and subscriptions in the same step.
    fn transition(&self, id: &str, to: PluginState) -> bool {
        let from = {
            let mut state = self.shared.lock();
            let from = state.graph.state(id);
            if !from.can_transition_to(to) {
                warn!(plugin_id = %id, from = %from, to = %to, "Rejected state transition");
                return false;
            }
            state.graph.set_state(id, to);
            if matches!(to, PluginState::Failed | PluginState::CleanedUp) {
                let (services, subscriptions) = state.purge_owner(id);
                debug!(
                    plugin_id = %id,
                    services,
                    subscriptions,
                    "Removed plugin services and subscriptions"
                );
            }
            from
        };

        debug!(plugin_id = %id, from = %from, to = %to, "Plugin state changed");
        if self.config.emit_state_events {
            self.emit(LifecycleEvent::StateChanged {
                plugin: id.to_string(),
                from,
                to,
            });
        }
        true
    }

    fn emit(&self, event: LifecycleEvent) {
        self.bus.publish(
            event.topic(),
            event.to_data(),
            ContextData::from_source(RUNTIME_SOURCE),
        );
    }
}

fn flatten_outcome(
    outcome: Result<anyhow::Result<()>, Box<dyn std::any::Any + Send>>,
) -> Result<(), String> {
    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}
