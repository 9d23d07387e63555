//! Integration tests for initialization and cleanup sweeps.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use plexus_core::events::topics;
use plexus_core::types::PluginState;
use plexus_plugin::prelude::*;

use crate::helpers;

#[tokio::test]
async fn test_missing_required_dependency_skips_plugin() {
    let runtime = helpers::runtime();
    let log = helpers::call_log();
    let failures = helpers::capture(&runtime, topics::INITIALIZATION_FAILED);
    runtime
        .register(helpers::recording_plugin("B", &log).requires("A"))
        .unwrap();

    assert_eq!(runtime.check_missing_dependencies("B"), vec!["A"]);
    let report = runtime.initialize_all(&["B"]).await.unwrap();

    assert!(report.succeeded.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].plugin, "B");
    assert_eq!(report.skipped[0].reason, "missing required dependency A");
    assert!(helpers::entries(&log).is_empty());
    assert_eq!(runtime.state("B"), PluginState::Failed);
    assert_eq!(helpers::events_for(&failures, "B").len(), 1);
}

#[tokio::test]
async fn test_failed_dependency_cascades_without_running_dependent() {
    let runtime = helpers::runtime();
    let log = helpers::call_log();
    runtime.register(helpers::failing_plugin("A", &log)).unwrap();
    runtime
        .register(helpers::recording_plugin("B", &log).requires("A"))
        .unwrap();
    runtime
        .register(helpers::recording_plugin("C", &log).requires("B"))
        .unwrap();

    let report = runtime.initialize_all(&["A", "B", "C"]).await.unwrap();

    assert_eq!(report.failed_plugins(), vec!["A"]);
    assert!(matches!(
        &report.failed[0].error,
        PluginError::PluginInitialization { plugin, cause }
            if plugin == "A" && cause.contains("database unreachable")
    ));
    assert_eq!(report.skip_reason("B"), Some("required dependency A failed"));
    assert_eq!(report.skip_reason("C"), Some("required dependency B failed"));
    assert_eq!(helpers::entries(&log), vec!["init:A"]);
    for id in ["A", "B", "C"] {
        assert_eq!(runtime.state(id), PluginState::Failed);
    }
}

#[tokio::test]
async fn test_optional_dependency_failure_degrades_dependent() {
    let runtime = helpers::runtime();
    let log = helpers::call_log();
    let degraded = helpers::capture(&runtime, topics::CAPABILITY_DEGRADED);
    runtime.register(helpers::failing_plugin("A", &log)).unwrap();
    runtime
        .register(helpers::recording_plugin("B", &log).optional("A"))
        .unwrap();

    let report = runtime.initialize_all(&["B"]).await.unwrap();

    assert_eq!(report.succeeded, vec!["B"]);
    assert_eq!(report.failed_plugins(), vec!["A"]);
    let events = helpers::events_for(&degraded, "B");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["dependency"], "A");
    assert_eq!(events[0]["kind"], "OPTIONAL");
    assert_eq!(events[0]["reason"], "failed");
}

struct Exploding;

#[async_trait]
impl Initializable for Exploding {
    async fn initialize(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
        panic!("initializer exploded")
    }
}

#[tokio::test]
async fn test_panicking_initializer_is_isolated() {
    let runtime = helpers::runtime();
    let log = helpers::call_log();
    runtime
        .register(PluginRegistration::new("boom").with_initializer(Arc::new(Exploding)))
        .unwrap();
    runtime.register(helpers::recording_plugin("ok", &log)).unwrap();

    let report = runtime.initialize_all(&["boom", "ok"]).await.unwrap();

    assert_eq!(report.succeeded, vec!["ok"]);
    let PluginError::PluginInitialization { cause, .. } = &report.failed[0].error else {
        panic!("unexpected error {:?}", report.failed[0].error);
    };
    assert_eq!(cause, "panicked: initializer exploded");
}

#[tokio::test]
async fn test_cleanup_runs_in_reverse_initialization_order() {
    let runtime = helpers::runtime();
    let log = helpers::call_log();
    runtime.register(helpers::recording_plugin("db", &log)).unwrap();
    runtime
        .register(helpers::recording_plugin("cache", &log).requires("db"))
        .unwrap();
    runtime
        .register(helpers::recording_plugin("api", &log).requires("cache"))
        .unwrap();

    let report = runtime.initialize_all(&["api"]).await.unwrap();
    assert_eq!(report.succeeded, vec!["db", "cache", "api"]);

    let report = runtime.cleanup_all().await;
    assert_eq!(report.succeeded, vec!["api", "cache", "db"]);
    assert_eq!(
        helpers::entries(&log),
        vec![
            "init:db",
            "init:cache",
            "init:api",
            "cleanup:api",
            "cleanup:cache",
            "cleanup:db"
        ]
    );
    for id in ["db", "cache", "api"] {
        assert_eq!(runtime.state(id), PluginState::CleanedUp);
    }
}

#[tokio::test]
async fn test_cleanup_twice_is_a_no_op() {
    let runtime = helpers::runtime();
    let log = helpers::call_log();
    runtime.register(helpers::recording_plugin("a", &log)).unwrap();
    runtime.initialize_all(&["a"]).await.unwrap();

    let first = runtime.cleanup_all().await;
    assert_eq!(first.succeeded, vec!["a"]);

    let second = runtime.cleanup_all().await;
    assert!(second.succeeded.is_empty());
    assert!(second.failed.is_empty());
    assert_eq!(helpers::entries(&log), vec!["init:a", "cleanup:a"]);
}

#[tokio::test]
async fn test_dependencies_stay_up_during_dependent_cleanup() {
    let runtime = helpers::runtime();
    let observed = helpers::call_log();
    let sink = Arc::clone(&observed);
    let probe = runtime.clone();

    runtime.register(PluginRegistration::new("db")).unwrap();
    runtime
        .register(
            PluginRegistration::new("api")
                .requires("db")
                .on_cleanup(move |_ctx| {
                    sink.lock().push(probe.state("db").to_string());
                    async { anyhow::Ok(()) }
                }),
        )
        .unwrap();

    runtime.initialize_all(&["api"]).await.unwrap();
    runtime.cleanup_all().await;

    assert_eq!(helpers::entries(&observed), vec!["INITIALIZED"]);
}

#[tokio::test]
async fn test_cleanup_failures_are_collected() {
    let runtime = helpers::runtime();
    let log = helpers::call_log();
    runtime.register(helpers::recording_plugin("a", &log)).unwrap();
    runtime
        .register(
            PluginRegistration::new("b")
                .requires("a")
                .on_cleanup(|_ctx| async { Err::<(), _>(anyhow::anyhow!("flush failed")) }),
        )
        .unwrap();
    let cleanup_failures = helpers::capture(&runtime, topics::CLEANUP_FAILED);

    runtime.initialize_all(&["b"]).await.unwrap();
    let report = runtime.cleanup_all().await;

    assert_eq!(report.failed_plugins(), vec!["b"]);
    assert!(matches!(
        report.failed[0].error,
        PluginError::PluginCleanup { .. }
    ));
    assert_eq!(report.succeeded, vec!["a"]);
    assert_eq!(runtime.state("b"), PluginState::Failed);
    assert_eq!(helpers::events_for(&cleanup_failures, "b").len(), 1);
}

#[tokio::test]
async fn test_resolution_errors_abort_before_any_plugin_runs() {
    let runtime = helpers::runtime();
    let log = helpers::call_log();
    runtime
        .register(helpers::recording_plugin("x", &log).requires("y"))
        .unwrap();
    runtime
        .register(helpers::recording_plugin("y", &log).requires("x"))
        .unwrap();

    let err = runtime.initialize_all(&["x"]).await.unwrap_err();
    assert!(matches!(err, PluginError::CircularDependency { .. }));
    assert!(helpers::entries(&log).is_empty());
    assert_eq!(runtime.state("x"), PluginState::Registered);
}

#[tokio::test]
async fn test_unregistered_and_repeated_requests() {
    let runtime = helpers::runtime();
    let log = helpers::call_log();
    runtime.register(helpers::recording_plugin("a", &log)).unwrap();

    let report = runtime.initialize_all(&["a", "ghost"]).await.unwrap();
    assert_eq!(report.succeeded, vec!["a"]);
    assert_eq!(report.skip_reason("ghost"), Some("plugin not registered"));

    let again = runtime.initialize_all(&["a"]).await.unwrap();
    assert!(again.is_success());
    assert!(again.succeeded.is_empty());

    runtime.cleanup_all().await;
    let after_cleanup = runtime.initialize_all(&["a"]).await.unwrap();
    assert_eq!(after_cleanup.skip_reason("a"), Some("plugin was cleaned up"));
    assert_eq!(helpers::entries(&log), vec!["init:a", "cleanup:a"]);
}

#[tokio::test]
async fn test_state_changes_are_published() {
    let runtime = helpers::runtime();
    let changes = helpers::capture(&runtime, topics::STATE_CHANGED);
    runtime.register(PluginRegistration::new("a")).unwrap();

    runtime.initialize_all(&["a"]).await.unwrap();
    runtime.cleanup_all().await;

    let transitions: Vec<String> = helpers::events_for(&changes, "a")
        .into_iter()
        .map(|data| format!("{}->{}", data["from"], data["to"]))
        .collect();
    assert_eq!(
        transitions,
        vec![
            r#""REGISTERED"->"INITIALIZING""#,
            r#""INITIALIZING"->"INITIALIZED""#,
            r#""INITIALIZED"->"CLEANUP_STARTED""#,
            r#""CLEANUP_STARTED"->"CLEANED_UP""#,
        ]
    );
}

#[tokio::test]
async fn test_unregister_refused_while_running() {
    let runtime = helpers::runtime();
    runtime
        .register(PluginRegistration::new("a").service(
            "ping",
            ServiceScope::Public,
            ServiceHandler::sync(|_| Ok(Value::Null)),
        ))
        .unwrap();
    runtime.initialize_all(&["a"]).await.unwrap();

    let err = runtime.unregister("a").unwrap_err();
    assert!(matches!(err, PluginError::Validation { .. }));

    runtime.cleanup_all().await;
    runtime.unregister("a").unwrap();
    assert_eq!(runtime.state("a"), PluginState::Unregistered);
    assert!(runtime.plugin_ids().is_empty());
    assert!(matches!(
        runtime.unregister("a"),
        Err(PluginError::PluginNotFound { .. })
    ));
}

#[tokio::test]
async fn test_initializer_can_use_runtime_during_startup() {
    let runtime = helpers::runtime();
    let seen = helpers::call_log();
    let sink = Arc::clone(&seen);

    runtime
        .register(PluginRegistration::new("config").service(
            "get",
            ServiceScope::Dependent,
            ServiceHandler::sync(|_| Ok(Value::from("debug"))),
        ))
        .unwrap();
    runtime
        .register(
            PluginRegistration::new("logger")
                .requires("config")
                .on_initialize(move |ctx| {
                    let sink = Arc::clone(&sink);
                    async move {
                        let level = ctx.call_service("config", "get", &[])?;
                        sink.lock().push(level.to_string());
                        let published = ctx.publish("logger.ready", event_data! { "level" => level });
                        sink.lock().push(published.source.clone());
                        anyhow::Ok(())
                    }
                }),
        )
        .unwrap();

    let report = runtime.initialize_all(&["logger"]).await.unwrap();
    assert!(report.is_success());
    assert_eq!(helpers::entries(&seen), vec!["\"debug\"", "logger"]);
}

#[tokio::test]
async fn test_sweeps_started_from_plugin_code_are_refused() {
    let runtime = helpers::runtime();
    let seen = helpers::call_log();
    runtime.register(PluginRegistration::new("base")).unwrap();

    let (init_rt, init_seen) = (runtime.clone(), Arc::clone(&seen));
    let (cleanup_rt, cleanup_seen) = (runtime.clone(), Arc::clone(&seen));
    runtime
        .register(
            PluginRegistration::new("eager")
                .requires("base")
                .on_initialize(move |_ctx| {
                    let (rt, seen) = (init_rt.clone(), Arc::clone(&init_seen));
                    async move {
                        let nested = rt.initialize_all(&["base"]).await;
                        anyhow::ensure!(
                            matches!(nested, Err(PluginError::Validation { .. })),
                            "nested initialize_all was not refused"
                        );
                        let report = rt.cleanup_all().await;
                        seen.lock().push(format!("init cleaned {}", report.succeeded_count()));
                        seen.lock().push(rt.lifecycle().initialized_order().join(","));
                        anyhow::Ok(())
                    }
                })
                .on_cleanup(move |_ctx| {
                    let (rt, seen) = (cleanup_rt.clone(), Arc::clone(&cleanup_seen));
                    async move {
                        let nested = rt.initialize_all(&["base"]).await;
                        seen.lock().push(format!("cleanup refused {}", nested.is_err()));
                        let report = rt.cleanup_all().await;
                        seen.lock().push(format!("cleanup cleaned {}", report.succeeded_count()));
                        anyhow::Ok(())
                    }
                }),
        )
        .unwrap();

    let report = tokio::time::timeout(Duration::from_secs(5), runtime.initialize_all(&["eager"]))
        .await
        .expect("nested sweep must not block the running one")
        .unwrap();
    assert_eq!(report.succeeded, vec!["base", "eager"]);
    assert_eq!(runtime.state("base"), PluginState::Initialized);

    let report = tokio::time::timeout(Duration::from_secs(5), runtime.cleanup_all())
        .await
        .expect("nested sweep must not block the running one");
    assert_eq!(report.succeeded, vec!["eager", "base"]);
    assert_eq!(
        helpers::entries(&seen),
        vec!["init cleaned 0", "base", "cleanup refused true", "cleanup cleaned 0"]
    );
    assert!(runtime.lifecycle().initialized_order().is_empty());
}
