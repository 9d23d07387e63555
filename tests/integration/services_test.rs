//! Integration tests for the service registry.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tokio::sync::oneshot;

use plexus_core::types::PluginState;
use plexus_plugin::prelude::*;

use crate::helpers;

fn echo() -> ServiceHandler {
    ServiceHandler::sync(|args| Ok(json!(args)))
}

#[test]
fn test_dependent_scope_follows_live_graph() {
    let runtime = helpers::runtime();
    runtime
        .register(PluginRegistration::new("db").service("query", ServiceScope::Dependent, echo()))
        .unwrap();
    runtime.register(PluginRegistration::new("report")).unwrap();

    let err = runtime
        .call_service("db", "query", "report", &[json!(1)])
        .unwrap_err();
    assert!(matches!(err, PluginError::ServiceAccess { .. }));

    runtime
        .add_dependency("report", "db", DependencyKind::Optional)
        .unwrap();
    assert_eq!(
        runtime.call_service("db", "query", "report", &[json!(1)]).unwrap(),
        json!([1])
    );

    runtime.remove_dependency("report", "db");
    assert!(matches!(
        runtime.call_service("db", "query", "report", &[]),
        Err(PluginError::ServiceAccess { .. })
    ));
    assert!(runtime.call_service("db", "query", "db", &[]).is_ok());
}

#[test]
fn test_conflicts_edge_does_not_grant_access() {
    let runtime = helpers::runtime();
    runtime
        .register(PluginRegistration::new("db").service("query", ServiceScope::Dependent, echo()))
        .unwrap();
    runtime
        .register(PluginRegistration::new("rival").conflicts_with("db"))
        .unwrap();

    assert!(matches!(
        runtime.call_service("db", "query", "rival", &[]),
        Err(PluginError::ServiceAccess { .. })
    ));
}

#[test]
fn test_private_and_public_scopes() {
    let runtime = helpers::runtime();
    runtime
        .register(
            PluginRegistration::new("clock")
                .service("now", ServiceScope::Private, ServiceHandler::sync(|_| Ok(json!(42))))
                .service("zone", ServiceScope::Public, ServiceHandler::sync(|_| Ok(json!("UTC")))),
        )
        .unwrap();
    runtime
        .register(PluginRegistration::new("ui").requires("clock"))
        .unwrap();

    assert!(matches!(
        runtime.call_service("clock", "now", "ui", &[]),
        Err(PluginError::ServiceAccess { .. })
    ));
    assert_eq!(runtime.call_service("clock", "now", "clock", &[]).unwrap(), json!(42));
    assert_eq!(
        runtime.call_service("clock", "zone", "stranger", &[]).unwrap(),
        json!("UTC")
    );

    let visible: Vec<String> = runtime
        .services()
        .visible_services("ui")
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(visible, vec!["zone"]);
}

#[test]
fn test_unknown_service_is_not_found() {
    let runtime = helpers::runtime();
    runtime.register(PluginRegistration::new("a")).unwrap();

    assert!(matches!(
        runtime.call_service("a", "missing", "a", &[]),
        Err(PluginError::ServiceNotFound { .. })
    ));
    assert!(matches!(
        runtime.call_service("ghost", "anything", "a", &[]),
        Err(PluginError::ServiceNotFound { .. })
    ));
}

#[test]
fn test_duplicate_service_name_rejected() {
    let runtime = helpers::runtime();
    runtime
        .register(PluginRegistration::new("a").service("ping", ServiceScope::Public, echo()))
        .unwrap();

    let err = runtime
        .register_service("a", "ping", echo(), ServiceScope::Public, Map::new())
        .unwrap_err();
    assert!(matches!(err, PluginError::ServiceAlreadyRegistered { .. }));
}

#[test]
fn test_handler_errors_and_panics_become_service_failed() {
    let runtime = helpers::runtime();
    runtime
        .register(
            PluginRegistration::new("svc")
                .service(
                    "fail",
                    ServiceScope::Public,
                    ServiceHandler::sync(|_| Err(anyhow::anyhow!("disk full"))),
                )
                .service(
                    "explode",
                    ServiceScope::Public,
                    ServiceHandler::sync(|_| panic!("bad state")),
                ),
        )
        .unwrap();

    let PluginError::ServiceFailed { message, .. } =
        runtime.call_service("svc", "fail", "x", &[]).unwrap_err()
    else {
        panic!("expected ServiceFailed");
    };
    assert_eq!(message, "disk full");

    let PluginError::ServiceFailed { message, .. } =
        runtime.call_service("svc", "explode", "x", &[]).unwrap_err()
    else {
        panic!("expected ServiceFailed");
    };
    assert_eq!(message, "panicked: bad state");
}

#[tokio::test]
async fn test_async_service_needs_await() {
    let runtime = helpers::runtime();
    runtime
        .register(PluginRegistration::new("idx").service(
            "search",
            ServiceScope::Public,
            ServiceHandler::future(|req| async move { anyhow::Ok(json!(req.args.len())) }),
        ))
        .unwrap();

    assert!(matches!(
        runtime.call_service("idx", "search", "ui", &[]),
        Err(PluginError::AsyncService { .. })
    ));
    let hits = runtime
        .await_service("idx", "search", "ui", vec![json!("a"), json!("b")], None)
        .await
        .unwrap();
    assert_eq!(hits, json!(2));
}

#[tokio::test]
async fn test_sync_service_can_be_awaited() {
    let runtime = helpers::runtime();
    runtime
        .register(PluginRegistration::new("math").service(
            "sum",
            ServiceScope::Public,
            ServiceHandler::sync(|args| Ok(json!(args.iter().filter_map(Value::as_i64).sum::<i64>()))),
        ))
        .unwrap();

    let total = runtime
        .await_service("math", "sum", "ui", vec![json!(2), json!(3)], Some(Duration::from_millis(1)))
        .await
        .unwrap();
    assert_eq!(total, json!(5));
}

#[tokio::test]
async fn test_await_timeout_cancels_request() {
    let runtime = helpers::runtime();
    let (tx, rx) = oneshot::channel::<&'static str>();
    let signal = Arc::new(Mutex::new(Some(tx)));

    runtime
        .register(PluginRegistration::new("slow").service(
            "crunch",
            ServiceScope::Public,
            ServiceHandler::future(move |req| {
                let signal = Arc::clone(&signal);
                async move {
                    req.cancellation.cancelled().await;
                    if let Some(tx) = signal.lock().take() {
                        let _ = tx.send("canceled");
                    }
                    anyhow::Ok(Value::Null)
                }
            }),
        ))
        .unwrap();

    let err = runtime
        .await_service("slow", "crunch", "ui", vec![], Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert!(matches!(err, PluginError::ServiceTimeout { .. }));

    let observed = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .expect("handler should observe cancellation")
        .unwrap();
    assert_eq!(observed, "canceled");
}

#[tokio::test]
async fn test_configured_default_timeout_applies() {
    let runtime = helpers::runtime_with("[services]\ndefault_timeout_ms = 30");
    runtime
        .register(PluginRegistration::new("slow").service(
            "sleep",
            ServiceScope::Public,
            ServiceHandler::future(|_req| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                anyhow::Ok(Value::Null)
            }),
        ))
        .unwrap();

    let err = runtime
        .await_service("slow", "sleep", "ui", vec![], None)
        .await
        .unwrap_err();
    assert!(matches!(err, PluginError::ServiceTimeout { .. }));
}

#[tokio::test]
async fn test_failed_provider_loses_its_services() {
    let runtime = helpers::runtime();
    let log = helpers::call_log();
    runtime
        .register(helpers::failing_plugin("db", &log).service("query", ServiceScope::Public, echo()))
        .unwrap();

    runtime.initialize_all(&["db"]).await.unwrap();
    assert_eq!(runtime.state("db"), PluginState::Failed);
    assert!(!runtime.services().has_service("db", "query"));
    assert!(matches!(
        runtime.call_service("db", "query", "ui", &[]),
        Err(PluginError::ServiceNotFound { .. })
    ));
}

#[test]
fn test_services_are_callable_before_provider_initializes() {
    let runtime = helpers::runtime();
    runtime
        .register(PluginRegistration::new("db").service("query", ServiceScope::Public, echo()))
        .unwrap();
    runtime
        .register_service("host", "version", echo(), ServiceScope::Dependent, Map::new())
        .unwrap();

    assert_eq!(runtime.state("db"), PluginState::Registered);
    assert_eq!(
        runtime.call_service("db", "query", "ui", &[json!("q")]).unwrap(),
        json!(["q"])
    );

    assert_eq!(runtime.state("host"), PluginState::Unregistered);
    assert!(matches!(
        runtime.call_service("host", "version", "ui", &[]),
        Err(PluginError::ServiceAccess { .. })
    ));
    assert_eq!(runtime.call_service("host", "version", "host", &[]).unwrap(), json!([]));
}

#[tokio::test]
async fn test_retired_plugins_cannot_register_services() {
    let runtime = helpers::runtime();
    let (done, broken) = (helpers::context_slot(), helpers::context_slot());
    runtime
        .register(helpers::stashing_plugin("done", &done, false))
        .unwrap();
    runtime
        .register(helpers::stashing_plugin("broken", &broken, true))
        .unwrap();

    runtime.initialize_all(&["broken", "done"]).await.unwrap();
    runtime.cleanup_all().await;

    for (slot, retired) in [(&done, PluginState::CleanedUp), (&broken, PluginState::Failed)] {
        let ctx = slot.lock().clone().expect("initializer ran");
        let id = ctx.plugin_id.clone();

        let err = ctx
            .register_service("status", echo(), ServiceScope::Public)
            .unwrap_err();
        assert_eq!(
            err,
            PluginError::PluginInactive {
                plugin: id.clone(),
                state: retired,
            }
        );
        assert!(matches!(
            runtime.register_service(&id, "status", echo(), ServiceScope::Public, Map::new()),
            Err(PluginError::PluginInactive { .. })
        ));
        assert!(runtime.services().services_of(&id).is_empty());
        assert!(matches!(
            runtime.call_service(&id, "status", "ui", &[]),
            Err(PluginError::ServiceNotFound { .. })
        ));
    }
}

#[tokio::test]
async fn test_services_removed_after_cleanup() {
    let runtime = helpers::runtime();
    runtime
        .register(PluginRegistration::new("db").service("query", ServiceScope::Public, echo()))
        .unwrap();
    runtime.initialize_all(&["db"]).await.unwrap();
    assert!(runtime.call_service("db", "query", "ui", &[]).is_ok());

    runtime.cleanup_all().await;
    assert!(runtime.services().services_of("db").is_empty());
    assert!(matches!(
        runtime.call_service("db", "query", "ui", &[]),
        Err(PluginError::ServiceNotFound { .. })
    ));
}

#[tokio::test]
async fn test_descriptor_registration_end_to_end() {
    let runtime = helpers::runtime();
    let descriptor: PluginDescriptor = serde_json::from_value(json!({
        "id": "search",
        "dependencies": [{ "id": "store", "kind": "REQUIRED" }],
        "services": [{ "name": "query", "scope": "DEPENDENT" }]
    }))
    .unwrap();

    runtime
        .register(PluginRegistration::new("store").service(
            "get",
            ServiceScope::Dependent,
            ServiceHandler::sync(|_| Ok(json!("doc"))),
        ))
        .unwrap();
    runtime
        .register(
            PluginRegistration::from_descriptor(descriptor)
                .service("query", ServiceScope::Public, echo())
                .on_initialize(|ctx| async move {
                    let doc = ctx.call_service("store", "get", &[])?;
                    anyhow::ensure!(doc == json!("doc"), "unexpected document {doc}");
                    anyhow::Ok(())
                }),
        )
        .unwrap();

    let report = runtime.initialize_all(&["search"]).await.unwrap();
    assert_eq!(report.succeeded, vec!["store", "search"]);

    let descriptor = runtime.services().get_descriptor("search", "query").unwrap();
    assert_eq!(descriptor.scope, ServiceScope::Dependent);
    assert!(matches!(
        runtime.call_service("search", "query", "outsider", &[]),
        Err(PluginError::ServiceAccess { .. })
    ));
}

#[test]
fn test_descriptor_service_without_handler_is_rejected() {
    let runtime = helpers::runtime();
    let mut descriptor = PluginDescriptor::new("half");
    descriptor.services.push(plexus_plugin::registration::ServiceDeclaration {
        name: "missing".into(),
        scope: ServiceScope::Public,
    });

    let err = runtime
        .register(PluginRegistration::from_descriptor(descriptor))
        .unwrap_err();
    assert!(matches!(err, PluginError::Validation { .. }));
    assert!(runtime.plugin_ids().is_empty());
}
