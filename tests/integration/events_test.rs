//! Integration tests for the event bus.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde_json::{Value, json};

use plexus_core::types::{PluginState, SubscriptionId};
use plexus_plugin::prelude::*;
use plexus_plugin::registration::SubscriptionDeclaration;

use crate::helpers;

fn record(runtime: &Runtime, log: &helpers::CallLog, owner: &'static str, spec: SubscriptionSpec) {
    let log = Arc::clone(log);
    runtime
        .subscribe(owner, spec, move |_ctx| {
            log.lock().push(owner.to_string());
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_handlers_run_high_normal_low() {
    let runtime = helpers::runtime();
    let log = helpers::call_log();
    record(&runtime, &log, "low", SubscriptionSpec::new("e").priority(Priority::Low));
    record(&runtime, &log, "normal", SubscriptionSpec::new("e"));
    record(&runtime, &log, "high", SubscriptionSpec::new("e").priority(Priority::High));

    runtime.publish("e", event_data!(), ContextData::default());
    assert_eq!(helpers::entries(&log), vec!["high", "normal", "low"]);
}

#[test]
fn test_equal_priorities_run_in_subscription_order() {
    let runtime = helpers::runtime();
    let log = helpers::call_log();
    for owner in ["first", "second", "third"] {
        record(&runtime, &log, owner, SubscriptionSpec::new("e"));
    }
    record(&runtime, &log, "urgent", SubscriptionSpec::new("e").priority(Priority::Highest));

    runtime.publish("e", event_data!(), ContextData::default());
    assert_eq!(
        helpers::entries(&log),
        vec!["urgent", "first", "second", "third"]
    );
}

#[test]
fn test_cancel_stops_later_handlers_unless_opted_in() {
    let runtime = helpers::runtime();
    let log = helpers::call_log();
    runtime.subscribe(
        "guard",
        SubscriptionSpec::new("upload").priority(Priority::High),
        |ctx| {
            if ctx.get_str("name") == Some("virus.exe") {
                ctx.cancel();
            }
            Ok(())
        },
    )
    .unwrap();
    record(&runtime, &log, "normal", SubscriptionSpec::new("upload"));
    record(
        &runtime,
        &log,
        "low",
        SubscriptionSpec::new("upload").priority(Priority::Low),
    );
    record(
        &runtime,
        &log,
        "audit",
        SubscriptionSpec::new("upload")
            .priority(Priority::Lowest)
            .call_if_canceled(true),
    );

    let ctx = runtime.publish(
        "upload",
        event_data! { "name" => "virus.exe" },
        ContextData::default(),
    );
    assert!(ctx.is_canceled());
    assert_eq!(helpers::entries(&log), vec!["audit"]);

    let ctx = runtime.publish(
        "upload",
        event_data! { "name" => "notes.txt" },
        ContextData::default(),
    );
    assert!(!ctx.is_canceled());
    assert_eq!(
        helpers::entries(&log),
        vec!["audit", "normal", "low", "audit"]
    );
}

#[test]
fn test_results_and_context_metadata() {
    let runtime = helpers::runtime();
    runtime
        .subscribe("thumbnailer", SubscriptionSpec::new("saved"), |ctx| {
            ctx.add_result("thumbnailer", json!({ "size": 128 }));
            Ok(())
        })
        .unwrap();
    runtime
        .subscribe("indexer", SubscriptionSpec::new("saved"), |ctx| {
            let trace = ctx.metadata.get("trace").cloned().unwrap_or(Value::Null);
            ctx.add_result("indexer", trace);
            Ok(())
        })
        .unwrap();

    let ctx = runtime.publish(
        "saved",
        event_data! { "bytes" => 10 },
        ContextData::from_source("editor").with_metadata("trace", json!("t-1")),
    );

    assert_eq!(ctx.source, "editor");
    assert_eq!(ctx.event_type, "saved");
    assert_eq!(ctx.get("bytes"), Some(&json!(10)));
    let owners: Vec<&str> = ctx.results().iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(owners, vec!["thumbnailer", "indexer"]);
    assert_eq!(ctx.result("indexer"), Some(&json!("t-1")));
}

#[test]
fn test_handlers_see_data_in_publish_order() {
    let runtime = helpers::runtime();
    let log = helpers::call_log();
    let sink = Arc::clone(&log);
    runtime
        .subscribe("reader", SubscriptionSpec::new("saved"), move |ctx| {
            sink.lock().extend(ctx.data.keys().cloned());
            Ok(())
        })
        .unwrap();

    let ctx = runtime.publish(
        "saved",
        event_data! { "path" => "/tmp/a", "bytes" => 10, "author" => "kim" },
        ContextData::default(),
    );
    assert_eq!(helpers::entries(&log), vec!["path", "bytes", "author"]);
    let echoed = serde_json::to_string(&ctx.data).unwrap();
    assert_eq!(echoed, r#"{"path":"/tmp/a","bytes":10,"author":"kim"}"#);
}

#[test]
fn test_unsubscribe_during_dispatch_does_not_touch_in_flight_snapshot() {
    let runtime = helpers::runtime();
    let log = helpers::call_log();
    let victim: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

    let bus = runtime.clone();
    let target = Arc::clone(&victim);
    runtime.subscribe(
        "remover",
        SubscriptionSpec::new("e").priority(Priority::High),
        move |_ctx| {
            if let Some(id) = target.lock().take() {
                bus.unsubscribe(id);
            }
            Ok(())
        },
    )
    .unwrap();
    let log_sink = Arc::clone(&log);
    let id = runtime
        .subscribe("victim", SubscriptionSpec::new("e"), move |_ctx| {
            log_sink.lock().push("victim".to_string());
            Ok(())
        })
        .unwrap();
    *victim.lock() = Some(id);

    runtime.publish("e", event_data!(), ContextData::default());
    runtime.publish("e", event_data!(), ContextData::default());

    assert_eq!(helpers::entries(&log), vec!["victim"]);
    assert_eq!(runtime.event_bus().subscriber_count("e"), 1);
}

#[test]
fn test_unsubscribe_all_by_owner() {
    let runtime = helpers::runtime();
    let log = helpers::call_log();
    record(&runtime, &log, "p", SubscriptionSpec::new("a"));
    record(&runtime, &log, "p", SubscriptionSpec::new("b"));
    record(&runtime, &log, "q", SubscriptionSpec::new("b"));

    assert_eq!(runtime.unsubscribe_all("p"), 2);
    runtime.publish("a", event_data!(), ContextData::default());
    runtime.publish("b", event_data!(), ContextData::default());
    assert_eq!(helpers::entries(&log), vec!["q"]);
}

#[tokio::test]
async fn test_plugin_subscriptions_removed_at_cleanup_and_failure() {
    let runtime = helpers::runtime();
    let log = helpers::call_log();
    let (keeper_log, broken_log) = (Arc::clone(&log), Arc::clone(&log));

    runtime
        .register(
            PluginRegistration::new("keeper").subscribe(SubscriptionSpec::new("tick"), move |_| {
                keeper_log.lock().push("keeper".into());
                Ok(())
            }),
        )
        .unwrap();
    runtime
        .register(
            helpers::failing_plugin("broken", &helpers::call_log()).subscribe(
                SubscriptionSpec::new("tick"),
                move |_| {
                    broken_log.lock().push("broken".into());
                    Ok(())
                },
            ),
        )
        .unwrap();
    assert_eq!(runtime.event_bus().subscriber_count("tick"), 2);

    runtime.initialize_all(&["broken", "keeper"]).await.unwrap();
    runtime.publish("tick", event_data!(), ContextData::default());
    assert_eq!(helpers::entries(&log), vec!["keeper"]);

    runtime.cleanup_all().await;
    runtime.publish("tick", event_data!(), ContextData::default());
    assert_eq!(helpers::entries(&log), vec!["keeper"]);
    assert_eq!(runtime.event_bus().subscriber_count("tick"), 0);
}

#[tokio::test]
async fn test_retired_plugins_cannot_subscribe_again() {
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

    let hits = Arc::new(AtomicUsize::new(0));
    for (slot, retired) in [(&done, PluginState::CleanedUp), (&broken, PluginState::Failed)] {
        let ctx = slot.lock().clone().expect("initializer ran");
        assert_eq!(runtime.state(&ctx.plugin_id), retired);

        let counter = Arc::clone(&hits);
        let err = ctx
            .subscribe(SubscriptionSpec::new("late"), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap_err();
        assert_eq!(
            err,
            PluginError::PluginInactive {
                plugin: ctx.plugin_id.clone(),
                state: retired,
            }
        );
        assert!(matches!(
            runtime.subscribe(&ctx.plugin_id, SubscriptionSpec::new("late"), |_| Ok(())),
            Err(PluginError::PluginInactive { .. })
        ));
        assert!(runtime.event_bus().subscriptions_of(&ctx.plugin_id).is_empty());
    }

    runtime.publish("late", event_data!(), ContextData::default());
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(runtime.event_bus().subscriber_count("late"), 0);
}

#[test]
fn test_descriptor_priority_overrides_handler_spec() {
    let runtime = helpers::runtime();
    let log = helpers::call_log();
    record(&runtime, &log, "normal", SubscriptionSpec::new("e"));

    let mut descriptor = PluginDescriptor::new("declared");
    descriptor.subscriptions.push(SubscriptionDeclaration {
        event_type: "e".into(),
        priority: Priority::Highest,
    });
    let sink = Arc::clone(&log);
    runtime
        .register(
            PluginRegistration::from_descriptor(descriptor).subscribe(
                SubscriptionSpec::new("e").priority(Priority::Lowest),
                move |_| {
                    sink.lock().push("declared".into());
                    Ok(())
                },
            ),
        )
        .unwrap();

    runtime.publish("e", event_data!(), ContextData::default());
    assert_eq!(helpers::entries(&log), vec!["declared", "normal"]);
}

#[test]
fn test_failing_handler_does_not_stop_dispatch() {
    let runtime = helpers::runtime();
    let log = helpers::call_log();
    runtime.subscribe(
        "flaky",
        SubscriptionSpec::new("e").priority(Priority::High),
        |_ctx| Err(anyhow::anyhow!("index offline")),
    )
    .unwrap();
    record(&runtime, &log, "steady", SubscriptionSpec::new("e"));

    let ctx = runtime.publish("e", event_data!(), ContextData::default());
    assert_eq!(helpers::entries(&log), vec!["steady"]);
    assert_eq!(
        ctx.errors(),
        &[("flaky".to_string(), "index offline".to_string())]
    );
}
