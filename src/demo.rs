//! Built-in demo plugins.
//!
//! `storage` holds documents, `indexer` requires it and exposes a search
//! service, `audit` optionally depends on `indexer` and watches events.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde_json::{Value, json};

use plexus_plugin::prelude::*;

pub const STORAGE: &str = "storage";
pub const INDEXER: &str = "indexer";
pub const AUDIT: &str = "audit";

/// Registers every demo plugin.
pub fn register_all(runtime: &Runtime) -> PluginResult<()> {
    runtime.register(storage())?;
    runtime.register(indexer())?;
    runtime.register(audit())?;
    Ok(())
}

type Documents = Arc<RwLock<BTreeMap<String, String>>>;

struct DocumentStore {
    docs: Documents,
}

#[async_trait]
impl Initializable for DocumentStore {
    async fn initialize(&self, ctx: &PluginContext) -> anyhow::Result<()> {
        {
            let mut docs = self.docs.write();
            docs.insert("readme.md".into(), "Plexus plugin runtime".into());
            docs.insert("notes.txt".into(), "dependency ordering notes".into());
        }
        ctx.publish("storage.ready", event_data! { "documents" => 2 });
        Ok(())
    }
}

#[async_trait]
impl Cleanable for DocumentStore {
    async fn cleanup(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
        self.docs.write().clear();
        Ok(())
    }
}

impl ServiceProvider for DocumentStore {
    fn services(&self) -> Vec<ServiceDefinition> {
        let list = Arc::clone(&self.docs);
        let get = Arc::clone(&self.docs);
        vec![
            ServiceDefinition::new(
                "list",
                ServiceScope::Public,
                ServiceHandler::sync(move |_| {
                    Ok(json!(list.read().keys().cloned().collect::<Vec<_>>()))
                }),
            ),
            ServiceDefinition::new(
                "get",
                ServiceScope::Dependent,
                ServiceHandler::sync(move |args| {
                    let name = args
                        .first()
                        .and_then(Value::as_str)
                        .ok_or_else(|| anyhow::anyhow!("expected a document name"))?;
                    Ok(get.read().get(name).map(|s| json!(s)).unwrap_or(Value::Null))
                }),
            ),
        ]
    }
}

fn storage() -> PluginRegistration {
    let store = Arc::new(DocumentStore {
        docs: Arc::default(),
    });
    PluginRegistration::new(STORAGE)
        .with_initializer(store.clone())
        .with_cleanup(store.clone())
        .with_service_provider(store)
}

fn indexer() -> PluginRegistration {
    let index: Arc<RwLock<Vec<String>>> = Arc::default();
    let on_init = Arc::clone(&index);
    let on_saved = Arc::clone(&index);
    let searchable = Arc::clone(&index);

    PluginRegistration::new(INDEXER)
        .requires(STORAGE)
        .on_initialize(move |ctx| {
            let index = Arc::clone(&on_init);
            async move {
                let listed = ctx.call_service(STORAGE, "list", &[])?;
                let names: Vec<String> = serde_json::from_value(listed)?;
                *index.write() = names;
                anyhow::Ok(())
            }
        })
        .service(
            "search",
            ServiceScope::Dependent,
            ServiceHandler::future(move |req| {
                let index = Arc::clone(&searchable);
                async move {
                    let needle = req.args.first().and_then(Value::as_str).unwrap_or_default();
                    let hits: Vec<String> = index
                        .read()
                        .iter()
                        .filter(|name| name.contains(needle))
                        .cloned()
                        .collect();
                    anyhow::Ok(json!(hits))
                }
            }),
        )
        .subscribe(
            SubscriptionSpec::new("document.saved").priority(Priority::High),
            move |ctx| {
                let name = ctx
                    .get_str("name")
                    .ok_or_else(|| anyhow::anyhow!("document.saved without a name"))?
                    .to_string();
                on_saved.write().push(name.clone());
                ctx.add_result(INDEXER, json!({ "indexed": name }));
                Ok(())
            },
        )
}

fn audit() -> PluginRegistration {
    let seen = Arc::new(AtomicUsize::new(0));
    let on_event = Arc::clone(&seen);

    PluginRegistration::new(AUDIT)
        .optional(INDEXER)
        .subscribe(
            SubscriptionSpec::new("document.saved")
                .priority(Priority::Lowest)
                .call_if_canceled(true),
            move |ctx| {
                let count = on_event.fetch_add(1, Ordering::SeqCst) + 1;
                ctx.add_result(AUDIT, json!({ "seen": count }));
                Ok(())
            },
        )
        .on_cleanup(move |ctx| {
            let seen = Arc::clone(&seen);
            async move {
                tracing::info!(
                    plugin_id = %ctx.plugin_id,
                    events = seen.load(Ordering::SeqCst),
                    "Audit trail closed"
                );
                anyhow::Ok(())
            }
        })
}
