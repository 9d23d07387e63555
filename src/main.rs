//! Plexus Runtime: plugin runtime demo host
//!
//! Loads configuration, registers the built-in demo plugins, brings them up,
//! exercises the event bus and services, and tears everything down again.

mod demo;

use std::time::Duration;

use serde_json::json;
use tracing_subscriber::{EnvFilter, fmt};

use plexus_core::config::RuntimeConfig;
use plexus_core::AppResult;
use plexus_plugin::{ContextData, LifecycleReport, Runtime, event_data};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from files and environment
fn load_configuration() -> AppResult<RuntimeConfig> {
    let env = std::env::var("PLEXUS_ENV").unwrap_or_else(|_| "development".to_string());
    RuntimeConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &RuntimeConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(config.logging.with_target)
                .with_thread_ids(true)
                .init();
        }
        "compact" => {
            fmt()
                .compact()
                .with_env_filter(filter)
                .with_target(config.logging.with_target)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(config.logging.with_target)
                .init();
        }
    }
}

/// Main run function
async fn run(config: RuntimeConfig) -> AppResult<()> {
    tracing::info!("Starting Plexus runtime v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Register plugins ─────────────────────────────────
    let runtime = Runtime::new(config);
    demo::register_all(&runtime)?;
    let ids = runtime.plugin_ids();
    tracing::info!(plugins = ?ids, "Registered demo plugins");

    // ── Step 2: Bring plugins up ─────────────────────────────────
    let report = runtime.initialize_all(&ids).await?;
    log_report("initialize", &report)?;

    // ── Step 3: Exercise the bus ─────────────────────────────────
    let ctx = runtime.publish(
        "document.saved",
        event_data! { "name" => "release-notes.md", "bytes" => 512 },
        ContextData::from_source("host"),
    );
    tracing::info!(
        event_type = %ctx.event_type,
        canceled = ctx.is_canceled(),
        results = %serde_json::to_string(ctx.results())?,
        "Published event"
    );

    // ── Step 4: Exercise services ────────────────────────────────
    let hits = runtime
        .await_service(
            demo::INDEXER,
            "search",
            demo::AUDIT,
            vec![json!("notes")],
            Some(Duration::from_secs(2)),
        )
        .await?;
    tracing::info!(hits = %hits, "Search service answered");

    // ── Step 5: Tear down ────────────────────────────────────────
    let report = runtime.cleanup_all().await;
    log_report("cleanup", &report)?;

    tracing::info!("Plexus runtime shut down");
    Ok(())
}

fn log_report(phase: &str, report: &LifecycleReport) -> AppResult<()> {
    let rendered = serde_json::to_string(report)?;
    if report.is_success() {
        tracing::info!(phase, report = %rendered, "Lifecycle sweep complete");
    } else {
        tracing::warn!(phase, report = %rendered, "Lifecycle sweep completed with problems");
    }
    Ok(())
}
