//! ferry - queue-to-webhook bridge daemon.
//!
//! Main entry point: initializes tracing, loads and validates the
//! configuration, connects the queue backend, and runs the dispatch engine
//! until it completes (single-batch mode), is signalled, or exhausts its
//! error budget.

use std::sync::Arc;

use anyhow::{Context, Result};
use ferry_core::RealClock;
use ferry_engine::{sqs::SqsQueue, Engine};
use tracing::info;

mod config;

use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!(version = env!("CARGO_PKG_VERSION"), "starting ferry");

    let config = Config::load()?;
    info!(
        queue = %config.queue_display(),
        webhook = config.webhook_url.as_deref().unwrap_or_default(),
        daemonized = config.daemonized,
        max_in_flight = config.max_in_flight,
        "configuration loaded"
    );

    let queue = Arc::new(SqsQueue::connect(&config.to_queue_config()).await?);

    let engine = Engine::new(queue, config.to_engine_config(), Arc::new(RealClock::new()))?;
    let cancel = engine.cancellation_token();

    let mut engine_task = tokio::spawn(engine.run());

    let report = tokio::select! {
        result = &mut engine_task => {
            result.context("engine task panicked")??
        },
        () = shutdown_signal() => {
            info!("shutdown signal received, draining in-flight deliveries");
            cancel.cancel();
            engine_task.await.context("engine task panicked")??
        },
    };

    info!(
        polls = report.polls,
        received = report.received,
        acknowledged = report.acknowledged,
        failed = report.failed + report.rejected,
        "ferry finished"
    );

    Ok(())
}

/// Initializes tracing with environment-based filtering.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,ferry=debug"))
        .expect("invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer().with_target(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Waits for a shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received CTRL+C signal");
        },
        _ = terminate => {
            info!("received SIGTERM signal");
        },
    }
}
