//! Bounty Notifier — Binary Entrypoint
//! Boots the poll scheduler and the Axum admin/status surface, wiring the
//! stores, sink, and shared state.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bounty_notifier::api::{self, AppState};
use bounty_notifier::config::Config;
use bounty_notifier::ingest::providers::bounty_api::HttpBountyProvider;
use bounty_notifier::ingest::scheduler::{spawn_poller, SchedulerCfg};
use bounty_notifier::ingest::Pipeline;
use bounty_notifier::metrics;
use bounty_notifier::notify::discord::DiscordSink;
use bounty_notifier::notify::dispatcher::Dispatcher;
use bounty_notifier::status::StatusBoard;
use bounty_notifier::store::ledger::SeenLedger;
use bounty_notifier::store::subscriptions::SubscriptionStore;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = Config::load().context("loading configuration")?;
    tracing::info!(
        source = %cfg.source_url,
        interval_secs = cfg.poll_interval_secs,
        "starting bounty notifier"
    );

    let metrics_handle = metrics::install(cfg.poll_interval_secs);

    let ledger = Arc::new(
        SeenLedger::open(cfg.ledger_path())
            .await
            .context("opening seen ledger")?,
    );
    let subscriptions = Arc::new(
        SubscriptionStore::open(cfg.subscriptions_path())
            .await
            .context("opening subscription store")?,
    );
    let status = Arc::new(StatusBoard::new());

    let token = cfg
        .discord_token
        .clone()
        .ok_or_else(|| anyhow::anyhow!("DISCORD_TOKEN not set"))?;
    let sink = Arc::new(DiscordSink::new(token));
    let dispatcher = Arc::new(Dispatcher::new(
        sink,
        cfg.dispatch_concurrency,
        cfg.deliver_backoff(),
    ));

    let source = Arc::new(HttpBountyProvider::new(
        cfg.source_url.clone(),
        cfg.source_api_key.clone(),
        cfg.source_timeout_secs,
        cfg.per_page,
    ));

    let pipeline = Arc::new(Pipeline::new(
        source,
        ledger,
        subscriptions.clone(),
        dispatcher,
        cfg.fetch_backoff(),
        cfg.wildcard_location.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = spawn_poller(
        SchedulerCfg {
            interval: cfg.poll_interval(),
            initial_delay: cfg.initial_delay(),
        },
        pipeline,
        status.clone(),
        shutdown_rx,
    );

    let state = AppState {
        subscriptions,
        status,
    };
    let router = api::create_router(state).merge(metrics::router(metrics_handle));

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    tracing::info!(addr = %cfg.bind_addr, "admin surface listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("serving admin surface")?;

    // Stop scheduling new cycles; the in-flight cycle drains its dispatch
    // pass before the poller task exits.
    let _ = shutdown_tx.send(true);
    poller.await.context("joining poller")?;
    tracing::info!("shutdown complete");
    Ok(())
}
