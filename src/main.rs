//! Balance Ledger
//!
//! Loads the account balances once, then follows the notification feed and
//! answers per-market balance queries over HTTP.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use balance_ledger::auth::Authenticator;
use balance_ledger::ledger::RestSnapshotSource;
use balance_ledger::{
    server, AppState, BalanceStore, Config, EventConsumer, FeedManager, FeedState, LedgerMetrics,
    QueryService, SnapshotLoader,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting Balance Ledger");

    // Credentials file as first argument, environment otherwise
    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!(path = %path, "Using credentials file");
            Config::from_credentials_file(&path)?
        }
        None => Config::load()?,
    };
    info!(api_url = %config.api_url, listen_addr = %config.listen_addr, "Configuration loaded");

    let store = Arc::new(BalanceStore::new());
    let metrics = Arc::new(LedgerMetrics::new()?);
    let (feed_state_tx, feed_state_rx) = watch::channel(FeedState::Disconnected);

    let state = Arc::new(AppState {
        store: store.clone(),
        query: QueryService::new(store.clone()),
        metrics: metrics.clone(),
        feed_state: feed_state_rx,
    });

    // Queries before the snapshot lands are answered with "not ready"
    let server_state = state.clone();
    let listen_addr = config.listen_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = server::serve(server_state, &listen_addr).await {
            error!(error = %e, "Query server error");
        }
    });

    // Snapshot failures are fatal
    let source = RestSnapshotSource::new(&config)?;
    let loaded = SnapshotLoader::new(source)
        .allow_empty(config.allow_empty_snapshot)
        .load(&store)
        .await?;
    metrics.currencies.set(loaded as i64);

    let session_token = Authenticator::new(&config)?.login().await?;

    let (tx, rx) = mpsc::channel(config.feed_channel_capacity);
    let consumer = tokio::spawn(EventConsumer::new(store.clone(), metrics.clone(), rx).run());
    let mut feed = FeedManager::new(
        &config,
        session_token,
        store.clone(),
        metrics.clone(),
        tx,
        feed_state_tx,
    );

    tokio::select! {
        result = feed.run() => {
            if let Err(e) = result {
                error!(error = %e, "Feed manager stopped");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupt received, shutting down");
        }
    }

    drop(feed);
    match consumer.await {
        Ok(handled) => info!(handled, "Event consumer finished"),
        Err(e) => error!(error = %e, "Event consumer task failed"),
    }

    Ok(())
}
