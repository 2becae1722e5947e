//! Balance Ledger Library
//!
//! This crate keeps an in-memory view of one exchange account's balances,
//! loaded from a REST snapshot and kept current from the account
//! notification feed, and serves it per market.

use std::sync::Arc;
use tokio::sync::watch;

pub mod auth;
pub mod config;
pub mod error;
pub mod feed;
pub mod ledger;
pub mod parser;
pub mod query;
pub mod reducer;
pub mod server;

pub use config::Config;
pub use error::{InvariantViolation, LedgerError, QueryError, Result, SnapshotError};
pub use feed::{EventConsumer, FeedManager, FeedState};
pub use ledger::{BalanceDelta, BalanceStore, CurrencyBalance, LedgerMetrics, SnapshotLoader};
pub use parser::{Notification, ParsedMessage};
pub use query::{MarketBalances, MarketPair, QueryService};

/// Application state shared across components
pub struct AppState {
    pub store: Arc<BalanceStore>,
    pub query: QueryService,
    pub metrics: Arc<LedgerMetrics>,
    pub feed_state: watch::Receiver<FeedState>,
}
