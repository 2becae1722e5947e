//! Startup balance snapshot
//!
//! Fetches the full list of account balances once and installs it into the
//! store. Any failure here is fatal for the process.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{BalanceStore, CurrencyBalance};
use crate::config::Config;
use crate::error::SnapshotError;
use crate::parser::deserialize_decimal;

/// Source of the full balance snapshot
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_balances(&self) -> Result<Vec<CurrencyBalance>, SnapshotError>;
}

/// Loads the snapshot from a source into a store
pub struct SnapshotLoader<S> {
    source: S,
    allow_empty: bool,
}

impl<S: SnapshotSource> SnapshotLoader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            allow_empty: false,
        }
    }

    /// Accept an account with no wallets at all
    pub fn allow_empty(mut self, allow: bool) -> Self {
        self.allow_empty = allow;
        self
    }

    /// Fetch the snapshot and install it, marking the store ready.
    ///
    /// Returns the number of currencies loaded.
    pub async fn load(&self, store: &BalanceStore) -> Result<usize, SnapshotError> {
        info!("Fetching balance snapshot");
        let balances = self.source.fetch_balances().await?;

        if balances.is_empty() && !self.allow_empty {
            return Err(SnapshotError::Empty);
        }

        for balance in &balances {
            debug!(
                currency = %balance.currency,
                available = %balance.available,
                frozen = %balance.frozen,
                "Snapshot balance"
            );
        }

        let count = store.install_snapshot(balances)?;
        info!(currencies = count, "Balance snapshot loaded");
        Ok(count)
    }
}

/// Snapshot over the exchange REST API
pub struct RestSnapshotSource {
    client: reqwest::Client,
    url: String,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct ListBalancesResponse {
    success: bool,
    #[serde(default)]
    msg: Option<serde_json::Value>,
    #[serde(default)]
    data: Option<WalletList>,
}

#[derive(Debug, Deserialize)]
struct WalletList {
    wallets: Vec<Wallet>,
}

#[derive(Debug, Deserialize)]
struct Wallet {
    coin: String,
    balances: WalletBalances,
}

#[derive(Debug, Deserialize)]
struct WalletBalances {
    #[serde(deserialize_with = "deserialize_decimal")]
    available: Decimal,
    #[serde(deserialize_with = "deserialize_decimal")]
    frozen: Decimal,
}

impl RestSnapshotSource {
    pub fn new(config: &Config) -> Result<Self, SnapshotError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| SnapshotError::Source(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}/api/v1/data/listbalances/", config.api_url.trim_end_matches('/')),
            api_token: config.api_token.clone(),
        })
    }
}

#[async_trait]
impl SnapshotSource for RestSnapshotSource {
    async fn fetch_balances(&self) -> Result<Vec<CurrencyBalance>, SnapshotError> {
        info!(url = %self.url, "Requesting balances");

        let response = self
            .client
            .get(&self.url)
            .header("Authorization", format!("Token {}", self.api_token))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| SnapshotError::Source(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SnapshotError::Source(e.to_string()))?;

        if !status.is_success() {
            return Err(SnapshotError::Source(format!("HTTP {}: {}", status, body)));
        }

        parse_list_balances(&body)
    }
}

/// Decode a `listbalances` response body
fn parse_list_balances(body: &str) -> Result<Vec<CurrencyBalance>, SnapshotError> {
    let response: ListBalancesResponse =
        serde_json::from_str(body).map_err(|e| SnapshotError::Malformed(e.to_string()))?;

    if !response.success {
        let msg = response
            .msg
            .map(|m| m.to_string())
            .unwrap_or_else(|| body.to_string());
        return Err(SnapshotError::Source(msg));
    }

    let wallets = response
        .data
        .ok_or_else(|| SnapshotError::Malformed("missing data".to_string()))?
        .wallets;

    Ok(wallets
        .into_iter()
        .map(|w| CurrencyBalance::new(&w.coin, w.balances.available, w.balances.frozen))
        .collect())
}
