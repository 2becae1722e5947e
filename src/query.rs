//! Balance query service
//!
//! Answers "what are my balances on market LEFT-RIGHT". Read-only.

use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::QueryError;
use crate::ledger::{normalize_currency, BalanceStore, CurrencyBalance};

const MARKET_DELIMITER: char = '-';

/// A market identifier split into its two currencies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketPair {
    pub left: String,
    pub right: String,
}

impl FromStr for MarketPair {
    type Err = QueryError;

    fn from_str(market: &str) -> Result<Self, Self::Err> {
        let mut parts = market.split(MARKET_DELIMITER);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(left), Some(right), None)
                if !left.trim().is_empty() && !right.trim().is_empty() =>
            {
                Ok(Self {
                    left: normalize_currency(left),
                    right: normalize_currency(right),
                })
            }
            _ => Err(QueryError::InvalidMarket(market.to_string())),
        }
    }
}

/// Balances of both currencies of a market, read at the same instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MarketBalances {
    pub left: CurrencyBalance,
    pub right: CurrencyBalance,
}

/// Read side of the ledger
#[derive(Clone)]
pub struct QueryService {
    store: Arc<BalanceStore>,
}

impl QueryService {
    pub fn new(store: Arc<BalanceStore>) -> Self {
        Self { store }
    }

    /// Balances for a `LEFT-RIGHT` market identifier
    pub fn get_balances(&self, market: &str) -> Result<MarketBalances, QueryError> {
        if !self.store.is_ready() {
            return Err(QueryError::NotReady);
        }
        let pair: MarketPair = market.parse()?;
        let (left, right) = self.store.get_pair(&pair.left, &pair.right)?;
        Ok(MarketBalances { left, right })
    }

    /// Every tracked balance, sorted by currency
    pub fn list_balances(&self) -> Result<Vec<CurrencyBalance>, QueryError> {
        if !self.store.is_ready() {
            return Err(QueryError::NotReady);
        }
        Ok(self.store.balances())
    }
}
