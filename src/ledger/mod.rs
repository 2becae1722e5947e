//! Balance ledger module
//!
//! Holds the per-currency balances of the account, bootstrapped from a
//! snapshot and kept current by notification deltas.

mod metrics;
mod snapshot;
mod store;

pub use metrics::LedgerMetrics;
pub use snapshot::{RestSnapshotSource, SnapshotLoader, SnapshotSource};
pub use store::{ApplyReport, BalanceStore};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Balance of a single currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CurrencyBalance {
    pub currency: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub available: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub frozen: Decimal,
}

impl CurrencyBalance {
    pub fn new(currency: &str, available: Decimal, frozen: Decimal) -> Self {
        Self {
            currency: normalize_currency(currency),
            available,
            frozen,
        }
    }

    /// Zero balance, used when a currency shows up that the snapshot never reported
    pub fn zero(currency: &str) -> Self {
        Self::new(currency, Decimal::ZERO, Decimal::ZERO)
    }
}

/// A signed change to one currency's balance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceDelta {
    pub currency: String,
    pub available: Decimal,
    pub frozen: Decimal,
}

impl BalanceDelta {
    /// Change to the available balance only
    pub fn available(currency: &str, amount: Decimal) -> Self {
        Self {
            currency: normalize_currency(currency),
            available: amount,
            frozen: Decimal::ZERO,
        }
    }
}

/// Canonical form of a currency identifier (trimmed, upper case)
pub fn normalize_currency(currency: &str) -> String {
    currency.trim().to_uppercase()
}
