//! Balance store
//!
//! One lock guards every currency, so a multi-currency delta (both legs of a
//! trade) is applied in a single critical section and readers see either
//! all of it or none of it.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::warn;

use super::{normalize_currency, BalanceDelta, CurrencyBalance};
use crate::error::{BalanceField, InvariantViolation, LedgerError, QueryError, SnapshotError};

/// Outcome of applying a group of deltas
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    /// Balances that went negative (the deltas were applied regardless)
    pub violations: Vec<InvariantViolation>,
    /// Currencies that were not in the snapshot and got created at zero
    pub materialized: Vec<String>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty() && self.materialized.is_empty()
    }
}

/// In-memory per-currency balances of the account
#[derive(Debug)]
pub struct BalanceStore {
    balances: RwLock<HashMap<String, CurrencyBalance>>,
    ready: watch::Sender<bool>,
    violations: AtomicU64,
}

impl Default for BalanceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BalanceStore {
    /// Create an empty store that is not ready yet
    pub fn new() -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            balances: RwLock::new(HashMap::new()),
            ready,
            violations: AtomicU64::new(0),
        }
    }

    /// Install the startup snapshot and mark the store ready.
    ///
    /// Insert-only: a second call fails with `AlreadyLoaded`.
    pub fn install_snapshot(&self, entries: Vec<CurrencyBalance>) -> Result<usize, SnapshotError> {
        if self.is_ready() {
            return Err(SnapshotError::AlreadyLoaded);
        }

        let mut fresh = HashMap::with_capacity(entries.len());
        for entry in entries {
            let currency = normalize_currency(&entry.currency);
            if currency.is_empty() {
                return Err(SnapshotError::Malformed("empty currency identifier".to_string()));
            }
            if entry.available.is_sign_negative() || entry.frozen.is_sign_negative() {
                return Err(SnapshotError::Malformed(format!(
                    "negative balance for {}: available {}, frozen {}",
                    currency, entry.available, entry.frozen
                )));
            }
            let balance = CurrencyBalance {
                currency: currency.clone(),
                available: entry.available,
                frozen: entry.frozen,
            };
            if fresh.insert(currency.clone(), balance).is_some() {
                return Err(SnapshotError::Malformed(format!(
                    "currency {} reported twice",
                    currency
                )));
            }
        }

        let count = fresh.len();
        {
            let mut balances = self.balances.write();
            if self.is_ready() {
                return Err(SnapshotError::AlreadyLoaded);
            }
            *balances = fresh;
            self.ready.send_replace(true);
        }

        Ok(count)
    }

    /// Whether the snapshot has been installed
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait until the snapshot has been installed
    pub async fn wait_ready(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Balance of a single currency
    pub fn get(&self, currency: &str) -> Result<CurrencyBalance, QueryError> {
        if !self.is_ready() {
            return Err(QueryError::NotReady);
        }
        let key = normalize_currency(currency);
        self.balances
            .read()
            .get(&key)
            .cloned()
            .ok_or(QueryError::UnknownCurrency(key))
    }

    /// Balances of two currencies read under one lock
    pub fn get_pair(
        &self,
        left: &str,
        right: &str,
    ) -> Result<(CurrencyBalance, CurrencyBalance), QueryError> {
        if !self.is_ready() {
            return Err(QueryError::NotReady);
        }
        let left = normalize_currency(left);
        let right = normalize_currency(right);

        let balances = self.balances.read();
        let l = balances
            .get(&left)
            .cloned()
            .ok_or_else(|| QueryError::UnknownCurrency(left.clone()))?;
        let r = balances
            .get(&right)
            .cloned()
            .ok_or_else(|| QueryError::UnknownCurrency(right.clone()))?;
        Ok((l, r))
    }

    /// Apply a group of deltas as one atomic unit.
    ///
    /// Every new balance is computed against a staged copy first and
    /// committed only if all of them succeed, so an overflowing leg leaves
    /// the store untouched. Deltas that drive a balance negative are still
    /// applied; the violation is returned in the report and counted.
    pub fn apply_deltas(&self, deltas: &[BalanceDelta]) -> Result<ApplyReport, LedgerError> {
        if !self.is_ready() {
            return Err(LedgerError::NotReady);
        }

        let mut report = ApplyReport::default();
        {
            let mut balances = self.balances.write();
            let mut staged: HashMap<String, CurrencyBalance> = HashMap::with_capacity(deltas.len());

            for delta in deltas {
                let key = normalize_currency(&delta.currency);
                let current = match staged.get(&key).or_else(|| balances.get(&key)) {
                    Some(balance) => balance.clone(),
                    None => {
                        report.materialized.push(key.clone());
                        CurrencyBalance::zero(&key)
                    }
                };

                let (available, frozen) = match (
                    current.available.checked_add(delta.available),
                    current.frozen.checked_add(delta.frozen),
                ) {
                    (Some(available), Some(frozen)) => (available, frozen),
                    _ => return Err(LedgerError::BalanceOverflow(key)),
                };

                if available < Decimal::ZERO {
                    report.violations.push(InvariantViolation {
                        currency: key.clone(),
                        field: BalanceField::Available,
                        value: available,
                    });
                }
                if frozen < Decimal::ZERO {
                    report.violations.push(InvariantViolation {
                        currency: key.clone(),
                        field: BalanceField::Frozen,
                        value: frozen,
                    });
                }

                staged.insert(
                    key.clone(),
                    CurrencyBalance {
                        currency: key,
                        available,
                        frozen,
                    },
                );
            }

            balances.extend(staged);
        }

        for currency in &report.materialized {
            warn!(currency = %currency, "Currency missing from snapshot, created at zero");
        }
        if !report.violations.is_empty() {
            self.violations
                .fetch_add(report.violations.len() as u64, Ordering::Relaxed);
        }

        Ok(report)
    }

    /// Apply a single delta; a resulting negative balance is reported as an error
    pub fn apply_delta(&self, delta: BalanceDelta) -> Result<(), LedgerError> {
        let report = self.apply_deltas(std::slice::from_ref(&delta))?;
        match report.violations.into_iter().next() {
            Some(violation) => Err(LedgerError::InvariantViolation(violation)),
            None => Ok(()),
        }
    }

    /// All balances, sorted by currency
    pub fn balances(&self) -> Vec<CurrencyBalance> {
        let mut all: Vec<CurrencyBalance> = self.balances.read().values().cloned().collect();
        all.sort_by(|a, b| a.currency.cmp(&b.currency));
        all
    }

    /// Number of currencies tracked
    pub fn len(&self) -> usize {
        self.balances.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total invariant violations seen since startup
    pub fn violation_count(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn create_test_store() -> BalanceStore {
        let store = BalanceStore::new();
        store
            .install_snapshot(vec![
                CurrencyBalance::new("BTC", dec!(1.5), dec!(0)),
                CurrencyBalance::new("USD", dec!(1000), dec!(0)),
            ])
            .unwrap();
        store
    }

    #[test]
    fn test_not_ready_before_snapshot() {
        let store = BalanceStore::new();
        assert!(!store.is_ready());
        assert_eq!(store.get("BTC"), Err(QueryError::NotReady));
        assert!(matches!(
            store.apply_deltas(&[BalanceDelta::available("BTC", dec!(1))]),
            Err(LedgerError::NotReady)
        ));
    }

    #[test]
    fn test_install_snapshot() {
        let store = create_test_store();
        assert!(store.is_ready());
        assert_eq!(store.len(), 2);

        let btc = store.get("btc").unwrap();
        assert_eq!(btc.currency, "BTC");
        assert_eq!(btc.available, dec!(1.5));
        assert_eq!(btc.frozen, dec!(0));
    }

    #[test]
    fn test_snapshot_is_insert_only() {
        let store = create_test_store();
        let err = store
            .install_snapshot(vec![CurrencyBalance::new("ETH", dec!(1), dec!(0))])
            .unwrap_err();
        assert!(matches!(err, SnapshotError::AlreadyLoaded));
        assert_eq!(store.get("ETH"), Err(QueryError::UnknownCurrency("ETH".into())));
    }

    #[test]
    fn test_snapshot_rejects_duplicates_and_negatives() {
        let store = BalanceStore::new();
        let err = store
            .install_snapshot(vec![
                CurrencyBalance::new("BTC", dec!(1), dec!(0)),
                CurrencyBalance::new("btc", dec!(2), dec!(0)),
            ])
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Malformed(_)));

        let err = store
            .install_snapshot(vec![CurrencyBalance::new("BTC", dec!(-1), dec!(0))])
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Malformed(_)));
        assert!(!store.is_ready());
    }

    #[test]
    fn test_zero_balances_are_kept() {
        let store = BalanceStore::new();
        store
            .install_snapshot(vec![CurrencyBalance::new("XLM", dec!(0), dec!(0))])
            .unwrap();
        assert_eq!(store.get("XLM").unwrap().available, dec!(0));
    }

    #[test]
    fn test_unknown_currency() {
        let store = create_test_store();
        assert_eq!(
            store.get_pair("ZZZ", "USD"),
            Err(QueryError::UnknownCurrency("ZZZ".into()))
        );
    }

    #[test]
    fn test_apply_trade_legs_together() {
        let store = create_test_store();
        let report = store
            .apply_deltas(&[
                BalanceDelta::available("USD", dec!(100)),
                BalanceDelta::available("BTC", dec!(-0.1)),
            ])
            .unwrap();
        assert!(report.is_clean());

        let (btc, usd) = store.get_pair("BTC", "USD").unwrap();
        assert_eq!(btc.available, dec!(1.4));
        assert_eq!(usd.available, dec!(1100));
    }

    #[test]
    fn test_negative_balance_is_applied_and_reported() {
        let store = create_test_store();
        let err = store
            .apply_delta(BalanceDelta::available("BTC", dec!(-2)))
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvariantViolation(InvariantViolation {
                field: BalanceField::Available,
                ..
            })
        ));
        assert_eq!(store.get("BTC").unwrap().available, dec!(-0.5));
        assert_eq!(store.violation_count(), 1);

        // Later deltas keep flowing
        store
            .apply_delta(BalanceDelta::available("BTC", dec!(1)))
            .unwrap();
        assert_eq!(store.get("BTC").unwrap().available, dec!(0.5));
    }

    #[test]
    fn test_frozen_violation() {
        let store = create_test_store();
        let report = store
            .apply_deltas(&[BalanceDelta {
                currency: "USD".into(),
                available: dec!(0),
                frozen: dec!(-1),
            }])
            .unwrap();
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].field, BalanceField::Frozen);
    }

    #[test]
    fn test_missing_currency_materialized_at_zero() {
        let store = create_test_store();
        let report = store
            .apply_deltas(&[BalanceDelta::available("ETH", dec!(3))])
            .unwrap();
        assert_eq!(report.materialized, vec!["ETH".to_string()]);
        assert!(report.violations.is_empty());
        assert_eq!(store.get("ETH").unwrap().available, dec!(3));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_overflowing_leg_rejects_whole_group() {
        let store = create_test_store();
        let err = store
            .apply_deltas(&[
                BalanceDelta::available("USD", Decimal::MAX),
                BalanceDelta::available("BTC", dec!(-0.1)),
            ])
            .unwrap_err();
        assert!(matches!(err, LedgerError::BalanceOverflow(ref c) if c == "USD"));

        let err = store
            .apply_deltas(&[
                BalanceDelta::available("BTC", dec!(-0.1)),
                BalanceDelta::available("ETH", dec!(1)),
                BalanceDelta::available("USD", Decimal::MAX),
            ])
            .unwrap_err();
        assert!(matches!(err, LedgerError::BalanceOverflow(_)));

        let (btc, usd) = store.get_pair("BTC", "USD").unwrap();
        assert_eq!(btc.available, dec!(1.5));
        assert_eq!(usd.available, dec!(1000));
        assert_eq!(store.get("ETH"), Err(QueryError::UnknownCurrency("ETH".into())));
        assert_eq!(store.violation_count(), 0);

        store
            .apply_delta(BalanceDelta::available("BTC", dec!(0.5)))
            .unwrap();
        assert_eq!(store.get("BTC").unwrap().available, dec!(2.0));
    }

    #[test]
    fn test_same_currency_twice_in_group() {
        let store = create_test_store();
        store
            .apply_deltas(&[
                BalanceDelta::available("BTC", dec!(1)),
                BalanceDelta::available("BTC", dec!(-0.25)),
            ])
            .unwrap();
        assert_eq!(store.get("BTC").unwrap().available, dec!(2.25));
    }

    #[test]
    fn test_readers_never_see_half_a_trade() {
        let store = Arc::new(create_test_store());
        let rounds = 2_000;

        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..rounds {
                    store
                        .apply_deltas(&[
                            BalanceDelta::available("USD", dec!(0.1)),
                            BalanceDelta::available("BTC", dec!(-0.0001)),
                        ])
                        .unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..rounds {
                        let (btc, usd) = store.get_pair("BTC", "USD").unwrap();
                        let btc_paid = dec!(1.5) - btc.available;
                        let usd_received = usd.available - dec!(1000);
                        assert_eq!(btc_paid * dec!(1000), usd_received);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.get("USD").unwrap().available, dec!(1200));
        assert_eq!(store.get("BTC").unwrap().available, dec!(1.3));
    }

    #[tokio::test]
    async fn test_wait_ready() {
        let store = Arc::new(BalanceStore::new());
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                store.wait_ready().await;
                store.get("BTC").unwrap().available
            })
        };

        tokio::task::yield_now().await;
        store
            .install_snapshot(vec![CurrencyBalance::new("BTC", dec!(2), dec!(0))])
            .unwrap();
        assert_eq!(waiter.await.unwrap(), dec!(2));
    }

    proptest! {
        #[test]
        fn prop_transfers_sum(amounts in proptest::collection::vec((any::<bool>(), 0i64..1_000_000_000), 0..64)) {
            let store = create_test_store();
            let mut expected = dec!(1.5);
            for (deposit, units) in amounts {
                let amount = Decimal::new(units, 8);
                let signed = if deposit { amount } else { -amount };
                expected += signed;
                let _ = store.apply_delta(BalanceDelta::available("BTC", signed));
            }
            prop_assert_eq!(store.get("BTC").unwrap().available, expected);
        }
    }
}
