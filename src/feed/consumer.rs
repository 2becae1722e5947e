//! Event feed consumer
//!
//! Single task that drains the notification channel and applies each
//! notification's deltas before reading the next one.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ledger::{BalanceStore, LedgerMetrics};
use crate::parser::Notification;
use crate::reducer;

/// Applies notifications to the balance store in delivery order
pub struct EventConsumer {
    store: Arc<BalanceStore>,
    metrics: Arc<LedgerMetrics>,
    rx: mpsc::Receiver<Notification>,
}

impl EventConsumer {
    pub fn new(
        store: Arc<BalanceStore>,
        metrics: Arc<LedgerMetrics>,
        rx: mpsc::Receiver<Notification>,
    ) -> Self {
        Self { store, metrics, rx }
    }

    /// Consume until every sender is dropped. Returns the number of
    /// notifications handled.
    pub async fn run(mut self) -> u64 {
        // Notifications queued before the snapshot lands wait in the channel
        self.store.wait_ready().await;
        info!("Event consumer started");

        let mut handled = 0u64;
        while let Some(notification) = self.rx.recv().await {
            self.handle(&notification);
            handled += 1;
        }

        info!(handled, "Notification channel closed, event consumer stopped");
        handled
    }

    /// Reduce one notification and apply its deltas as one unit
    pub fn handle(&self, notification: &Notification) {
        let deltas = reducer::reduce(notification);
        if deltas.is_empty() {
            self.metrics.notifications_ignored.inc();
            debug!(notification = ?notification, "Ignoring notification");
            return;
        }

        let report = match self.store.apply_deltas(&deltas) {
            Ok(report) => report,
            Err(e) => {
                self.metrics.notifications_rejected.inc();
                warn!(error = %e, notification = ?notification, "Notification rejected, balances unchanged");
                return;
            }
        };

        self.metrics.notifications_applied.inc();
        self.metrics
            .unknown_currencies
            .inc_by(report.materialized.len() as u64);
        self.metrics.currencies.set(self.store.len() as i64);

        for violation in &report.violations {
            self.metrics.invariant_violations.inc();
            warn!(
                currency = %violation.currency,
                field = %violation.field,
                value = %violation.value,
                notification = ?notification,
                "Balance invariant violated, upstream event missed or duplicated"
            );
        }

        for delta in &deltas {
            debug!(
                currency = %delta.currency,
                available = %delta.available,
                frozen = %delta.frozen,
                "Applied delta"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::CurrencyBalance;
    use crate::parser::{Side, TradeFill, Transfer, TransferDirection};
    use rust_decimal_macros::dec;

    fn setup() -> (Arc<BalanceStore>, Arc<LedgerMetrics>) {
        let store = Arc::new(BalanceStore::new());
        let metrics = Arc::new(LedgerMetrics::new().unwrap());
        (store, metrics)
    }

    fn install(store: &BalanceStore) {
        store
            .install_snapshot(vec![
                CurrencyBalance::new("BTC", dec!(1.5), dec!(0)),
                CurrencyBalance::new("USD", dec!(1000), dec!(0)),
            ])
            .unwrap();
    }

    fn deposit(currency: &str, amount: rust_decimal::Decimal) -> Notification {
        Notification::Transfer(Transfer {
            currency: currency.into(),
            amount,
            direction: TransferDirection::Deposit,
        })
    }

    #[tokio::test]
    async fn test_applies_after_snapshot_in_order() {
        let (store, metrics) = setup();
        let (tx, rx) = mpsc::channel(16);
        let consumer = tokio::spawn(EventConsumer::new(store.clone(), metrics.clone(), rx).run());

        // Queued before the snapshot; must not be lost or reordered
        tx.send(deposit("BTC", dec!(0.5))).await.unwrap();
        tx.send(Notification::Trade(TradeFill {
            side: Side::Sell,
            left_coin: "BTC".into(),
            right_coin: "USD".into(),
            amount_received: dec!(100),
            amount_paid: dec!(0.1),
        }))
        .await
        .unwrap();
        tx.send(Notification::Other("OP".into())).await.unwrap();

        tokio::task::yield_now().await;
        install(&store);
        drop(tx);

        assert_eq!(consumer.await.unwrap(), 3);
        assert_eq!(store.get("BTC").unwrap().available, dec!(1.9));
        assert_eq!(store.get("USD").unwrap().available, dec!(1100));
        assert_eq!(metrics.notifications_applied.get(), 2);
        assert_eq!(metrics.notifications_ignored.get(), 1);
    }

    #[test]
    fn test_handle_records_violation_and_keeps_going() {
        let (store, metrics) = setup();
        install(&store);
        let (_tx, rx) = mpsc::channel(1);
        let consumer = EventConsumer::new(store.clone(), metrics.clone(), rx);

        consumer.handle(&Notification::Transfer(Transfer {
            currency: "BTC".into(),
            amount: dec!(2),
            direction: TransferDirection::Withdrawal,
        }));
        assert_eq!(store.get("BTC").unwrap().available, dec!(-0.5));
        assert_eq!(metrics.invariant_violations.get(), 1);

        consumer.handle(&deposit("BTC", dec!(1)));
        assert_eq!(store.get("BTC").unwrap().available, dec!(0.5));
        assert_eq!(metrics.notifications_applied.get(), 2);
    }

    #[test]
    fn test_overflowing_trade_is_rejected_whole() {
        let (store, metrics) = setup();
        install(&store);
        let (_tx, rx) = mpsc::channel(1);
        let consumer = EventConsumer::new(store.clone(), metrics.clone(), rx);

        let raw = r#"{"type": "TD", "object": {"side": "SELL", "left_coin": "BTC", "right_coin": "USD",
            "amount_received": "79228162514264337593543950335", "amount_paid": "0.1"}}"#;
        consumer.handle(&Notification::parse(raw).unwrap());

        let (btc, usd) = store.get_pair("BTC", "USD").unwrap();
        assert_eq!(btc.available, dec!(1.5));
        assert_eq!(usd.available, dec!(1000));
        assert_eq!(metrics.notifications_rejected.get(), 1);
        assert_eq!(metrics.notifications_applied.get(), 0);

        consumer.handle(&deposit("BTC", dec!(0.5)));
        assert_eq!(store.get("BTC").unwrap().available, dec!(2.0));
        assert_eq!(metrics.notifications_applied.get(), 1);
    }

    #[test]
    fn test_handle_materializes_unknown_currency() {
        let (store, metrics) = setup();
        install(&store);
        let (_tx, rx) = mpsc::channel(1);
        let consumer = EventConsumer::new(store.clone(), metrics.clone(), rx);

        consumer.handle(&deposit("ETH", dec!(4)));
        assert_eq!(store.get("ETH").unwrap().available, dec!(4));
        assert_eq!(metrics.unknown_currencies.get(), 1);
        assert_eq!(metrics.currencies.get(), 3);
    }

    #[test]
    fn test_replay_double_applies() {
        let (store, metrics) = setup();
        install(&store);
        let (_tx, rx) = mpsc::channel(1);
        let consumer = EventConsumer::new(store.clone(), metrics, rx);

        let event = deposit("BTC", dec!(0.5));
        consumer.handle(&event);
        consumer.handle(&event);
        assert_eq!(store.get("BTC").unwrap().available, dec!(2.5));
    }
}
