//! Event reducer
//!
//! Translates decoded notifications into balance deltas. Pure: nothing here
//! touches the store.

use rust_decimal::Decimal;

use crate::ledger::BalanceDelta;
use crate::parser::{Notification, Side, TradeFill, Transfer, TransferDirection};

/// A trade with its legs resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trade {
    pub received_currency: String,
    pub received_amount: Decimal,
    pub paid_currency: String,
    pub paid_amount: Decimal,
}

impl Trade {
    pub fn from_fill(fill: &TradeFill) -> Self {
        let (received, paid) = resolve_legs(fill.side, &fill.left_coin, &fill.right_coin);
        Self {
            received_currency: received.to_string(),
            received_amount: fill.amount_received,
            paid_currency: paid.to_string(),
            paid_amount: fill.amount_paid,
        }
    }

    pub fn deltas(&self) -> Vec<BalanceDelta> {
        vec![
            BalanceDelta::available(&self.received_currency, self.received_amount),
            BalanceDelta::available(&self.paid_currency, -self.paid_amount),
        ]
    }
}

/// Which currency of a `LEFT-RIGHT` market is received and which is paid.
///
/// Returns `(received, paid)`. A sell gives away the left (base) currency
/// for the right (quote) one; a buy is the inverse.
pub fn resolve_legs<'a>(side: Side, left: &'a str, right: &'a str) -> (&'a str, &'a str) {
    match side {
        Side::Sell => (right, left),
        Side::Buy => (left, right),
    }
}

/// Deltas for a deposit or withdrawal. Frozen balances are never touched.
pub fn transfer_deltas(transfer: &Transfer) -> Vec<BalanceDelta> {
    let amount = match transfer.direction {
        TransferDirection::Deposit => transfer.amount,
        TransferDirection::Withdrawal => -transfer.amount,
    };
    vec![BalanceDelta::available(&transfer.currency, amount)]
}

/// Deltas produced by one notification; empty for kinds the ledger ignores.
///
/// The deltas of one notification must be applied together.
pub fn reduce(notification: &Notification) -> Vec<BalanceDelta> {
    match notification {
        Notification::Trade(fill) => Trade::from_fill(fill).deltas(),
        Notification::Transfer(transfer) => transfer_deltas(transfer),
        Notification::Other(_) => Vec::new(),
    }
}
