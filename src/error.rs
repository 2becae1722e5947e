//! Error types for the balance ledger

use rust_decimal::Decimal;
use thiserror::Error;

/// Which half of a currency balance a violation was detected on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceField {
    Available,
    Frozen,
}

impl std::fmt::Display for BalanceField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BalanceField::Available => f.write_str("available"),
            BalanceField::Frozen => f.write_str("frozen"),
        }
    }
}

/// A delta drove a balance below zero.
///
/// The delta has still been applied when this is reported; it points at a
/// missed or duplicated upstream event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{currency} {field} balance went negative: {value}")]
pub struct InvariantViolation {
    pub currency: String,
    pub field: BalanceField,
    pub value: Decimal,
}

/// Failures of the one-shot startup snapshot. All of them are fatal.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("snapshot source failed: {0}")]
    Source(String),

    #[error("malformed snapshot: {0}")]
    Malformed(String),

    #[error("snapshot returned no balances")]
    Empty,

    #[error("snapshot already loaded")]
    AlreadyLoaded,
}

/// Errors returned to query callers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("balances not loaded yet")]
    NotReady,

    #[error("invalid market identifier: {0:?}")]
    InvalidMarket(String),

    #[error("unknown currency: {0}")]
    UnknownCurrency(String),
}

/// Balance ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error(transparent)]
    InvariantViolation(#[from] InvariantViolation),

    #[error("Feed disconnected: {0}")]
    FeedDisconnected(String),

    #[error("Feed message error: {0}")]
    FeedMessage(String),

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("REST API error: {0}")]
    RestApiError(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Balances not loaded yet")]
    NotReady,

    #[error("Balance of {0} would overflow")]
    BalanceOverflow(String),

    #[error("Connection timeout")]
    ConnectionTimeout,
}

impl From<tokio_tungstenite::tungstenite::Error> for LedgerError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        LedgerError::FeedDisconnected(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::ParseError(err.to_string())
    }
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        LedgerError::RestApiError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
