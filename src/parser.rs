//! Parser module for exchange notification messages
//!
//! Decodes feed frames once, at the boundary, into the typed
//! [`Notification`] variant. Everything past this point works on typed data.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::str::FromStr;

use crate::error::{LedgerError, Result};

/// Socket.IO event carrying account notifications
const NOTIFICATION_EVENT: &str = "notification";

/// Trade side as reported by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl FromStr for Side {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(LedgerError::ParseError(format!("unknown trade side {:?}", other))),
        }
    }
}

/// Direction of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Deposit,
    Withdrawal,
}

impl FromStr for TransferDirection {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deposit" => Ok(TransferDirection::Deposit),
            "withdrawal" => Ok(TransferDirection::Withdrawal),
            other => Err(LedgerError::ParseError(format!(
                "unknown transfer direction {:?}",
                other
            ))),
        }
    }
}

/// Executed trade (taker trade or maker order fill) on a market
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeFill {
    pub side: Side,
    pub left_coin: String,
    pub right_coin: String,
    pub amount_received: Decimal,
    pub amount_paid: Decimal,
}

/// Deposit or withdrawal of a single currency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub currency: String,
    pub amount: Decimal,
    pub direction: TransferDirection,
}

/// Account notification, decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Trade(TradeFill),
    Transfer(Transfer),
    /// Any kind the ledger does not track, by its type tag
    Other(String),
}

/// Notification envelope as sent by the exchange
#[derive(Debug, Clone, Deserialize)]
struct RawNotification {
    #[serde(rename = "type")]
    kind: String,

    #[serde(default)]
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawTrade {
    side: String,
    left_coin: String,
    right_coin: String,
    #[serde(deserialize_with = "deserialize_decimal")]
    amount_received: Decimal,
    #[serde(deserialize_with = "deserialize_decimal")]
    amount_paid: Decimal,
}

#[derive(Debug, Deserialize)]
struct RawTransfer {
    coin: String,
    #[serde(default, deserialize_with = "deserialize_opt_decimal")]
    amount: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_opt_decimal")]
    total_amount: Option<Decimal>,
    #[serde(rename = "type")]
    direction: String,
}

impl Notification {
    /// Decode a notification from its JSON value
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let raw: RawNotification = serde_json::from_value(value)?;

        match raw.kind.as_str() {
            // Trade executed, and market maker order filled
            "TD" | "OF" => {
                let t: RawTrade = serde_json::from_value(raw.object)?;
                ensure_non_negative("amount_received", t.amount_received)?;
                ensure_non_negative("amount_paid", t.amount_paid)?;
                Ok(Notification::Trade(TradeFill {
                    side: t.side.parse()?,
                    left_coin: non_empty("left_coin", t.left_coin)?,
                    right_coin: non_empty("right_coin", t.right_coin)?,
                    amount_received: t.amount_received,
                    amount_paid: t.amount_paid,
                }))
            }
            // Deposit or withdrawal
            "TR" => {
                let t: RawTransfer = serde_json::from_value(raw.object)?;
                let amount = t.amount.or(t.total_amount).ok_or_else(|| {
                    LedgerError::ParseError("transfer without amount".to_string())
                })?;
                ensure_non_negative("amount", amount)?;
                Ok(Notification::Transfer(Transfer {
                    currency: non_empty("coin", t.coin)?,
                    amount,
                    direction: t.direction.parse()?,
                }))
            }
            _ => Ok(Notification::Other(raw.kind)),
        }
    }

    /// Decode a notification from a JSON string
    pub fn parse(raw: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(raw)?)
    }
}

fn non_empty(field: &str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        return Err(LedgerError::ParseError(format!("{} is empty", field)));
    }
    Ok(value)
}

fn ensure_non_negative(field: &str, value: Decimal) -> Result<()> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(LedgerError::ParseError(format!("{} is negative: {}", field, value)));
    }
    Ok(())
}

/// Parsed feed frame
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedMessage {
    Notification(Notification),
    /// Engine.IO ping, must be answered with a pong
    Ping,
    /// Handshake, ack and other transport control frames
    Control(String),
    /// Socket.IO event other than notifications
    Unknown(String),
}

impl ParsedMessage {
    /// Parse a raw feed frame.
    ///
    /// Accepts Socket.IO event frames (`42["notification",{...}]`), Engine.IO
    /// control frames, and bare JSON notifications.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();

        if raw.starts_with('{') {
            return Ok(ParsedMessage::Notification(Notification::parse(raw)?));
        }

        if let Some(payload) = raw.strip_prefix("42") {
            // An optional namespace ("42/ns,[...]") precedes the event array
            let payload = match payload.find('[') {
                Some(idx) => &payload[idx..],
                None => return Ok(ParsedMessage::Control(raw.to_string())),
            };
            let mut event: Vec<serde_json::Value> = serde_json::from_str(payload)?;
            if event.len() < 2 {
                return Ok(ParsedMessage::Unknown(raw.to_string()));
            }
            let data = event.swap_remove(1);
            return match event[0].as_str() {
                Some(NOTIFICATION_EVENT) => {
                    Ok(ParsedMessage::Notification(Notification::from_value(data)?))
                }
                _ => Ok(ParsedMessage::Unknown(raw.to_string())),
            };
        }

        if raw == "2" {
            return Ok(ParsedMessage::Ping);
        }

        Ok(ParsedMessage::Control(raw.to_string()))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDecimal {
    Str(String),
    Num(serde_json::Number),
}

impl RawDecimal {
    fn into_decimal(self) -> std::result::Result<Decimal, String> {
        let s = match self {
            RawDecimal::Str(s) => s,
            RawDecimal::Num(n) => n.to_string(),
        };
        let s = s.trim();
        Decimal::from_str(s)
            .or_else(|_| Decimal::from_scientific(s))
            .map_err(|e| format!("invalid decimal {:?}: {}", s, e))
    }
}

/// Deserialize a Decimal from a JSON string or number, never via f64
pub(crate) fn deserialize_decimal<'de, D>(deserializer: D) -> std::result::Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    RawDecimal::deserialize(deserializer)?
        .into_decimal()
        .map_err(serde::de::Error::custom)
}

fn deserialize_opt_decimal<'de, D>(deserializer: D) -> std::result::Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawDecimal>::deserialize(deserializer)? {
        Some(raw) => raw.into_decimal().map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}
