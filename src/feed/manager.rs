//! Feed connection manager
//!
//! Handles reconnection logic and hands decoded notifications to the
//! consumer channel in the order they arrive.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, trace, warn};

use super::{FeedClient, FeedState};
use crate::config::Config;
use crate::error::{LedgerError, Result};
use crate::ledger::{BalanceStore, LedgerMetrics};
use crate::parser::{Notification, ParsedMessage};

/// Maximum backoff delay in milliseconds (60 seconds)
const MAX_BACKOFF_MS: u64 = 60_000;
/// Cooldown period after which reconnect attempts are reset (5 minutes)
const RECONNECT_COOLDOWN_SECS: u64 = 300;
/// Idle time after which a keepalive ping is sent
const KEEPALIVE_AFTER: Duration = Duration::from_secs(30);
/// Engine.IO pong frame
const PONG_FRAME: &str = "3";

/// Manages the feed connection with automatic reconnection
pub struct FeedManager {
    client: FeedClient,
    store: Arc<BalanceStore>,
    metrics: Arc<LedgerMetrics>,
    tx: mpsc::Sender<Notification>,
    state: watch::Sender<FeedState>,
    reconnect_delay_ms: u64,
    reconnect_attempts: u32,
    last_successful_connection: Option<Instant>,
}

impl FeedManager {
    pub fn new(
        config: &Config,
        session_token: String,
        store: Arc<BalanceStore>,
        metrics: Arc<LedgerMetrics>,
        tx: mpsc::Sender<Notification>,
        state: watch::Sender<FeedState>,
    ) -> Self {
        Self {
            client: FeedClient::new(&config.ws_endpoint, session_token),
            store,
            metrics,
            tx,
            state,
            reconnect_delay_ms: config.reconnect_delay_ms,
            reconnect_attempts: 0,
            last_successful_connection: None,
        }
    }

    fn set_state(&self, state: FeedState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            info!(from = %previous, to = %state, "Feed state changed");
        }
    }

    /// Run until the consumer goes away, reconnecting on every transport loss.
    ///
    /// Events missed while disconnected are not replayed.
    pub async fn run(&mut self) -> Result<()> {
        if !self.store.is_ready() {
            info!("Waiting for balance snapshot before streaming");
            self.store.wait_ready().await;
        }

        info!("Starting feed manager with infinite retry");

        loop {
            // Reset reconnect attempts if we've been stable for a while
            if let Some(last_success) = self.last_successful_connection {
                if last_success.elapsed() > Duration::from_secs(RECONNECT_COOLDOWN_SECS)
                    && self.reconnect_attempts > 0
                {
                    info!(
                        previous_attempts = self.reconnect_attempts,
                        "Resetting reconnect counter after cooldown period"
                    );
                    self.reconnect_attempts = 0;
                }
            }

            match self.connect_and_process().await {
                Ok(()) => {
                    info!("Consumer channel closed, stopping feed");
                    self.client.close().await;
                    self.set_state(FeedState::Disconnected);
                    return Ok(());
                }
                Err(e) => {
                    error!(error = %e, "Feed error");
                    self.client.close().await;
                    self.set_state(FeedState::Disconnected);
                    self.reconnect_attempts += 1;
                    self.metrics.feed_reconnects.inc();

                    let delay = backoff_delay(self.reconnect_delay_ms, self.reconnect_attempts);
                    warn!(
                        attempt = self.reconnect_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Reconnecting after error..."
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Connect and forward notifications; `Ok` means the consumer is gone
    async fn connect_and_process(&mut self) -> Result<()> {
        self.set_state(FeedState::Connecting);
        self.client.connect().await?;

        self.last_successful_connection = Some(Instant::now());
        self.set_state(FeedState::Streaming);

        let mut last_message = Instant::now();
        let recv_timeout = Duration::from_secs(45);

        loop {
            match timeout(recv_timeout, self.client.recv()).await {
                Ok(Ok(Some(text))) => {
                    last_message = Instant::now();
                    if !self.process_frame(&text).await? {
                        return Ok(());
                    }
                }
                Ok(Ok(None)) => self.keepalive(last_message.elapsed()).await?,
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    warn!(
                        last_message_secs = last_message.elapsed().as_secs(),
                        "No message received within timeout, sending keepalive"
                    );
                    if let Err(e) = self.client.ping().await {
                        warn!(error = %e, "Failed to send keepalive ping, reconnecting");
                        return Err(LedgerError::ConnectionTimeout);
                    }
                }
            }
        }
    }

    /// Ping once the connection has been quiet for `KEEPALIVE_AFTER`.
    /// A failed ping ends the connection.
    async fn keepalive(&mut self, idle: Duration) -> Result<()> {
        if idle <= KEEPALIVE_AFTER {
            return Ok(());
        }
        self.client.ping().await.map_err(|e| {
            warn!(error = %e, "Failed to send keepalive ping, reconnecting");
            e
        })
    }

    /// Handle one frame; returns false once the consumer channel is closed
    async fn process_frame(&mut self, raw: &str) -> Result<bool> {
        let parsed = match ParsedMessage::parse(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.metrics.decode_errors.inc();
                warn!(error = %e, payload = %raw, "Dropping undecodable feed message");
                return Ok(true);
            }
        };

        match parsed {
            ParsedMessage::Notification(notification) => {
                trace!(notification = ?notification, "Notification received");
                if self.tx.send(notification).await.is_err() {
                    return Ok(false);
                }
            }
            ParsedMessage::Ping => {
                self.client.send_text(PONG_FRAME).await?;
            }
            ParsedMessage::Control(frame) => {
                debug!(frame = %frame, "Feed control frame");
            }
            ParsedMessage::Unknown(msg) => {
                trace!(msg = %msg, "Unknown feed event");
            }
        }

        Ok(true)
    }
}

/// Exponential backoff, capped at `MAX_BACKOFF_MS`
fn backoff_delay(base_ms: u64, attempts: u32) -> Duration {
    let delay = base_ms.saturating_mul(2u64.pow(attempts.min(6)));
    Duration::from_millis(delay.min(MAX_BACKOFF_MS))
}
