//! WebSocket client for the notification feed
//!
//! Handles connection and message reception.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::error::{LedgerError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client for a single feed connection
pub struct FeedClient {
    stream: Option<WsStream>,
    endpoint: String,
    session_token: String,
}

impl FeedClient {
    pub fn new(endpoint: &str, session_token: String) -> Self {
        Self {
            stream: None,
            endpoint: endpoint.to_string(),
            session_token,
        }
    }

    /// Feed URL with the session token attached
    fn url(&self) -> String {
        let sep = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{}token={}", self.endpoint, sep, self.session_token)
    }

    /// Connect to the feed endpoint
    pub async fn connect(&mut self) -> Result<()> {
        info!(endpoint = %self.endpoint, "Connecting to notification feed");

        let (ws_stream, response) = connect_async(self.url()).await.map_err(|e| {
            LedgerError::FeedDisconnected(format!("Failed to connect: {}", e))
        })?;

        info!(status = ?response.status(), "Notification feed connected");
        self.stream = Some(ws_stream);

        Ok(())
    }

    /// Receive the next text payload; `None` for frames with no payload
    pub async fn recv(&mut self) -> Result<Option<String>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| LedgerError::FeedDisconnected("Not connected".to_string()))?;

        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                debug!(len = text.len(), "Received text message");
                Ok(Some(text))
            }
            Some(Ok(Message::Binary(data))) => Ok(Some(String::from_utf8_lossy(&data).to_string())),
            Some(Ok(Message::Ping(data))) => {
                debug!("Received ping, sending pong");
                if let Some(stream) = self.stream.as_mut() {
                    let _ = stream.send(Message::Pong(data)).await;
                }
                Ok(None)
            }
            Some(Ok(Message::Pong(_))) => Ok(None),
            Some(Ok(Message::Close(frame))) => {
                warn!(frame = ?frame, "Received close frame");
                self.stream = None;
                Err(LedgerError::FeedDisconnected("Connection closed".to_string()))
            }
            Some(Ok(Message::Frame(_))) => Ok(None),
            Some(Err(e)) => {
                error!(error = %e, "WebSocket error");
                self.stream = None;
                Err(LedgerError::FeedMessage(e.to_string()))
            }
            None => {
                warn!("WebSocket stream ended");
                self.stream = None;
                Err(LedgerError::FeedDisconnected("Stream ended".to_string()))
            }
        }
    }

    /// Send a text frame
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| LedgerError::FeedDisconnected("Not connected".to_string()))?;
        stream
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|e| LedgerError::FeedMessage(e.to_string()))
    }

    /// Send a ping to keep connection alive
    pub async fn ping(&mut self) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| LedgerError::FeedDisconnected("Not connected".to_string()))?;

        stream
            .send(Message::Ping(vec![]))
            .await
            .map_err(|e| LedgerError::FeedMessage(e.to_string()))
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Close the connection
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
    }
}
