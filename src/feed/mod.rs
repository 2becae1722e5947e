//! Notification feed
//!
//! The manager owns the transport and pushes decoded notifications into a
//! bounded channel; the consumer drains it in order and applies the deltas.

mod client;
mod consumer;
mod manager;

pub use client::FeedClient;
pub use consumer::EventConsumer;
pub use manager::FeedManager;

use serde::Serialize;

/// Connection state of the notification feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedState {
    Disconnected,
    Connecting,
    Streaming,
}

impl std::fmt::Display for FeedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedState::Disconnected => f.write_str("disconnected"),
            FeedState::Connecting => f.write_str("connecting"),
            FeedState::Streaming => f.write_str("streaming"),
        }
    }
}
