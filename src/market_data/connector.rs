use std::time::Duration;
use thiserror::Error;

use crate::market_data::price_cache::QuoteUpdate;
use crate::model::Venue;

#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Subscription failed: {0}")]
    Subscription(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Stream closed")]
    StreamClosed,
}

/// Connection lifecycle of a stream client. There is no terminal state; the
/// client only stops on an explicit shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Disconnected,
    Connecting,
    Connected,
}

/// Subscription request ids, scoped to a single connection.
#[derive(Debug)]
pub struct RequestIds {
    next: u64,
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestIds {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Venue-specific wire conventions for the top-of-book stream.
pub trait StreamProtocol: Send + Sync + 'static {
    fn venue(&self) -> Venue;

    fn url(&self) -> &str;

    /// Text frames to send right after connecting, covering `symbols`.
    fn subscribe_requests(&self, symbols: &[String], ids: &mut RequestIds) -> Vec<String>;

    /// Quote updates carried by one text frame. Non-quote frames (acks,
    /// welcome banners, pongs) yield an empty list.
    fn parse(&self, text: &str) -> Result<Vec<QuoteUpdate>, MarketDataError>;

    /// Application-level keepalive frame and its interval, if the venue wants one.
    fn keepalive(&self) -> Option<(Duration, &'static str)> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_start_at_one_and_increase() {
        let mut ids = RequestIds::new();
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
        assert_eq!(RequestIds::default().next_id(), 1);
    }
}
