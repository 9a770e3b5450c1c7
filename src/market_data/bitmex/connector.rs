use serde_json::json;
use std::time::Duration;

use crate::market_data::bitmex::message::parse_frame;
use crate::market_data::connector::{MarketDataError, RequestIds, StreamProtocol};
use crate::market_data::price_cache::QuoteUpdate;
use crate::model::Venue;

pub const BITMEX_WS_URL: &str = "wss://ws.bitmex.com/realtime";
pub const BITMEX_TESTNET_WS_URL: &str = "wss://ws.testnet.bitmex.com/realtime";

const TOPIC: &str = "instrument";
const PING_INTERVAL: Duration = Duration::from_secs(5);

/// One shared `instrument` topic covering every symbol.
pub struct BitmexInstrumentStream {
    url: String,
}

impl BitmexInstrumentStream {
    pub fn new(testnet: bool, url_override: Option<String>) -> Self {
        let url = url_override.unwrap_or_else(|| {
            if testnet {
                BITMEX_TESTNET_WS_URL.to_string()
            } else {
                BITMEX_WS_URL.to_string()
            }
        });
        Self { url }
    }
}

impl StreamProtocol for BitmexInstrumentStream {
    fn venue(&self) -> Venue {
        Venue::Bitmex
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn subscribe_requests(&self, _symbols: &[String], _ids: &mut RequestIds) -> Vec<String> {
        vec![json!({ "op": "subscribe", "args": [TOPIC] }).to_string()]
    }

    fn parse(&self, text: &str) -> Result<Vec<QuoteUpdate>, MarketDataError> {
        parse_frame(text)
    }

    fn keepalive(&self) -> Option<(Duration, &'static str)> {
        Some((PING_INTERVAL, "ping"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_single_topic_subscription() {
        let stream = BitmexInstrumentStream::new(false, None);
        assert_eq!(stream.url(), BITMEX_WS_URL);

        let requests = stream.subscribe_requests(
            &["XBTUSD".to_string(), "ETHUSD".to_string()],
            &mut RequestIds::new(),
        );
        assert_eq!(requests.len(), 1);

        let payload: Value = serde_json::from_str(&requests[0]).unwrap();
        assert_eq!(payload["op"], "subscribe");
        assert_eq!(payload["args"], serde_json::json!(["instrument"]));
    }

    #[test]
    fn test_keepalive_is_text_ping() {
        let stream = BitmexInstrumentStream::new(true, None);
        assert_eq!(stream.url(), BITMEX_TESTNET_WS_URL);
        assert_eq!(stream.keepalive(), Some((Duration::from_secs(5), "ping")));
    }
}
