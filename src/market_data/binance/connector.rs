use serde_json::json;

use crate::market_data::binance::message::parse_frame;
use crate::market_data::connector::{MarketDataError, RequestIds, StreamProtocol};
use crate::market_data::price_cache::QuoteUpdate;
use crate::model::Venue;

pub const BINANCE_WS_URL: &str = "wss://fstream.binance.com/ws";
pub const BINANCE_TESTNET_WS_URL: &str = "wss://fstream.binancefuture.com/ws";

const CHANNEL: &str = "bookTicker";
const MAX_STREAMS_PER_REQUEST: usize = 100;

/// Per-symbol `<symbol>@bookTicker` subscriptions on the raw stream endpoint.
pub struct BinanceBookTickerStream {
    url: String,
}

impl BinanceBookTickerStream {
    pub fn new(testnet: bool, url_override: Option<String>) -> Self {
        let url = url_override.unwrap_or_else(|| {
            if testnet {
                BINANCE_TESTNET_WS_URL.to_string()
            } else {
                BINANCE_WS_URL.to_string()
            }
        });
        Self { url }
    }
}

impl StreamProtocol for BinanceBookTickerStream {
    fn venue(&self) -> Venue {
        Venue::BinanceFutures
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn subscribe_requests(&self, symbols: &[String], ids: &mut RequestIds) -> Vec<String> {
        symbols
            .chunks(MAX_STREAMS_PER_REQUEST)
            .map(|chunk| {
                // Stream names must be lowercase
                let params: Vec<String> = chunk
                    .iter()
                    .map(|s| format!("{}@{}", s.to_lowercase(), CHANNEL))
                    .collect();
                json!({
                    "method": "SUBSCRIBE",
                    "params": params,
                    "id": ids.next_id(),
                })
                .to_string()
            })
            .collect()
    }

    fn parse(&self, text: &str) -> Result<Vec<QuoteUpdate>, MarketDataError> {
        parse_frame(text)
    }
}
