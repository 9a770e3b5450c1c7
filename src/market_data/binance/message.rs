use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::market_data::connector::MarketDataError;
use crate::market_data::price_cache::QuoteUpdate;

/// `<symbol>@bookTicker` payload on the raw `/ws` endpoint.
#[derive(Debug, Deserialize)]
pub struct BinanceBookTicker {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "b")]
    pub best_bid: Decimal,
    #[serde(rename = "B", default)]
    pub best_bid_qty: Option<Decimal>,
    #[serde(rename = "a")]
    pub best_ask: Decimal,
    #[serde(rename = "A", default)]
    pub best_ask_qty: Option<Decimal>,
    #[serde(rename = "T", default)]
    pub transaction_time: Option<i64>,
    #[serde(rename = "E", default)]
    pub event_time: Option<i64>,
}

impl BinanceBookTicker {
    pub fn to_update(&self) -> QuoteUpdate {
        QuoteUpdate {
            symbol: self.symbol.clone(),
            bid: Some(self.best_bid),
            ask: Some(self.best_ask),
        }
    }
}

/// Classifies one text frame: event payloads carry `e`, command replies carry `id`.
pub fn parse_frame(text: &str) -> Result<Vec<QuoteUpdate>, MarketDataError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| MarketDataError::Parse(e.to_string()))?;

    if let Some(event) = value.get("e").and_then(Value::as_str) {
        if event != "bookTicker" {
            return Ok(Vec::new());
        }
        let ticker: BinanceBookTicker =
            serde_json::from_value(value).map_err(|e| MarketDataError::Parse(e.to_string()))?;
        return Ok(vec![ticker.to_update()]);
    }

    if let Some(error) = value.get("error") {
        return Err(MarketDataError::Subscription(format!(
            "request {} rejected: {}",
            value.get("id").cloned().unwrap_or(Value::Null),
            error
        )));
    }

    // {"result": null, "id": n}
    Ok(Vec::new())
}
