use rust_decimal::Decimal;
use serde::Deserialize;

use crate::market_data::connector::MarketDataError;
use crate::market_data::price_cache::QuoteUpdate;

#[derive(Debug, Deserialize)]
pub struct BitmexWsMessage {
    pub table: Option<String>,
    pub action: Option<String>,
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
    // Command replies
    pub success: Option<bool>,
    pub subscribe: Option<String>,
    pub error: Option<String>,
    pub info: Option<String>,
}

/// One row of the `instrument` table. Updates only carry changed columns.
#[derive(Debug, Deserialize)]
pub struct BitmexInstrumentRow {
    pub symbol: String,
    #[serde(rename = "bidPrice", default)]
    pub bid_price: Option<Decimal>,
    #[serde(rename = "askPrice", default)]
    pub ask_price: Option<Decimal>,
}

impl BitmexInstrumentRow {
    pub fn to_update(&self) -> Option<QuoteUpdate> {
        if self.bid_price.is_none() && self.ask_price.is_none() {
            return None;
        }
        Some(QuoteUpdate {
            symbol: self.symbol.clone(),
            bid: self.bid_price,
            ask: self.ask_price,
        })
    }
}

pub fn parse_frame(text: &str) -> Result<Vec<QuoteUpdate>, MarketDataError> {
    // Reply to the text keepalive
    if text == "pong" {
        return Ok(Vec::new());
    }

    let msg: BitmexWsMessage =
        serde_json::from_str(text).map_err(|e| MarketDataError::Parse(e.to_string()))?;

    if let Some(error) = msg.error {
        return Err(MarketDataError::Subscription(error));
    }

    if msg.table.as_deref() != Some("instrument") {
        return Ok(Vec::new());
    }

    let mut updates = Vec::with_capacity(msg.data.len());
    for row in msg.data {
        let row: BitmexInstrumentRow =
            serde_json::from_value(row).map_err(|e| MarketDataError::Parse(e.to_string()))?;
        if let Some(update) = row.to_update() {
            updates.push(update);
        }
    }
    Ok(updates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_instrument_update_with_bid_only() {
        let text = r#"{"table":"instrument","action":"update","data":[{"symbol":"XBTUSD","bidPrice":42000.5,"timestamp":"2024-01-01T00:00:00.000Z"}]}"#;
        let updates = parse_frame(text).unwrap();
        assert_eq!(
            updates,
            vec![QuoteUpdate {
                symbol: "XBTUSD".into(),
                bid: Some(dec!(42000.5)),
                ask: None,
            }]
        );
    }

    #[test]
    fn test_rows_without_quotes_are_skipped() {
        let text = r#"{"table":"instrument","action":"update","data":[{"symbol":"XBTUSD","fundingRate":0.0001},{"symbol":"ETHUSD","askPrice":2200.05,"bidPrice":null}]}"#;
        let updates = parse_frame(text).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].symbol, "ETHUSD");
        assert_eq!(updates[0].bid, None);
        assert_eq!(updates[0].ask, Some(dec!(2200.05)));
    }

    #[test]
    fn test_control_frames_are_ignored() {
        assert!(parse_frame("pong").unwrap().is_empty());
        assert!(parse_frame(r#"{"info":"Welcome to the BitMEX Realtime API.","version":"2.0.0"}"#)
            .unwrap()
            .is_empty());
        assert!(parse_frame(r#"{"success":true,"subscribe":"instrument","request":{"op":"subscribe","args":["instrument"]}}"#)
            .unwrap()
            .is_empty());
        assert!(parse_frame(r#"{"table":"trade","action":"insert","data":[{"symbol":"XBTUSD","price":1}]}"#)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_row_without_symbol_is_parse_error() {
        let text = r#"{"table":"instrument","action":"update","data":[{"bidPrice":1.5}]}"#;
        assert!(matches!(parse_frame(text), Err(MarketDataError::Parse(_))));
    }

    #[test]
    fn test_error_reply_is_subscription_error() {
        let text = r#"{"status":400,"error":"Unknown table: instrumnt","meta":{}}"#;
        assert!(matches!(
            parse_frame(text),
            Err(MarketDataError::Subscription(_))
        ));
    }
}
