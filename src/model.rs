use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::exchange::adapter::ExchangeError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Venue {
    #[serde(rename = "BINANCE_FUTURES")]
    BinanceFutures,
    #[serde(rename = "BITMEX")]
    Bitmex,
}

impl Venue {
    pub fn name(&self) -> &'static str {
        match self {
            Venue::BinanceFutures => "Binance Futures",
            Venue::Bitmex => "BitMEX",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tradable instrument metadata. Immutable once loaded into a catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contract {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub price_decimals: u32,
    pub quantity_decimals: u32,
    pub tick_size: Decimal,
    pub lot_size: Decimal,
    pub venue: Venue,
}

/// Margin figures in decimal units of the asset, whatever the venue's
/// native scaling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Balance {
    pub initial_margin: Decimal,
    pub maintenance_margin: Decimal,
    pub margin_balance: Decimal,
    pub wallet_balance: Decimal,
    pub unrealized_pnl: Decimal,
}

/// OHLCV bucket. `timestamp` is the bucket open in epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CandleInterval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl CandleInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandleInterval::OneMinute => "1m",
            CandleInterval::FiveMinutes => "5m",
            CandleInterval::FifteenMinutes => "15m",
            CandleInterval::ThirtyMinutes => "30m",
            CandleInterval::OneHour => "1h",
            CandleInterval::FourHours => "4h",
            CandleInterval::OneDay => "1d",
        }
    }

    pub fn minutes(&self) -> i64 {
        match self {
            CandleInterval::OneMinute => 1,
            CandleInterval::FiveMinutes => 5,
            CandleInterval::FifteenMinutes => 15,
            CandleInterval::ThirtyMinutes => 30,
            CandleInterval::OneHour => 60,
            CandleInterval::FourHours => 240,
            CandleInterval::OneDay => 1440,
        }
    }
}

impl fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CandleInterval {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(CandleInterval::OneMinute),
            "5m" => Ok(CandleInterval::FiveMinutes),
            "15m" => Ok(CandleInterval::FifteenMinutes),
            "30m" => Ok(CandleInterval::ThirtyMinutes),
            "1h" => Ok(CandleInterval::OneHour),
            "4h" => Ok(CandleInterval::FourHours),
            "1d" => Ok(CandleInterval::OneDay),
            other => Err(ExchangeError::Unsupported(format!("candle interval {}", other))),
        }
    }
}

/// Venue-native order identifier: Binance uses integers, BitMEX uses UUID strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum OrderId {
    Numeric(i64),
    Text(String),
}

impl OrderId {
    pub fn is_empty(&self) -> bool {
        match self {
            OrderId::Numeric(_) => false,
            OrderId::Text(s) => s.is_empty(),
        }
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderId::Numeric(n) => write!(f, "{}", n),
            OrderId::Text(s) => f.write_str(s),
        }
    }
}

/// Normalized order snapshot. `status` is passed through as the venue reports it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderStatus {
    pub order_id: OrderId,
    pub status: String,
    pub avg_price: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Side {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderType {
    #[serde(rename = "LIMIT")]
    Limit,
    #[serde(rename = "MARKET")]
    Market,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimeInForce {
    #[serde(rename = "GTC")]
    GoodTillCancel,
    #[serde(rename = "IOC")]
    ImmediateOrCancel,
    #[serde(rename = "FOK")]
    FillOrKill,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub time_in_force: Option<TimeInForce>,
}

/// Best bid/ask for a symbol. Either side stays `None` until first observed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct PriceQuote {
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_parse_and_minutes() {
        let interval: CandleInterval = "1h".parse().unwrap();
        assert_eq!(interval, CandleInterval::OneHour);
        assert_eq!(interval.minutes(), 60);
        assert_eq!(interval.to_string(), "1h");
    }

    #[test]
    fn test_unknown_interval_is_typed_error() {
        let err = "7m".parse::<CandleInterval>().unwrap_err();
        assert!(matches!(err, ExchangeError::Unsupported(_)));
    }

    #[test]
    fn test_order_id_untagged_serde() {
        let numeric: OrderId = serde_json::from_str("8389765").unwrap();
        assert_eq!(numeric, OrderId::Numeric(8389765));

        let text: OrderId = serde_json::from_str("\"ab12-cd\"").unwrap();
        assert_eq!(text.to_string(), "ab12-cd");
        assert!(!text.is_empty());
        assert!(OrderId::Text(String::new()).is_empty());
    }
}
