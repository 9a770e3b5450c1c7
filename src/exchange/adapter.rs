use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::{
    Balance, Candle, CandleInterval, Contract, OrderId, OrderRequest, OrderStatus, PriceQuote,
    Venue,
};

/// REST-layer failure. For trading calls any variant is indeterminate: the
/// order may still have reached the venue.
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Signing error: {0}")]
    Signing(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),
    #[error("Order not found: {0}")]
    OrderNotFound(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// HTTP verbs the venues are called with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(ExchangeError::Unsupported(format!("HTTP method {}", other))),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Venue-specific translation of raw JSON into the shared model.
pub trait PayloadParser: Send + Sync {
    fn parse_contract(&self, raw: &Value) -> Result<Contract, ExchangeError>;

    /// Returns the asset/currency key together with its balance.
    fn parse_balance(&self, raw: &Value) -> Result<(String, Balance), ExchangeError>;

    fn parse_candle(&self, raw: &Value, interval: CandleInterval) -> Result<Candle, ExchangeError>;

    fn parse_order_status(&self, raw: &Value) -> Result<OrderStatus, ExchangeError>;
}

/// One REST call per logical action, single attempt each.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn venue(&self) -> Venue;

    /// List tradable contracts
    async fn get_contracts(&self) -> Result<Vec<Contract>, ExchangeError>;

    /// Account margin per asset
    async fn get_balances(&self) -> Result<HashMap<String, Balance>, ExchangeError>;

    /// Historical candles, oldest first
    async fn get_historical_candles(
        &self,
        contract: &Contract,
        interval: CandleInterval,
    ) -> Result<Vec<Candle>, ExchangeError>;

    /// Fetch top-of-book and merge it into the shared price cache
    async fn get_bid_ask(&self, contract: &Contract) -> Result<PriceQuote, ExchangeError>;

    async fn get_order_status(
        &self,
        contract: &Contract,
        order_id: &OrderId,
    ) -> Result<OrderStatus, ExchangeError>;

    async fn place_order(
        &self,
        contract: &Contract,
        order: &OrderRequest,
    ) -> Result<OrderStatus, ExchangeError>;

    async fn cancel_order(
        &self,
        contract: &Contract,
        order_id: &OrderId,
    ) -> Result<OrderStatus, ExchangeError>;

    fn name(&self) -> &str {
        self.venue().name()
    }
}

pub(crate) fn field<'a>(raw: &'a Value, key: &str) -> Result<&'a Value, ExchangeError> {
    raw.get(key)
        .filter(|v| !v.is_null())
        .ok_or_else(|| ExchangeError::Parse(format!("missing field '{}'", key)))
}

pub(crate) fn str_field<'a>(raw: &'a Value, key: &str) -> Result<&'a str, ExchangeError> {
    field(raw, key)?
        .as_str()
        .ok_or_else(|| ExchangeError::Parse(format!("field '{}' is not a string", key)))
}

/// Decimal from either a JSON string ("0.01") or a JSON number (0.01).
pub(crate) fn decimal_value(value: &Value, key: &str) -> Result<rust_decimal::Decimal, ExchangeError> {
    let parse = |s: &str| {
        rust_decimal::Decimal::from_str_exact(s)
            .or_else(|_| rust_decimal::Decimal::from_scientific(s))
            .ok()
    };

    // serde_json renders small floats in exponent form (1e-8)
    let parsed = match value {
        Value::String(s) => parse(s),
        Value::Number(n) => parse(&n.to_string()),
        _ => None,
    };
    parsed.ok_or_else(|| ExchangeError::Parse(format!("field '{}' is not a decimal: {}", key, value)))
}

pub(crate) fn decimal_field(raw: &Value, key: &str) -> Result<rust_decimal::Decimal, ExchangeError> {
    decimal_value(field(raw, key)?, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_http_method_closed_set() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("DELETE".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);

        let err = "PATCH".parse::<HttpMethod>().unwrap_err();
        assert!(matches!(err, ExchangeError::Unsupported(_)));
    }

    #[test]
    fn test_decimal_field_accepts_strings_and_numbers() {
        let raw = json!({"a": "0.00010", "b": 0.5, "c": 100, "d": null, "f": 1e-8});
        assert_eq!(decimal_field(&raw, "a").unwrap(), dec!(0.0001));
        assert_eq!(decimal_field(&raw, "b").unwrap(), dec!(0.5));
        assert_eq!(decimal_field(&raw, "c").unwrap(), dec!(100));
        assert_eq!(decimal_field(&raw, "f").unwrap(), dec!(0.00000001));
        assert!(matches!(decimal_field(&raw, "d"), Err(ExchangeError::Parse(_))));
        assert!(matches!(decimal_field(&raw, "e"), Err(ExchangeError::Parse(_))));
    }
}
