use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::config::ExchangeConfig;
use crate::exchange::adapter::{
    decimal_field, decimal_value, field, str_field, ExchangeAdapter, ExchangeError, HttpMethod,
    PayloadParser,
};
use crate::exchange::rest::RestTransport;
use crate::exchange::signer::{encode_params, BinanceSigner};
use crate::market_data::price_cache::PriceCache;
use crate::model::{
    Balance, Candle, CandleInterval, Contract, OrderId, OrderRequest, OrderStatus, OrderType,
    PriceQuote, Side, TimeInForce, Venue,
};

pub const BINANCE_REST_URL: &str = "https://fapi.binance.com";
pub const BINANCE_TESTNET_REST_URL: &str = "https://testnet.binancefuture.com";

const KLINES_LIMIT: u32 = 1000;
const MAX_PRECISION: u32 = 28;

/// Binance USDT-margined futures REST client.
pub struct BinanceFuturesAdapter {
    api_key: String,
    signer: BinanceSigner,
    transport: RestTransport,
    parser: BinanceParser,
    prices: PriceCache,
}

impl BinanceFuturesAdapter {
    pub fn new(config: &ExchangeConfig, prices: PriceCache) -> Result<Self, ExchangeError> {
        let (api_key, secret_key) = config.credentials(Venue::BinanceFutures)?;

        let base_url = config.rest_url.clone().unwrap_or_else(|| {
            if config.testnet {
                BINANCE_TESTNET_REST_URL.to_string()
            } else {
                BINANCE_REST_URL.to_string()
            }
        });
        info!(venue = %Venue::BinanceFutures, %base_url, "REST client configured");

        Ok(Self {
            api_key,
            signer: BinanceSigner::new(secret_key),
            transport: RestTransport::new(Venue::BinanceFutures, base_url),
            parser: BinanceParser,
            prices,
        })
    }

    async fn public(
        &self,
        method: HttpMethod,
        endpoint: &str,
        params: Vec<(String, String)>,
    ) -> Result<Value, ExchangeError> {
        let query = encode_params(&params)?;
        self.transport
            .send(method, endpoint, &query, &[("X-MBX-APIKEY", self.api_key.clone())])
            .await
    }

    async fn signed(
        &self,
        method: HttpMethod,
        endpoint: &str,
        params: Vec<(String, String)>,
    ) -> Result<Value, ExchangeError> {
        let query = self
            .signer
            .signed_query(params, Utc::now().timestamp_millis())?;
        self.transport
            .send(method, endpoint, &query, &[("X-MBX-APIKEY", self.api_key.clone())])
            .await
    }
}

fn side_str(side: Side) -> &'static str {
    match side {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    }
}

fn order_type_str(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Limit => "LIMIT",
        OrderType::Market => "MARKET",
    }
}

fn time_in_force_str(tif: TimeInForce) -> &'static str {
    match tif {
        TimeInForce::GoodTillCancel => "GTC",
        TimeInForce::ImmediateOrCancel => "IOC",
        TimeInForce::FillOrKill => "FOK",
    }
}

/// Unsigned order parameters in venue-native form; the signer appends
/// `timestamp` and `signature`.
pub(crate) fn build_order_params(contract: &Contract, order: &OrderRequest) -> Vec<(String, String)> {
    let mut params = vec![
        ("symbol".to_string(), contract.symbol.clone()),
        ("side".to_string(), side_str(order.side).to_string()),
        ("quantity".to_string(), order.quantity.normalize().to_string()),
        ("type".to_string(), order_type_str(order.order_type).to_string()),
    ];
    if let Some(price) = order.price {
        params.push(("price".to_string(), price.normalize().to_string()));
    }
    if let Some(tif) = order.time_in_force {
        params.push(("timeInForce".to_string(), time_in_force_str(tif).to_string()));
    }
    params
}

fn order_id_param(order_id: &OrderId) -> (String, String) {
    ("orderId".to_string(), order_id.to_string())
}

#[async_trait]
impl ExchangeAdapter for BinanceFuturesAdapter {
    fn venue(&self) -> Venue {
        Venue::BinanceFutures
    }

    async fn get_contracts(&self) -> Result<Vec<Contract>, ExchangeError> {
        let exchange_info = self
            .public(HttpMethod::Get, "/fapi/v1/exchangeInfo", Vec::new())
            .await?;

        let symbols = field(&exchange_info, "symbols")?
            .as_array()
            .ok_or_else(|| ExchangeError::Parse("'symbols' is not an array".into()))?;

        let mut contracts = Vec::with_capacity(symbols.len());
        for raw in symbols {
            match self.parser.parse_contract(raw) {
                Ok(contract) => contracts.push(contract),
                Err(e) => warn!(venue = %self.venue(), error = %e, "Skipping unparseable contract"),
            }
        }
        Ok(contracts)
    }

    async fn get_balances(&self) -> Result<HashMap<String, Balance>, ExchangeError> {
        let account = self
            .signed(HttpMethod::Get, "/fapi/v2/account", Vec::new())
            .await?;

        let assets = field(&account, "assets")?
            .as_array()
            .ok_or_else(|| ExchangeError::Parse("'assets' is not an array".into()))?;

        assets
            .iter()
            .map(|raw| self.parser.parse_balance(raw))
            .collect()
    }

    async fn get_historical_candles(
        &self,
        contract: &Contract,
        interval: CandleInterval,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let params = vec![
            ("symbol".to_string(), contract.symbol.clone()),
            ("interval".to_string(), interval.as_str().to_string()),
            ("limit".to_string(), KLINES_LIMIT.to_string()),
        ];
        let raw_candles = self.public(HttpMethod::Get, "/fapi/v1/klines", params).await?;

        raw_candles
            .as_array()
            .ok_or_else(|| ExchangeError::Parse("klines response is not an array".into()))?
            .iter()
            .map(|raw| self.parser.parse_candle(raw, interval))
            .collect()
    }

    async fn get_bid_ask(&self, contract: &Contract) -> Result<PriceQuote, ExchangeError> {
        let params = vec![("symbol".to_string(), contract.symbol.clone())];
        let book = self
            .public(HttpMethod::Get, "/fapi/v1/ticker/bookTicker", params)
            .await?;

        let bid = decimal_field(&book, "bidPrice")?;
        let ask = decimal_field(&book, "askPrice")?;
        Ok(self.prices.update(&contract.symbol, Some(bid), Some(ask)))
    }

    async fn get_order_status(
        &self,
        contract: &Contract,
        order_id: &OrderId,
    ) -> Result<OrderStatus, ExchangeError> {
        let params = vec![
            ("symbol".to_string(), contract.symbol.clone()),
            order_id_param(order_id),
        ];
        let raw = self.signed(HttpMethod::Get, "/fapi/v1/order", params).await?;
        self.parser.parse_order_status(&raw)
    }

    async fn place_order(
        &self,
        contract: &Contract,
        order: &OrderRequest,
    ) -> Result<OrderStatus, ExchangeError> {
        let params = build_order_params(contract, order);
        let raw = self.signed(HttpMethod::Post, "/fapi/v1/order", params).await?;
        self.parser.parse_order_status(&raw)
    }

    async fn cancel_order(
        &self,
        contract: &Contract,
        order_id: &OrderId,
    ) -> Result<OrderStatus, ExchangeError> {
        let params = vec![
            ("symbol".to_string(), contract.symbol.clone()),
            order_id_param(order_id),
        ];
        let raw = self.signed(HttpMethod::Delete, "/fapi/v1/order", params).await?;
        self.parser.parse_order_status(&raw)
    }
}

/// Normalizes Binance Futures payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinanceParser;

impl BinanceParser {
    fn filter_value(raw: &Value, filter_type: &str, key: &str) -> Option<Decimal> {
        raw.get("filters")?
            .as_array()?
            .iter()
            .find(|f| f.get("filterType").and_then(Value::as_str) == Some(filter_type))
            .and_then(|f| decimal_field(f, key).ok())
    }

    fn precision(raw: &Value, key: &str) -> Result<u32, ExchangeError> {
        let precision = field(raw, key)?
            .as_u64()
            .ok_or_else(|| ExchangeError::Parse(format!("field '{}' is not an integer", key)))?;

        // Decimal cannot carry more fractional digits than this
        u32::try_from(precision)
            .ok()
            .filter(|p| *p <= MAX_PRECISION)
            .ok_or_else(|| {
                ExchangeError::Parse(format!("field '{}' out of range: {}", key, precision))
            })
    }
}

impl PayloadParser for BinanceParser {
    fn parse_contract(&self, raw: &Value) -> Result<Contract, ExchangeError> {
        let price_decimals = Self::precision(raw, "pricePrecision")?;
        let quantity_decimals = Self::precision(raw, "quantityPrecision")?;

        // Fall back to 10^-precision when the filter list is absent
        let tick_size = Self::filter_value(raw, "PRICE_FILTER", "tickSize")
            .unwrap_or_else(|| Decimal::new(1, price_decimals));
        let lot_size = Self::filter_value(raw, "LOT_SIZE", "stepSize")
            .unwrap_or_else(|| Decimal::new(1, quantity_decimals));

        Ok(Contract {
            symbol: str_field(raw, "symbol")?.to_string(),
            base_asset: str_field(raw, "baseAsset")?.to_string(),
            quote_asset: str_field(raw, "quoteAsset")?.to_string(),
            price_decimals,
            quantity_decimals,
            tick_size: tick_size.normalize(),
            lot_size: lot_size.normalize(),
            venue: Venue::BinanceFutures,
        })
    }

    fn parse_balance(&self, raw: &Value) -> Result<(String, Balance), ExchangeError> {
        let asset = str_field(raw, "asset")?.to_string();
        let balance = Balance {
            initial_margin: decimal_field(raw, "initialMargin")?,
            maintenance_margin: decimal_field(raw, "maintMargin")?,
            margin_balance: decimal_field(raw, "marginBalance")?,
            wallet_balance: decimal_field(raw, "walletBalance")?,
            unrealized_pnl: decimal_field(raw, "unrealizedProfit")?,
        };
        Ok((asset, balance))
    }

    /// Kline rows: `[openTime, open, high, low, close, volume, ...]`.
    fn parse_candle(&self, raw: &Value, _interval: CandleInterval) -> Result<Candle, ExchangeError> {
        let row = raw
            .as_array()
            .filter(|row| row.len() >= 6)
            .ok_or_else(|| ExchangeError::Parse(format!("malformed kline row: {}", raw)))?;

        let timestamp = row[0]
            .as_i64()
            .ok_or_else(|| ExchangeError::Parse("kline open time is not an integer".into()))?;

        Ok(Candle {
            timestamp,
            open: decimal_value(&row[1], "open")?,
            high: decimal_value(&row[2], "high")?,
            low: decimal_value(&row[3], "low")?,
            close: decimal_value(&row[4], "close")?,
            volume: decimal_value(&row[5], "volume")?,
        })
    }

    fn parse_order_status(&self, raw: &Value) -> Result<OrderStatus, ExchangeError> {
        let order_id = field(raw, "orderId")?
            .as_i64()
            .map(OrderId::Numeric)
            .ok_or_else(|| ExchangeError::Parse("'orderId' is not an integer".into()))?;

        let avg_price = match raw.get("avgPrice") {
            Some(v) if !v.is_null() => decimal_value(v, "avgPrice")?,
            _ => Decimal::ZERO,
        };

        Ok(OrderStatus {
            order_id,
            status: str_field(raw, "status")?.to_string(),
            avg_price,
        })
    }
}
