use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::catalog::tick_to_decimals;
use crate::config::ExchangeConfig;
use crate::exchange::adapter::{
    decimal_field, decimal_value, field, str_field, ExchangeAdapter, ExchangeError, HttpMethod,
    PayloadParser,
};
use crate::exchange::rest::RestTransport;
use crate::exchange::signer::{encode_params, BitmexSigner};
use crate::market_data::price_cache::PriceCache;
use crate::model::{
    Balance, Candle, CandleInterval, Contract, OrderId, OrderRequest, OrderStatus, OrderType,
    PriceQuote, Side, TimeInForce, Venue,
};

pub const BITMEX_REST_URL: &str = "https://www.bitmex.com";
pub const BITMEX_TESTNET_REST_URL: &str = "https://testnet.bitmex.com";

/// Margin figures arrive in satoshi-like integer units.
pub const BITMEX_MULTIPLIER: Decimal = dec!(0.00000001);

const BUCKETED_COUNT: u32 = 500;

/// BitMEX perpetual swap REST client. Every request is signed.
pub struct BitmexAdapter {
    signer: BitmexSigner,
    transport: RestTransport,
    parser: BitmexParser,
    prices: PriceCache,
}

impl BitmexAdapter {
    pub fn new(config: &ExchangeConfig, prices: PriceCache) -> Result<Self, ExchangeError> {
        let (api_key, secret_key) = config.credentials(Venue::Bitmex)?;

        let base_url = config.rest_url.clone().unwrap_or_else(|| {
            if config.testnet {
                BITMEX_TESTNET_REST_URL.to_string()
            } else {
                BITMEX_REST_URL.to_string()
            }
        });
        info!(venue = %Venue::Bitmex, %base_url, "REST client configured");

        Ok(Self {
            signer: BitmexSigner::new(api_key, secret_key),
            transport: RestTransport::new(Venue::Bitmex, base_url),
            parser: BitmexParser,
            prices,
        })
    }

    async fn request(
        &self,
        method: HttpMethod,
        endpoint: &str,
        params: Vec<(String, String)>,
    ) -> Result<Value, ExchangeError> {
        let query = encode_params(&params)?;
        let auth = self
            .signer
            .headers(method, endpoint, &query, Utc::now().timestamp())?;

        let headers = [
            ("api-expires", auth.api_expires),
            ("api-key", auth.api_key),
            ("api-signature", auth.api_signature),
        ];
        self.transport.send(method, endpoint, &query, &headers).await
    }

    fn first_matching_order(&self, raw: &Value, order_id: &OrderId) -> Result<OrderStatus, ExchangeError> {
        let wanted = order_id.to_string();
        raw.as_array()
            .ok_or_else(|| ExchangeError::Parse("order response is not an array".into()))?
            .iter()
            .find(|o| o.get("orderID").and_then(Value::as_str) == Some(wanted.as_str()))
            .ok_or(ExchangeError::OrderNotFound(wanted))
            .and_then(|o| self.parser.parse_order_status(o))
    }
}

fn side_str(side: Side) -> &'static str {
    match side {
        Side::Buy => "Buy",
        Side::Sell => "Sell",
    }
}

fn order_type_str(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Limit => "Limit",
        OrderType::Market => "Market",
    }
}

fn time_in_force_str(tif: TimeInForce) -> &'static str {
    match tif {
        TimeInForce::GoodTillCancel => "GoodTillCancel",
        TimeInForce::ImmediateOrCancel => "ImmediateOrCancel",
        TimeInForce::FillOrKill => "FillOrKill",
    }
}

/// Bucket sizes the venue serves.
pub(crate) fn bin_size(interval: CandleInterval) -> Result<&'static str, ExchangeError> {
    match interval {
        CandleInterval::OneMinute
        | CandleInterval::FiveMinutes
        | CandleInterval::OneHour
        | CandleInterval::OneDay => Ok(interval.as_str()),
        other => Err(ExchangeError::Unsupported(format!(
            "{} has no {} buckets",
            Venue::Bitmex,
            other
        ))),
    }
}

pub(crate) fn build_order_params(contract: &Contract, order: &OrderRequest) -> Vec<(String, String)> {
    let mut params = vec![
        ("symbol".to_string(), contract.symbol.clone()),
        ("side".to_string(), side_str(order.side).to_string()),
        ("orderQty".to_string(), order.quantity.normalize().to_string()),
        ("ordType".to_string(), order_type_str(order.order_type).to_string()),
    ];
    if let Some(price) = order.price {
        params.push(("price".to_string(), price.normalize().to_string()));
    }
    if let Some(tif) = order.time_in_force {
        params.push(("timeInForce".to_string(), time_in_force_str(tif).to_string()));
    }
    params
}

#[async_trait]
impl ExchangeAdapter for BitmexAdapter {
    fn venue(&self) -> Venue {
        Venue::Bitmex
    }

    async fn get_contracts(&self) -> Result<Vec<Contract>, ExchangeError> {
        let instruments = self
            .request(HttpMethod::Get, "/api/v1/instrument/active", Vec::new())
            .await?;

        let list = instruments
            .as_array()
            .ok_or_else(|| ExchangeError::Parse("instrument response is not an array".into()))?;

        let mut contracts = Vec::with_capacity(list.len());
        for raw in list {
            match self.parser.parse_contract(raw) {
                Ok(contract) => contracts.push(contract),
                Err(e) => warn!(venue = %self.venue(), error = %e, "Skipping unparseable contract"),
            }
        }
        Ok(contracts)
    }

    async fn get_balances(&self) -> Result<HashMap<String, Balance>, ExchangeError> {
        let params = vec![("currency".to_string(), "all".to_string())];
        let margins = self
            .request(HttpMethod::Get, "/api/v1/user/margin", params)
            .await?;

        margins
            .as_array()
            .ok_or_else(|| ExchangeError::Parse("margin response is not an array".into()))?
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
            ("partial".to_string(), "true".to_string()),
            ("binSize".to_string(), bin_size(interval)?.to_string()),
            ("count".to_string(), BUCKETED_COUNT.to_string()),
            ("reverse".to_string(), "true".to_string()),
        ];
        let raw_candles = self
            .request(HttpMethod::Get, "/api/v1/trade/bucketed", params)
            .await?;

        // Newest first on the wire
        raw_candles
            .as_array()
            .ok_or_else(|| ExchangeError::Parse("bucketed response is not an array".into()))?
            .iter()
            .rev()
            .map(|raw| self.parser.parse_candle(raw, interval))
            .collect()
    }

    async fn get_bid_ask(&self, contract: &Contract) -> Result<PriceQuote, ExchangeError> {
        let params = vec![("symbol".to_string(), contract.symbol.clone())];
        let instruments = self
            .request(HttpMethod::Get, "/api/v1/instrument", params)
            .await?;

        let instrument = instruments
            .as_array()
            .and_then(|list| list.first())
            .ok_or_else(|| ExchangeError::UnknownSymbol(contract.symbol.clone()))?;

        let bid = field(instrument, "bidPrice")
            .ok()
            .map(|v| decimal_value(v, "bidPrice"))
            .transpose()?;
        let ask = field(instrument, "askPrice")
            .ok()
            .map(|v| decimal_value(v, "askPrice"))
            .transpose()?;

        Ok(self.prices.update(&contract.symbol, bid, ask))
    }

    async fn get_order_status(
        &self,
        contract: &Contract,
        order_id: &OrderId,
    ) -> Result<OrderStatus, ExchangeError> {
        let params = vec![
            ("symbol".to_string(), contract.symbol.clone()),
            ("filter".to_string(), json!({ "orderID": order_id.to_string() }).to_string()),
            ("reverse".to_string(), "true".to_string()),
        ];
        let orders = self.request(HttpMethod::Get, "/api/v1/order", params).await?;
        self.first_matching_order(&orders, order_id)
    }

    async fn place_order(
        &self,
        contract: &Contract,
        order: &OrderRequest,
    ) -> Result<OrderStatus, ExchangeError> {
        let params = build_order_params(contract, order);
        let raw = self.request(HttpMethod::Post, "/api/v1/order", params).await?;
        self.parser.parse_order_status(&raw)
    }

    async fn cancel_order(
        &self,
        _contract: &Contract,
        order_id: &OrderId,
    ) -> Result<OrderStatus, ExchangeError> {
        let params = vec![("orderID".to_string(), order_id.to_string())];
        let cancelled = self.request(HttpMethod::Delete, "/api/v1/order", params).await?;
        self.first_matching_order(&cancelled, order_id)
    }
}

/// Normalizes BitMEX payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitmexParser;

impl BitmexParser {
    fn sub_unit_field(raw: &Value, key: &str) -> Result<Decimal, ExchangeError> {
        Ok(decimal_field(raw, key)? * BITMEX_MULTIPLIER)
    }
}

impl PayloadParser for BitmexParser {
    fn parse_contract(&self, raw: &Value) -> Result<Contract, ExchangeError> {
        let tick_size = decimal_field(raw, "tickSize")?;
        let lot_size = decimal_field(raw, "lotSize")?;

        Ok(Contract {
            symbol: str_field(raw, "symbol")?.to_string(),
            base_asset: str_field(raw, "rootSymbol")?.to_string(),
            quote_asset: str_field(raw, "quoteCurrency")?.to_string(),
            price_decimals: tick_to_decimals(tick_size),
            quantity_decimals: tick_to_decimals(lot_size),
            tick_size,
            lot_size,
            venue: Venue::Bitmex,
        })
    }

    fn parse_balance(&self, raw: &Value) -> Result<(String, Balance), ExchangeError> {
        let currency = str_field(raw, "currency")?.to_string();
        let balance = Balance {
            initial_margin: Self::sub_unit_field(raw, "initMargin")?,
            maintenance_margin: Self::sub_unit_field(raw, "maintMargin")?,
            margin_balance: Self::sub_unit_field(raw, "marginBalance")?,
            wallet_balance: Self::sub_unit_field(raw, "walletBalance")?,
            unrealized_pnl: Self::sub_unit_field(raw, "unrealisedPnl")?,
        };
        Ok((currency, balance))
    }

    /// Bucket timestamps mark the close; shift back one interval to the open.
    fn parse_candle(&self, raw: &Value, interval: CandleInterval) -> Result<Candle, ExchangeError> {
        let close_time = DateTime::parse_from_rfc3339(str_field(raw, "timestamp")?)
            .map_err(|e| ExchangeError::Parse(format!("bad bucket timestamp: {}", e)))?
            .with_timezone(&Utc);
        let open_time = close_time - Duration::minutes(interval.minutes());

        Ok(Candle {
            timestamp: open_time.timestamp_millis(),
            open: decimal_field(raw, "open")?,
            high: decimal_field(raw, "high")?,
            low: decimal_field(raw, "low")?,
            close: decimal_field(raw, "close")?,
            volume: decimal_field(raw, "volume")?,
        })
    }

    fn parse_order_status(&self, raw: &Value) -> Result<OrderStatus, ExchangeError> {
        // avgPx is null until the first fill
        let avg_price = match raw.get("avgPx") {
            Some(v) if !v.is_null() => decimal_value(v, "avgPx")?,
            _ => Decimal::ZERO,
        };

        Ok(OrderStatus {
            order_id: OrderId::Text(str_field(raw, "orderID")?.to_string()),
            status: str_field(raw, "ordStatus")?.to_string(),
            avg_price,
        })
    }
}
