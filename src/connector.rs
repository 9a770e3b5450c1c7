//! Per-venue orchestration.
//!
//! A `VenueConnector` owns one REST adapter, the venue's contract catalog
//! and balances, and one background streaming task. The price cache is
//! shared between the adapter (top-of-book queries) and the stream.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::catalog::ContractCatalog;
use crate::config::{ExchangeConfig, StreamSettings};
use crate::exchange::adapter::{ExchangeAdapter, ExchangeError};
use crate::exchange::binance::BinanceFuturesAdapter;
use crate::exchange::bitmex::BitmexAdapter;
use crate::market_data::binance::connector::BinanceBookTickerStream;
use crate::market_data::bitmex::connector::BitmexInstrumentStream;
use crate::market_data::connector::{StreamProtocol, StreamState};
use crate::market_data::price_cache::PriceCache;
use crate::market_data::reconnect::ReconnectConfig;
use crate::market_data::stream::StreamClient;
use crate::model::{
    Balance, Candle, CandleInterval, Contract, OrderId, OrderRequest, OrderStatus, PriceQuote,
    Venue,
};

pub struct VenueConnector {
    venue: Venue,
    adapter: Arc<dyn ExchangeAdapter>,
    catalog: Arc<ContractCatalog>,
    balances: RwLock<HashMap<String, Balance>>,
    prices: PriceCache,
    cancel: CancellationToken,
    state_rx: watch::Receiver<StreamState>,
    stream_task: Option<JoinHandle<()>>,
}

impl VenueConnector {
    /// Builds the adapter, loads contracts and balances, then starts streaming.
    ///
    /// Only a configuration problem (e.g. missing credentials) fails here.
    /// A failed contract or balance load is logged and leaves that map empty.
    pub async fn connect(
        venue: Venue,
        config: &ExchangeConfig,
        stream: &StreamSettings,
    ) -> Result<Self, ExchangeError> {
        let prices = PriceCache::new();
        let adapter: Arc<dyn ExchangeAdapter> = match venue {
            Venue::BinanceFutures => {
                Arc::new(BinanceFuturesAdapter::new(config, prices.clone())?)
            }
            Venue::Bitmex => Arc::new(BitmexAdapter::new(config, prices.clone())?),
        };

        let contracts = match adapter.get_contracts().await {
            Ok(contracts) => contracts,
            Err(e) => {
                error!(%venue, error = %e, "Failed to load contracts");
                Vec::new()
            }
        };
        let catalog = Arc::new(ContractCatalog::new(contracts));

        let balances = match adapter.get_balances().await {
            Ok(balances) => balances,
            Err(e) => {
                error!(%venue, error = %e, "Failed to load balances");
                HashMap::new()
            }
        };

        info!(
            %venue,
            contracts = catalog.len(),
            balances = balances.len(),
            "Venue initialized"
        );

        let cancel = CancellationToken::new();
        let reconnect = stream.reconnect_config();
        let (stream_task, state_rx) = match venue {
            Venue::BinanceFutures => spawn_stream(
                BinanceBookTickerStream::new(config.testnet, config.ws_url.clone()),
                catalog.clone(),
                prices.clone(),
                reconnect,
                cancel.clone(),
            ),
            Venue::Bitmex => spawn_stream(
                BitmexInstrumentStream::new(config.testnet, config.ws_url.clone()),
                catalog.clone(),
                prices.clone(),
                reconnect,
                cancel.clone(),
            ),
        };

        Ok(Self {
            venue,
            adapter,
            catalog,
            balances: RwLock::new(balances),
            prices,
            cancel,
            state_rx,
            stream_task: Some(stream_task),
        })
    }

    pub fn venue(&self) -> Venue {
        self.venue
    }

    pub fn catalog(&self) -> Arc<ContractCatalog> {
        self.catalog.clone()
    }

    pub fn contracts(&self) -> Vec<Contract> {
        self.catalog.contracts().cloned().collect()
    }

    pub fn contract(&self, symbol: &str) -> Result<&Contract, ExchangeError> {
        self.catalog
            .get(symbol)
            .ok_or_else(|| ExchangeError::UnknownSymbol(symbol.to_string()))
    }

    /// Balances as of the last successful load.
    pub fn balances(&self) -> HashMap<String, Balance> {
        self.balances.read().clone()
    }

    /// Reloads balances. On failure the previous snapshot is kept.
    pub async fn refresh_balances(&self) -> Result<HashMap<String, Balance>, ExchangeError> {
        let balances = self.adapter.get_balances().await?;
        *self.balances.write() = balances.clone();
        Ok(balances)
    }

    pub async fn historical_candles(
        &self,
        symbol: &str,
        interval: CandleInterval,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let contract = self.contract(symbol)?;
        self.adapter.get_historical_candles(contract, interval).await
    }

    /// REST top-of-book; the result is also merged into the price cache.
    pub async fn bid_ask(&self, symbol: &str) -> Result<PriceQuote, ExchangeError> {
        let contract = self.contract(symbol)?;
        self.adapter.get_bid_ask(contract).await
    }

    /// Latest quote seen by either the stream or a REST query.
    pub fn cached_quote(&self, symbol: &str) -> Option<PriceQuote> {
        self.prices.get(symbol)
    }

    pub fn prices(&self) -> PriceCache {
        self.prices.clone()
    }

    pub async fn order_status(
        &self,
        symbol: &str,
        order_id: &OrderId,
    ) -> Result<OrderStatus, ExchangeError> {
        let contract = self.contract(symbol)?;
        self.adapter.get_order_status(contract, order_id).await
    }

    /// An `Err` does not prove the order was rejected; the venue may still
    /// have accepted it.
    pub async fn place_order(&self, order: &OrderRequest) -> Result<OrderStatus, ExchangeError> {
        let contract = self.contract(&order.symbol)?;
        let status = match self.adapter.place_order(contract, order).await {
            Ok(status) => status,
            Err(e) => {
                error!(
                    venue = %self.venue,
                    symbol = %order.symbol,
                    error = %e,
                    "Order placement failed; order state unknown"
                );
                return Err(e);
            }
        };
        info!(
            venue = %self.venue,
            symbol = %order.symbol,
            order_id = %status.order_id,
            status = %status.status,
            "Order placed"
        );
        Ok(status)
    }

    pub async fn cancel_order(
        &self,
        symbol: &str,
        order_id: &OrderId,
    ) -> Result<OrderStatus, ExchangeError> {
        let contract = self.contract(symbol)?;
        self.adapter
            .cancel_order(contract, order_id)
            .await
            .inspect_err(|e| {
                error!(
                    venue = %self.venue,
                    symbol,
                    %order_id,
                    error = %e,
                    "Order cancellation failed; order state unknown"
                );
            })
    }

    pub fn stream_state(&self) -> watch::Receiver<StreamState> {
        self.state_rx.clone()
    }

    /// Stops the streaming task and waits for it to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.stream_task.take() {
            if let Err(e) = task.await {
                warn!(venue = %self.venue, error = %e, "Stream task ended abnormally");
            }
        }
        info!(venue = %self.venue, "Connector shut down");
    }
}

impl Drop for VenueConnector {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn spawn_stream<P: StreamProtocol>(
    protocol: P,
    catalog: Arc<ContractCatalog>,
    prices: PriceCache,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) -> (JoinHandle<()>, watch::Receiver<StreamState>) {
    let (client, state_rx) = StreamClient::new(protocol, catalog, prices, reconnect, cancel);
    (tokio::spawn(client.run()), state_rx)
}
