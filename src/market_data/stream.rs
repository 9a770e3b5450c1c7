use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::catalog::ContractCatalog;
use crate::market_data::connector::{MarketDataError, RequestIds, StreamProtocol, StreamState};
use crate::market_data::price_cache::PriceCache;
use crate::market_data::reconnect::{ReconnectConfig, ReconnectPolicy};

/// Keeps one streaming connection alive for a venue and feeds top-of-book
/// updates into the shared `PriceCache`.
///
/// `run` loops `Disconnected -> Connecting -> Connected -> Disconnected`
/// until the cancellation token fires. Every drop, including a clean close
/// from the server, is followed by a reconnect after the policy delay.
pub struct StreamClient<P: StreamProtocol> {
    protocol: P,
    catalog: Arc<ContractCatalog>,
    prices: PriceCache,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
    state_tx: watch::Sender<StreamState>,
}

impl<P: StreamProtocol> StreamClient<P> {
    pub fn new(
        protocol: P,
        catalog: Arc<ContractCatalog>,
        prices: PriceCache,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<StreamState>) {
        let (state_tx, state_rx) = watch::channel(StreamState::Disconnected);
        let client = Self {
            protocol,
            catalog,
            prices,
            reconnect,
            cancel,
            state_tx,
        };
        (client, state_rx)
    }

    pub async fn run(self) {
        let venue = self.protocol.venue();
        let mut policy = ReconnectPolicy::new(self.reconnect.clone());

        loop {
            match self.connect_and_run(&mut policy).await {
                Ok(()) => {
                    info!(%venue, "Stream client stopped");
                    break;
                }
                Err(e) => {
                    warn!(%venue, error = %e, "Stream connection lost");
                }
            }
            self.set_state(StreamState::Disconnected);

            let delay = policy.next_delay();
            info!(
                %venue,
                attempt = policy.attempt_count(),
                delay_ms = delay.as_millis() as u64,
                "Reconnecting stream"
            );

            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!(%venue, "Stream client cancelled during reconnect delay");
                    break;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(StreamState::Disconnected);
    }

    fn set_state(&self, state: StreamState) {
        self.state_tx.send_replace(state);
    }

    /// Returns `Ok(())` only when cancelled; every other exit is an error
    /// that triggers a reconnect.
    async fn connect_and_run(&self, policy: &mut ReconnectPolicy) -> Result<(), MarketDataError> {
        let venue = self.protocol.venue();
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        self.set_state(StreamState::Connecting);
        let url = Url::parse(self.protocol.url())
            .map_err(|e| MarketDataError::Connection(e.to_string()))?;

        let (ws_stream, _) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            res = connect_async(url.as_str()) => {
                res.map_err(|e| MarketDataError::Connection(e.to_string()))?
            }
        };

        self.set_state(StreamState::Connected);
        policy.reset();
        info!(%venue, url = %url, "Stream connection opened");

        let (mut write, mut read) = ws_stream.split();

        // Ids restart with every connection
        let symbols = self.catalog.symbols();
        let mut ids = RequestIds::new();
        for request in self.protocol.subscribe_requests(&symbols, &mut ids) {
            write
                .send(Message::Text(request))
                .await
                .map_err(|e| MarketDataError::Subscription(e.to_string()))?;
        }
        info!(%venue, symbols = symbols.len(), "Subscribed to top-of-book updates");

        let keepalive = self.protocol.keepalive();
        let mut ping_timer: Option<Interval> = keepalive.map(|(every, _)| {
            let mut timer = interval_at(Instant::now() + every, every);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                () = tick(&mut ping_timer) => {
                    if let Some((_, frame)) = keepalive {
                        write
                            .send(Message::Text(frame.to_string()))
                            .await
                            .map_err(|e| MarketDataError::Connection(e.to_string()))?;
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text),
                        Some(Ok(Message::Close(frame))) => {
                            warn!(%venue, ?frame, "Stream closed by server");
                            return Err(MarketDataError::StreamClosed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!(%venue, error = %e, "Stream error");
                            return Err(MarketDataError::Connection(e.to_string()));
                        }
                        None => return Err(MarketDataError::StreamClosed),
                    }
                }
            }
        }
    }

    /// A frame that fails to parse is logged and skipped; the connection stays up.
    fn handle_text(&self, text: &str) {
        match self.protocol.parse(text) {
            Ok(updates) => {
                for update in &updates {
                    self.prices.apply(update);
                }
            }
            Err(e) => {
                warn!(venue = %self.protocol.venue(), error = %e, "Skipping stream message");
                debug!(venue = %self.protocol.venue(), %text, "Skipped payload");
            }
        }
    }
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
