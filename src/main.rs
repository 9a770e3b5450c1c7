use perp_connector_rs::config::{LogSettings, Settings};
use perp_connector_rs::connector::VenueConnector;
use perp_connector_rs::log_sink::{self, LogBuffer, LogSink};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Console output follows `RUST_LOG` (default `info`); the log file has its own level.
fn init_tracing(settings: &LogSettings) -> Result<(), BoxError> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(console_filter))
        .with(log_sink::file_layer(settings)?)
        .try_init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenv::dotenv().ok();

    let settings = Settings::new()?;
    init_tracing(&settings.log)?;
    info!(file = ?settings.log.file_path(), "Logging initialized");

    let log = LogBuffer::default();

    let mut connectors = Vec::new();
    for (venue, config) in settings.exchanges.enabled() {
        info!(%venue, testnet = config.testnet, "Connecting venue");
        match VenueConnector::connect(venue, config, &settings.stream).await {
            Ok(connector) => {
                log.add_log(&format!(
                    "{} connector started with {} contracts",
                    venue,
                    connector.contracts().len()
                ));
                connectors.push(connector);
            }
            Err(e) => {
                error!(%venue, error = %e, "Failed to start connector");
                log.add_log(&format!("{} connector failed: {}", venue, e));
            }
        }
    }

    if connectors.is_empty() {
        warn!("No venue enabled; set exchanges.<venue>.enabled = true");
        return Ok(());
    }

    let mut heartbeat = tokio::time::interval(Duration::from_secs(60));
    heartbeat.tick().await;
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    error!(error = %e, "Failed to listen for shutdown signal");
                }
                break;
            }
            _ = heartbeat.tick() => {
                for connector in &connectors {
                    let state = *connector.stream_state().borrow();
                    info!(
                        venue = %connector.venue(),
                        ?state,
                        quotes = connector.prices().len(),
                        "Heartbeat"
                    );
                }
            }
        }
    }

    info!("Shutting down");
    for connector in connectors {
        let venue = connector.venue();
        connector.shutdown().await;
        log.add_log(&format!("{} connector stopped", venue));
    }

    for line in log.lines().iter().rev() {
        info!("{}", line);
    }

    Ok(())
}
