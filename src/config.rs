use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::exchange::adapter::ExchangeError;
use crate::market_data::reconnect::ReconnectConfig;
use crate::model::Venue;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub exchanges: Exchanges,
    #[serde(default)]
    pub stream: StreamSettings,
    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Exchanges {
    pub binance: Option<ExchangeConfig>,
    pub bitmex: Option<ExchangeConfig>,
}

impl Exchanges {
    pub fn get(&self, venue: Venue) -> Option<&ExchangeConfig> {
        match venue {
            Venue::BinanceFutures => self.binance.as_ref(),
            Venue::Bitmex => self.bitmex.as_ref(),
        }
    }

    /// Venues with a config section and `enabled = true`.
    pub fn enabled(&self) -> Vec<(Venue, &ExchangeConfig)> {
        [Venue::BinanceFutures, Venue::Bitmex]
            .into_iter()
            .filter_map(|venue| self.get(venue).map(|cfg| (venue, cfg)))
            .filter(|(_, cfg)| cfg.enabled)
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    // Keys may arrive lowercased from the config layer
    #[serde(alias = "apiKey", alias = "apikey", default)]
    pub api_key: Option<String>,
    #[serde(alias = "apiSecret", alias = "apisecret", alias = "api_secret", default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_testnet")]
    pub testnet: bool,
    /// Overrides the venue's REST base URL.
    #[serde(alias = "restUrl", alias = "resturl", default)]
    pub rest_url: Option<String>,
    /// Overrides the venue's streaming URL.
    #[serde(alias = "wsUrl", alias = "wsurl", default)]
    pub ws_url: Option<String>,
}

fn default_testnet() -> bool {
    true
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            secret_key: None,
            enabled: false,
            testnet: default_testnet(),
            rest_url: None,
            ws_url: None,
        }
    }
}

impl ExchangeConfig {
    pub fn credentials(&self, venue: Venue) -> Result<(String, String), ExchangeError> {
        let api_key = non_empty(&self.api_key)
            .ok_or_else(|| ExchangeError::Config(format!("{}: missing api_key", venue)))?;
        let secret_key = non_empty(&self.secret_key)
            .ok_or_else(|| ExchangeError::Config(format!("{}: missing secret_key", venue)))?;
        Ok((api_key, secret_key))
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Deserialize, Clone)]
pub struct StreamSettings {
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    #[serde(default = "default_reconnect_multiplier")]
    pub reconnect_multiplier: f64,
}

fn default_reconnect_delay_ms() -> u64 {
    2000
}

fn default_reconnect_multiplier() -> f64 {
    1.0
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_delay_ms(),
            reconnect_multiplier: default_reconnect_multiplier(),
        }
    }
}

impl StreamSettings {
    pub fn reconnect_config(&self) -> ReconnectConfig {
        let initial_delay = Duration::from_millis(self.reconnect_delay_ms);
        ReconnectConfig {
            initial_delay,
            max_delay: Duration::from_millis(self.reconnect_max_delay_ms).max(initial_delay),
            multiplier: self.reconnect_multiplier,
        }
    }
}

/// Diagnostic log file written next to the console output.
#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    /// Empty disables the file.
    #[serde(default = "default_log_file")]
    pub file: Option<String>,
    /// `EnvFilter` directives for the file, independent of `RUST_LOG`.
    #[serde(default = "default_file_level")]
    pub file_level: String,
}

fn default_log_file() -> Option<String> {
    Some("info.log".into())
}

fn default_file_level() -> String {
    "debug".into()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            file_level: default_file_level(),
        }
    }
}

impl LogSettings {
    pub fn file_path(&self) -> Option<&str> {
        self.file.as_deref().map(str::trim).filter(|f| !f.is_empty())
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let home = env::var("HOME").unwrap_or_else(|_| ".".into());

        let s = Config::builder()
            // ~/.perp-connector/config.{toml,json,ini}
            .add_source(File::with_name(&format!("{}/.perp-connector/config", home)).required(false))
            .add_source(File::with_name("config/config").required(false))
            // Not checked in
            .add_source(File::with_name("config/local").required(false))
            // e.g. PERP_EXCHANGES__BINANCE__API_KEY
            .add_source(
                Environment::with_prefix("PERP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }
}
