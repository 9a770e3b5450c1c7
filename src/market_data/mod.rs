pub mod binance;
pub mod bitmex;

pub mod connector;
pub mod price_cache;
pub mod reconnect;
pub mod stream;
