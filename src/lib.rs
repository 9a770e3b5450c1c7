pub mod catalog;
pub mod config;
pub mod connector;
pub mod exchange;
pub mod log_sink;
pub mod market_data;
pub mod model;
