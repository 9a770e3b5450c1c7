pub mod adapter;
pub mod binance;
pub mod bitmex;
pub mod rest;
pub mod signer;
