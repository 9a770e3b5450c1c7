use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

use crate::model::PriceQuote;

/// A partial top-of-book observation. Absent sides leave the cached value untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteUpdate {
    pub symbol: String,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
}

/// Shared top-of-book store for one venue, written by both the REST and the
/// streaming paths.
///
/// Writers merge per field under a single write lock, so the last writer of
/// each field wins and readers always get a whole `PriceQuote` copy.
#[derive(Debug, Clone, Default)]
pub struct PriceCache {
    quotes: Arc<RwLock<HashMap<String, PriceQuote>>>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the sides present in `update`; creates the entry on first sight.
    pub fn apply(&self, update: &QuoteUpdate) -> PriceQuote {
        self.update(&update.symbol, update.bid, update.ask)
    }

    pub fn update(&self, symbol: &str, bid: Option<Decimal>, ask: Option<Decimal>) -> PriceQuote {
        let mut quotes = self.quotes.write();
        let entry = quotes.entry(symbol.to_string()).or_default();
        if bid.is_some() {
            entry.bid = bid;
        }
        if ask.is_some() {
            entry.ask = ask;
        }
        *entry
    }

    pub fn get(&self, symbol: &str) -> Option<PriceQuote> {
        self.quotes.read().get(symbol).copied()
    }

    pub fn snapshot(&self) -> HashMap<String, PriceQuote> {
        self.quotes.read().clone()
    }

    pub fn len(&self) -> usize {
        self.quotes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.read().is_empty()
    }
}
