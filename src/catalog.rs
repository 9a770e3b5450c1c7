use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::model::Contract;

/// Number of fractional digits in a tick or lot size.
///
/// The size is rendered with eight fractional digits, trailing zeros are
/// stripped, and the remaining fractional digits are counted. Sizes below
/// 1e-8 therefore count as 0.
pub fn tick_to_decimals(tick_size: Decimal) -> u32 {
    let rendered = format!("{:.8}", tick_size);
    let trimmed = rendered.trim_end_matches('0');

    match trimmed.split_once('.') {
        Some((_, fraction)) => fraction.len() as u32,
        None => 0,
    }
}

/// Symbol metadata for one venue, loaded once at connector start.
#[derive(Debug, Clone, Default)]
pub struct ContractCatalog {
    contracts: BTreeMap<String, Contract>,
}

impl ContractCatalog {
    pub fn new(contracts: Vec<Contract>) -> Self {
        let contracts = contracts
            .into_iter()
            .map(|c| (c.symbol.clone(), c))
            .collect();
        Self { contracts }
    }

    pub fn get(&self, symbol: &str) -> Option<&Contract> {
        self.contracts.get(symbol)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.contracts.keys().cloned().collect()
    }

    pub fn contracts(&self) -> impl Iterator<Item = &Contract> {
        self.contracts.values()
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}
