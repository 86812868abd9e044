//! Market reference data: symbol catalog, ticker prices, open orders.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::{Asset, Decimal, Side, Symbol};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: Symbol,
    pub base: Asset,
    pub quote: Asset,
    pub tradeable: bool,
}

/// The venue's symbol catalog, keyed by symbol.
#[derive(Debug, Clone, Default)]
pub struct SymbolCatalog {
    symbols: HashMap<Symbol, SymbolInfo>,
}

impl SymbolCatalog {
    pub fn new(infos: impl IntoIterator<Item = SymbolInfo>) -> Self {
        Self {
            symbols: infos.into_iter().map(|i| (i.symbol.clone(), i)).collect(),
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolInfo> {
        self.symbols.get(&Symbol::from(symbol))
    }

    /// Listed and currently trading.
    pub fn is_tradeable(&self, symbol: &str) -> bool {
        self.get(symbol).map(|i| i.tradeable).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Last traded price per symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceTable {
    prices: HashMap<String, Decimal>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: impl Into<String>, price: Decimal) {
        self.prices.insert(symbol.into(), price);
    }

    pub fn with_price(mut self, symbol: &str, price: Decimal) -> Self {
        self.insert(symbol, price);
        self
    }

    /// Only strictly positive prices count as quotes.
    pub fn get(&self, symbol: &str) -> Option<Decimal> {
        self.prices.get(symbol).copied().filter(|p| p.is_positive())
    }

    /// Price of `base` expressed in `quote`, trying the direct pair
    /// `BASEQUOTE` and then the inverse pair `QUOTEBASE`.
    pub fn pair_rate(&self, base: &Asset, quote: &Asset) -> Option<Decimal> {
        if let Some(direct) = self.get(&format!("{}{}", base, quote)) {
            return Some(direct);
        }
        self.get(&format!("{}{}", quote, base))
            .and_then(|inverse| Decimal::one().checked_div(inverse))
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl FromIterator<(String, Decimal)> for PriceTable {
    fn from_iter<T: IntoIterator<Item = (String, Decimal)>>(iter: T) -> Self {
        Self {
            prices: iter.into_iter().collect(),
        }
    }
}

/// Resting spot order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub symbol: Symbol,
    pub side: Side,
    pub price: Decimal,
    /// Original quantity minus the executed part.
    pub open_qty: Decimal,
}
