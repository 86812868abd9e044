use std::collections::HashSet;
use tracing::info;

use crate::domain::{Asset, AssetBalance, OpenOrder, Symbol, SymbolCatalog};

/// Symbols worth querying for trade history, most relevant first.
///
/// Open-order symbols come first. Then for every nonzero balance, each
/// `ASSET+QUOTE` and `QUOTE+ASSET` pair that the catalog lists as tradeable,
/// walking `quote_priority` in order. The result is deduplicated and cut at
/// `cap`, so coverage is best-effort for accounts holding many assets.
pub fn discover_symbols(
    open_orders: &[OpenOrder],
    balances: &[AssetBalance],
    catalog: &SymbolCatalog,
    quote_priority: &[Asset],
    cap: usize,
) -> Vec<Symbol> {
    let mut seen = HashSet::new();
    let mut symbols = Vec::new();
    let mut push = |symbol: Symbol| {
        if seen.insert(symbol.clone()) {
            symbols.push(symbol);
        }
    };

    for order in open_orders {
        push(order.symbol.clone());
    }

    for balance in balances.iter().filter(|b| !b.total().is_zero()) {
        for quote in quote_priority.iter().filter(|q| **q != balance.asset) {
            for candidate in [
                format!("{}{}", balance.asset, quote),
                format!("{}{}", quote, balance.asset),
            ] {
                if catalog.is_tradeable(&candidate) {
                    push(Symbol::new(candidate));
                }
            }
        }
    }

    if symbols.len() > cap {
        info!(
            "Discovered {} symbols, querying the first {}",
            symbols.len(),
            cap
        );
        symbols.truncate(cap);
    }
    symbols
}
