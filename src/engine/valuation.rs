//! Quote-currency valuation of asset balances.

use std::collections::HashSet;
use tracing::debug;

use crate::domain::{Asset, AssetBalance, Decimal, PriceTable};

/// Stablecoins treated as interchangeable with each other at 1:1.
pub const STABLE_ASSETS: [&str; 6] = ["USDT", "USDC", "BUSD", "FDUSD", "DAI", "TUSD"];

/// How balances are converted into the quote asset.
#[derive(Debug, Clone)]
pub struct ValuationPolicy {
    pub quote: Asset,
    pub stables: HashSet<Asset>,
    /// Intermediate assets tried in order when no direct pair exists.
    pub bridges: Vec<Asset>,
}

/// Spot leg of a balance snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpotValuation {
    pub total: Decimal,
    pub unpriced: Vec<Asset>,
}

impl ValuationPolicy {
    pub fn new(quote: Asset, bridges: Vec<Asset>) -> Self {
        Self {
            quote,
            stables: STABLE_ASSETS.iter().map(|s| Asset::from(*s)).collect(),
            bridges,
        }
    }

    /// Rate for one hop `from -> to`: identity for equal or both-stable
    /// assets, else the direct pair, else the inverse pair.
    fn hop(&self, from: &Asset, to: &Asset, prices: &PriceTable) -> Option<Decimal> {
        if from == to || (self.stables.contains(from) && self.stables.contains(to)) {
            return Some(Decimal::one());
        }
        prices.pair_rate(from, to)
    }

    /// Value `amount` of `asset` in the quote asset, or `None` when no
    /// conversion path exists.
    pub fn value_in_quote(
        &self,
        asset: &Asset,
        amount: Decimal,
        prices: &PriceTable,
    ) -> Option<Decimal> {
        if let Some(rate) = self.hop(asset, &self.quote, prices) {
            return Some(amount * rate);
        }
        self.bridges
            .iter()
            .filter(|bridge| *bridge != asset && **bridge != self.quote)
            .find_map(|bridge| {
                let first = self.hop(asset, bridge, prices)?;
                let second = self.hop(bridge, &self.quote, prices)?;
                debug!("Valued {} via {}", asset, bridge);
                Some(amount * first * second)
            })
    }

    /// Sum every nonzero balance; unconvertible assets contribute zero and
    /// are listed.
    pub fn value_balances(&self, balances: &[AssetBalance], prices: &PriceTable) -> SpotValuation {
        let mut valuation = SpotValuation::default();
        for balance in balances {
            let amount = balance.total();
            if amount.is_zero() {
                continue;
            }
            match self.value_in_quote(&balance.asset, amount, prices) {
                Some(value) => valuation.total += value,
                None => valuation.unpriced.push(balance.asset.clone()),
            }
        }
        valuation
    }
}
