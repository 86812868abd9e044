//! Fee conversion into quote units.

use crate::domain::{Asset, Decimal, RawFill};

/// A fee the netting engines could not express in quote units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedFee {
    pub amount: Decimal,
    pub asset: Asset,
}

/// The fill's fee in quote units of its own symbol.
///
/// An unspecified fee asset is taken to be the quote. A fee paid in the
/// quote asset (symbol suffix) is used as-is; one paid in the base asset
/// (symbol prefix) is multiplied by the fill price. Any other asset, such as
/// a discount token, cannot be converted without a price lookup and comes
/// back as `Err`.
pub fn fee_in_quote(fill: &RawFill) -> Result<Decimal, ExcludedFee> {
    if fill.fee.is_zero() {
        return Ok(Decimal::zero());
    }
    let Some(asset) = &fill.fee_asset else {
        return Ok(fill.fee);
    };
    let symbol = fill.symbol.as_str();
    if symbol.ends_with(asset.as_str()) {
        Ok(fill.fee)
    } else if symbol.starts_with(asset.as_str()) {
        Ok(fill.fee * fill.price)
    } else {
        Err(ExcludedFee {
            amount: fill.fee,
            asset: asset.clone(),
        })
    }
}
