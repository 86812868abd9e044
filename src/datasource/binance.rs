//! Binance spot and USDⓈ-M futures adapter.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::parse::{
    array, decimal_field, i64_field, opt_decimal_field, opt_id_field, opt_str_field, parse_all,
    str_field,
};
use super::{signer_for, SignedClient, VenueError, VenueLimits, VenueSource};
use crate::pagination::{fetch_window_exhaustive, WindowPage};
use crate::domain::{
    Asset, AssetBalance, Credential, Decimal, IncomeType, OpenOrder, OpenPosition, PositionSide,
    PriceTable, RawFill, RawIncomeEntry, Side, Symbol, SymbolCatalog, SymbolInfo, TimeMs,
    TimeWindow, Venue,
};

/// Page size for myTrades, userTrades and income.
pub(super) const PAGE_LIMIT: usize = 1000;

#[derive(Debug, Clone)]
pub struct BinanceSource {
    spot: SignedClient,
    futures: SignedClient,
}

impl BinanceSource {
    pub fn new(spot_url: &str, futures_url: &str, recv_window_ms: u64, timeout: Duration) -> Self {
        let signer = signer_for(Venue::Binance, recv_window_ms);
        Self {
            spot: SignedClient::new(spot_url, signer.clone(), timeout),
            futures: SignedClient::new(futures_url, signer, timeout),
        }
    }
}

pub(super) fn params(pairs: &[(&str, String)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub(super) fn window_params(
    symbol: &Symbol,
    window: TimeWindow,
    limit: usize,
) -> Vec<(String, String)> {
    params(&[
        ("symbol", symbol.to_string()),
        ("startTime", window.start.as_ms().to_string()),
        ("endTime", window.end.as_ms().to_string()),
        ("limit", limit.to_string()),
    ])
}

#[async_trait]
impl VenueSource for BinanceSource {
    fn venue(&self) -> Venue {
        Venue::Binance
    }

    fn limits(&self) -> VenueLimits {
        VenueLimits::days(1, 7, 7)
    }

    async fn fetch_balances(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Vec<AssetBalance>, VenueError> {
        let response = self
            .spot
            .signed_get("/api/v3/account", &[], credential, cancel)
            .await?;
        parse_account_balances(&response)
    }

    async fn fetch_ticker_prices(
        &self,
        cancel: &CancellationToken,
    ) -> Result<PriceTable, VenueError> {
        let response = self.spot.public_get("/api/v3/ticker/price", &[], cancel).await?;
        parse_ticker_prices(&response)
    }

    async fn fetch_open_orders(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Vec<OpenOrder>, VenueError> {
        let response = self
            .spot
            .signed_get("/api/v3/openOrders", &[], credential, cancel)
            .await?;
        Ok(parse_all(array(&response, "orders")?, "open order", parse_open_order))
    }

    async fn fetch_symbol_catalog(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SymbolCatalog, VenueError> {
        let response = self.spot.public_get("/api/v3/exchangeInfo", &[], cancel).await?;
        parse_exchange_info(&response, |status| status == "TRADING")
    }

    async fn fetch_spot_fills(
        &self,
        credential: &Credential,
        symbol: &Symbol,
        window: TimeWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawFill>, VenueError> {
        debug!("Fetching binance spot fills for {} in {}", symbol, window);
        let client = &self.spot;
        fetch_window_exhaustive(window, PAGE_LIMIT, cancel, move |w| async move {
            let response = client
                .signed_get(
                    "/api/v3/myTrades",
                    &window_params(symbol, w, PAGE_LIMIT),
                    credential,
                    cancel,
                )
                .await?;
            let rows = array(&response, "trades")?;
            let fills = parse_all(rows, "spot trade", |row| parse_spot_trade(row, symbol));
            Ok::<_, VenueError>(WindowPage::new(rows.len(), fills))
        })
        .await
    }

    async fn fetch_derivatives_equity(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Decimal, VenueError> {
        let response = self
            .futures
            .signed_get("/fapi/v2/account", &[], credential, cancel)
            .await?;
        decimal_field(&response, "totalMarginBalance")
    }

    async fn fetch_income(
        &self,
        credential: &Credential,
        window: TimeWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawIncomeEntry>, VenueError> {
        let client = &self.futures;
        fetch_window_exhaustive(window, PAGE_LIMIT, cancel, move |w| async move {
            let query = params(&[
                ("incomeType", "REALIZED_PNL".to_string()),
                ("startTime", w.start.as_ms().to_string()),
                ("endTime", w.end.as_ms().to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ]);
            let response = client
                .signed_get("/fapi/v1/income", &query, credential, cancel)
                .await?;
            let rows = array(&response, "income")?;
            Ok::<_, VenueError>(WindowPage::new(
                rows.len(),
                parse_all(rows, "income", parse_income),
            ))
        })
        .await
    }

    async fn fetch_derivative_fills(
        &self,
        credential: &Credential,
        symbol: &Symbol,
        window: TimeWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawFill>, VenueError> {
        debug!("Fetching binance futures fills for {} in {}", symbol, window);
        let client = &self.futures;
        fetch_window_exhaustive(window, PAGE_LIMIT, cancel, move |w| async move {
            let response = client
                .signed_get(
                    "/fapi/v1/userTrades",
                    &window_params(symbol, w, PAGE_LIMIT),
                    credential,
                    cancel,
                )
                .await?;
            let rows = array(&response, "trades")?;
            let fills = parse_all(rows, "futures trade", |row| parse_futures_trade(row, symbol));
            Ok::<_, VenueError>(WindowPage::new(rows.len(), fills))
        })
        .await
    }

    async fn fetch_open_positions(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Vec<OpenPosition>, VenueError> {
        let response = self
            .futures
            .signed_get("/fapi/v2/positionRisk", &[], credential, cancel)
            .await?;
        let rows = array(&response, "positions")?;
        Ok(parse_all(rows, "position", parse_position_risk)
            .into_iter()
            .flatten()
            .collect())
    }
}

/// `balances[{asset, free, locked}]`, nonzero entries only.
pub(super) fn parse_account_balances(response: &Value) -> Result<Vec<AssetBalance>, VenueError> {
    let rows = response
        .get("balances")
        .ok_or_else(|| VenueError::Parse("Missing balances field".to_string()))?;
    let balances = parse_all(array(rows, "balances")?, "balance", |row| {
        Ok(AssetBalance::new(
            Asset::new(str_field(row, "asset")?),
            decimal_field(row, "free")?,
            decimal_field(row, "locked")?,
        ))
    });
    Ok(balances
        .into_iter()
        .filter(|b| !b.total().is_zero())
        .collect())
}

/// `[{symbol, price}]`.
pub(super) fn parse_ticker_prices(response: &Value) -> Result<PriceTable, VenueError> {
    let rows = array(response, "tickers")?;
    Ok(parse_all(rows, "ticker", |row| {
        Ok((str_field(row, "symbol")?.to_string(), decimal_field(row, "price")?))
    })
    .into_iter()
    .collect())
}

pub(super) fn parse_open_order(row: &Value) -> Result<OpenOrder, VenueError> {
    let side = str_field(row, "side")?;
    let orig = decimal_field(row, "origQty")?;
    let executed = opt_decimal_field(row, "executedQty").unwrap_or_else(Decimal::zero);
    Ok(OpenOrder {
        symbol: Symbol::new(str_field(row, "symbol")?),
        side: Side::parse_venue(side)
            .ok_or_else(|| VenueError::Parse(format!("Unknown side: {}", side)))?,
        price: decimal_field(row, "price")?,
        open_qty: orig - executed,
    })
}

/// `symbols[{symbol, baseAsset, quoteAsset, status}]`; `is_trading` decides
/// which status values count as open for trading.
pub(super) fn parse_exchange_info(
    response: &Value,
    is_trading: impl Fn(&str) -> bool,
) -> Result<SymbolCatalog, VenueError> {
    let rows = response
        .get("symbols")
        .ok_or_else(|| VenueError::Parse("Missing symbols field".to_string()))?;
    let infos = parse_all(array(rows, "symbols")?, "symbol", |row| {
        let status = opt_id_field(row, "status").unwrap_or_default();
        Ok(SymbolInfo {
            symbol: Symbol::new(str_field(row, "symbol")?),
            base: Asset::new(str_field(row, "baseAsset")?),
            quote: Asset::new(str_field(row, "quoteAsset")?),
            tradeable: is_trading(&status),
        })
    });
    Ok(SymbolCatalog::new(infos))
}

/// myTrades row: `{id, price, qty, commission, commissionAsset, time, isBuyer}`.
pub(super) fn parse_spot_trade(row: &Value, symbol: &Symbol) -> Result<RawFill, VenueError> {
    let is_buyer = row
        .get("isBuyer")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| VenueError::Parse("Missing isBuyer field".to_string()))?;
    let side = if is_buyer { Side::Buy } else { Side::Sell };

    let mut fill = RawFill::new(
        symbol.clone(),
        side,
        decimal_field(row, "price")?,
        decimal_field(row, "qty")?,
        TimeMs::new(i64_field(row, "time")?),
    )
    .with_fee(
        opt_decimal_field(row, "commission").unwrap_or_else(Decimal::zero),
        opt_str_field(row, "commissionAsset").map(Asset::new),
    );
    if let Some(id) = opt_id_field(row, "id") {
        fill = fill.with_trade_id(id);
    }
    Ok(fill)
}

/// userTrades row: adds `side`, `realizedPnl` and `positionSide`.
fn parse_futures_trade(row: &Value, symbol: &Symbol) -> Result<RawFill, VenueError> {
    let side_str = str_field(row, "side")?;
    let side = Side::parse_venue(side_str)
        .ok_or_else(|| VenueError::Parse(format!("Unknown side: {}", side_str)))?;

    let mut fill = RawFill::new(
        symbol.clone(),
        side,
        decimal_field(row, "price")?,
        decimal_field(row, "qty")?,
        TimeMs::new(i64_field(row, "time")?),
    )
    .with_fee(
        opt_decimal_field(row, "commission").unwrap_or_else(Decimal::zero),
        opt_str_field(row, "commissionAsset").map(Asset::new),
    );
    if let Some(id) = opt_id_field(row, "id") {
        fill = fill.with_trade_id(id);
    }
    if let Some(pnl) = opt_decimal_field(row, "realizedPnl") {
        fill = fill.with_realized_pnl(pnl);
    }
    if let Some(ps) = opt_str_field(row, "positionSide").and_then(PositionSide::parse_venue) {
        fill = fill.with_position_side(ps);
    }
    Ok(fill)
}

fn parse_income(row: &Value) -> Result<RawIncomeEntry, VenueError> {
    Ok(RawIncomeEntry {
        symbol: Symbol::new(opt_str_field(row, "symbol").unwrap_or_default()),
        income_type: IncomeType::parse_venue(str_field(row, "incomeType")?),
        amount: decimal_field(row, "income")?,
        asset: Asset::new(opt_str_field(row, "asset").unwrap_or("USDT")),
        time_ms: TimeMs::new(i64_field(row, "time")?),
        tran_id: opt_id_field(row, "tranId").unwrap_or_default(),
    })
}

/// positionRisk row; flat positions yield `None`. One-way (`BOTH`) rows take
/// their side from the sign of `positionAmt`.
fn parse_position_risk(row: &Value) -> Result<Option<OpenPosition>, VenueError> {
    let amount = decimal_field(row, "positionAmt")?;
    if amount.is_zero() {
        return Ok(None);
    }
    let side = match opt_str_field(row, "positionSide").and_then(PositionSide::parse_venue) {
        Some(PositionSide::Long) => PositionSide::Long,
        Some(PositionSide::Short) => PositionSide::Short,
        _ if amount.is_negative() => PositionSide::Short,
        _ => PositionSide::Long,
    };
    Ok(Some(OpenPosition {
        symbol: Symbol::new(str_field(row, "symbol")?),
        side,
        size: amount.abs(),
        entry_price: decimal_field(row, "entryPrice")?,
        mark_price: opt_decimal_field(row, "markPrice"),
        unrealized_pnl: opt_decimal_field(row, "unRealizedProfit"),
    }))
}
