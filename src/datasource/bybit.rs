//! Bybit v5 unified API adapter.
//!
//! Every v5 response is wrapped in `{retCode, retMsg, result}`; a nonzero
//! `retCode` is a failure even on HTTP 200. List endpoints paginate with
//! `nextPageCursor`.

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
use crate::domain::{
    Asset, AssetBalance, Credential, Decimal, IncomeType, OpenOrder, OpenPosition, PositionSide,
    PriceTable, RawFill, RawIncomeEntry, Side, Symbol, SymbolCatalog, SymbolInfo, TimeMs,
    TimeWindow, Venue,
};
use crate::pagination::{paginate_cursor, CursorPage};

const PAGE_LIMIT: &str = "100";
const SETTLE_COIN: &str = "USDT";

/// retCodes that mean the key itself was rejected.
const AUTH_CODES: [i64; 4] = [10003, 10004, 10005, 33004];

#[derive(Debug, Clone)]
pub struct BybitSource {
    client: SignedClient,
    max_pages: usize,
}

impl BybitSource {
    pub fn new(base_url: &str, recv_window_ms: u64, timeout: Duration, max_pages: usize) -> Self {
        Self {
            client: SignedClient::new(base_url, signer_for(Venue::Bybit, recv_window_ms), timeout),
            max_pages,
        }
    }

    async fn signed_result(
        &self,
        path: &str,
        query: &[(String, String)],
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Value, VenueError> {
        let response = self.client.signed_get(path, query, credential, cancel).await?;
        unwrap_envelope(response)
    }

    async fn public_result(
        &self,
        path: &str,
        query: &[(String, String)],
        cancel: &CancellationToken,
    ) -> Result<Value, VenueError> {
        let response = self.client.public_get(path, query, cancel).await?;
        unwrap_envelope(response)
    }

    /// Follow `nextPageCursor` over a signed list endpoint.
    async fn signed_list<T, F>(
        &self,
        path: &str,
        base: Vec<(String, String)>,
        credential: &Credential,
        cancel: &CancellationToken,
        what: &str,
        parse: F,
    ) -> Result<Vec<T>, VenueError>
    where
        T: Send,
        F: Fn(&Value) -> Result<T, VenueError> + Sync,
    {
        let base = &base;
        let parse = &parse;
        paginate_cursor(cancel, self.max_pages, |cursor| async move {
            let mut query = base.clone();
            if let Some(cursor) = cursor {
                query.push(("cursor".to_string(), cursor));
            }
            let result = self.signed_result(path, &query, credential, cancel).await?;
            let items = parse_all(list(&result)?, what, parse);
            let next = opt_str_field(&result, "nextPageCursor").map(str::to_string);
            Ok(CursorPage::new(items, next))
        })
        .await
    }

    async fn wallet(
        &self,
        account_type: &str,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Value, VenueError> {
        let query = params(&[("accountType", account_type)]);
        let result = self
            .signed_result("/v5/account/wallet-balance", &query, credential, cancel)
            .await?;
        list(&result)?
            .first()
            .cloned()
            .ok_or_else(|| VenueError::Parse(format!("Empty {} wallet", account_type)))
    }
}

fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn window_params(category: &str, symbol: Option<&Symbol>, window: TimeWindow) -> Vec<(String, String)> {
    let mut query = params(&[("category", category)]);
    if let Some(symbol) = symbol {
        query.push(("symbol".to_string(), symbol.to_string()));
    }
    query.push(("startTime".to_string(), window.start.as_ms().to_string()));
    query.push(("endTime".to_string(), window.end.as_ms().to_string()));
    query.push(("limit".to_string(), PAGE_LIMIT.to_string()));
    query
}

/// Strip the `{retCode, retMsg, result}` envelope.
pub(crate) fn unwrap_envelope(response: Value) -> Result<Value, VenueError> {
    let code = i64_field(&response, "retCode")?;
    if code != 0 {
        let message = format!(
            "{} (code {})",
            opt_str_field(&response, "retMsg").unwrap_or("request rejected"),
            code
        );
        return Err(if AUTH_CODES.contains(&code) {
            VenueError::Authentication(message)
        } else {
            VenueError::Venue {
                status: 200,
                message,
            }
        });
    }
    match response {
        Value::Object(mut map) => map
            .remove("result")
            .ok_or_else(|| VenueError::Parse("Missing result field".to_string())),
        _ => Err(VenueError::Parse("Expected object response".to_string())),
    }
}

fn list(result: &Value) -> Result<&Vec<Value>, VenueError> {
    let rows = result
        .get("list")
        .ok_or_else(|| VenueError::Parse("Missing list field".to_string()))?;
    array(rows, "list")
}

#[async_trait]
impl VenueSource for BybitSource {
    fn venue(&self) -> Venue {
        Venue::Bybit
    }

    fn limits(&self) -> VenueLimits {
        VenueLimits::days(7, 7, 7)
    }

    /// Coins of the unified trading account.
    async fn fetch_balances(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Vec<AssetBalance>, VenueError> {
        let wallet = self.wallet("UNIFIED", credential, cancel).await?;
        let coins = wallet
            .get("coin")
            .ok_or_else(|| VenueError::Parse("Missing coin field".to_string()))?;
        let balances = parse_all(array(coins, "coins")?, "coin", parse_coin);
        Ok(balances
            .into_iter()
            .filter(|b| !b.total().is_zero())
            .collect())
    }

    async fn fetch_ticker_prices(
        &self,
        cancel: &CancellationToken,
    ) -> Result<PriceTable, VenueError> {
        let result = self
            .public_result("/v5/market/tickers", &params(&[("category", "spot")]), cancel)
            .await?;
        Ok(parse_all(list(&result)?, "ticker", |row| {
            Ok((
                str_field(row, "symbol")?.to_string(),
                decimal_field(row, "lastPrice")?,
            ))
        })
        .into_iter()
        .collect())
    }

    async fn fetch_open_orders(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Vec<OpenOrder>, VenueError> {
        self.signed_list(
            "/v5/order/realtime",
            params(&[("category", "spot"), ("limit", "50")]),
            credential,
            cancel,
            "open order",
            parse_order,
        )
        .await
    }

    async fn fetch_symbol_catalog(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SymbolCatalog, VenueError> {
        let result = self
            .public_result(
                "/v5/market/instruments-info",
                &params(&[("category", "spot")]),
                cancel,
            )
            .await?;
        let infos = parse_all(list(&result)?, "instrument", |row| {
            Ok(SymbolInfo {
                symbol: Symbol::new(str_field(row, "symbol")?),
                base: Asset::new(str_field(row, "baseCoin")?),
                quote: Asset::new(str_field(row, "quoteCoin")?),
                tradeable: opt_str_field(row, "status") == Some("Trading"),
            })
        });
        Ok(SymbolCatalog::new(infos))
    }

    async fn fetch_spot_fills(
        &self,
        credential: &Credential,
        symbol: &Symbol,
        window: TimeWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawFill>, VenueError> {
        debug!("Fetching bybit spot executions for {} in {}", symbol, window);
        let fills = self
            .signed_list(
                "/v5/execution/list",
                window_params("spot", Some(symbol), window),
                credential,
                cancel,
                "execution",
                parse_execution,
            )
            .await?;
        Ok(fills.into_iter().flatten().collect())
    }

    /// Equity of the classic contract account. Unified accounts reject this
    /// account type; their derivatives margin is already inside the unified
    /// wallet counted by [`fetch_balances`](Self::fetch_balances).
    async fn fetch_derivatives_equity(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Decimal, VenueError> {
        let wallet = self.wallet("CONTRACT", credential, cancel).await?;
        decimal_field(&wallet, "totalEquity")
    }

    /// Closed-position PnL records, reported as realized-PnL income.
    async fn fetch_income(
        &self,
        credential: &Credential,
        window: TimeWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawIncomeEntry>, VenueError> {
        self.signed_list(
            "/v5/position/closed-pnl",
            window_params("linear", None, window),
            credential,
            cancel,
            "closed pnl",
            parse_closed_pnl,
        )
        .await
    }

    async fn fetch_derivative_fills(
        &self,
        credential: &Credential,
        symbol: &Symbol,
        window: TimeWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawFill>, VenueError> {
        debug!("Fetching bybit linear executions for {} in {}", symbol, window);
        let fills = self
            .signed_list(
                "/v5/execution/list",
                window_params("linear", Some(symbol), window),
                credential,
                cancel,
                "execution",
                parse_execution,
            )
            .await?;
        Ok(fills.into_iter().flatten().collect())
    }

    async fn fetch_open_positions(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Vec<OpenPosition>, VenueError> {
        let positions = self
            .signed_list(
                "/v5/position/list",
                params(&[("category", "linear"), ("settleCoin", SETTLE_COIN), ("limit", "200")]),
                credential,
                cancel,
                "position",
                parse_position,
            )
            .await?;
        Ok(positions.into_iter().flatten().collect())
    }
}

fn parse_coin(row: &Value) -> Result<AssetBalance, VenueError> {
    let wallet = decimal_field(row, "walletBalance")?;
    let locked = opt_decimal_field(row, "locked").unwrap_or_else(Decimal::zero);
    Ok(AssetBalance::new(
        Asset::new(str_field(row, "coin")?),
        wallet - locked,
        locked,
    ))
}

fn parse_order(row: &Value) -> Result<OpenOrder, VenueError> {
    let side = str_field(row, "side")?;
    let qty = decimal_field(row, "qty")?;
    let open_qty = opt_decimal_field(row, "leavesQty").unwrap_or_else(|| {
        qty - opt_decimal_field(row, "cumExecQty").unwrap_or_else(Decimal::zero)
    });
    Ok(OpenOrder {
        symbol: Symbol::new(str_field(row, "symbol")?),
        side: Side::parse_venue(side)
            .ok_or_else(|| VenueError::Parse(format!("Unknown side: {}", side)))?,
        price: decimal_field(row, "price")?,
        open_qty,
    })
}

/// Execution row; funding and settlement rows (execType other than
/// `Trade`) yield `None`.
fn parse_execution(row: &Value) -> Result<Option<RawFill>, VenueError> {
    if opt_str_field(row, "execType").is_some_and(|t| t != "Trade") {
        return Ok(None);
    }
    let side_str = str_field(row, "side")?;
    let side = Side::parse_venue(side_str)
        .ok_or_else(|| VenueError::Parse(format!("Unknown side: {}", side_str)))?;

    let mut fill = RawFill::new(
        Symbol::new(str_field(row, "symbol")?),
        side,
        decimal_field(row, "execPrice")?,
        decimal_field(row, "execQty")?,
        TimeMs::new(i64_field(row, "execTime")?),
    )
    .with_fee(
        opt_decimal_field(row, "execFee").unwrap_or_else(Decimal::zero),
        opt_str_field(row, "feeCurrency").map(Asset::new),
    );
    if let Some(id) = opt_id_field(row, "execId") {
        fill = fill.with_trade_id(id);
    }
    Ok(Some(fill))
}

fn parse_closed_pnl(row: &Value) -> Result<RawIncomeEntry, VenueError> {
    Ok(RawIncomeEntry {
        symbol: Symbol::new(str_field(row, "symbol")?),
        income_type: IncomeType::RealizedPnl,
        amount: decimal_field(row, "closedPnl")?,
        asset: Asset::new(SETTLE_COIN),
        time_ms: TimeMs::new(i64_field(row, "updatedTime")?),
        tran_id: opt_id_field(row, "orderId").unwrap_or_default(),
    })
}

/// Position row; empty positions yield `None`. `positionIdx` 1 and 2 are the
/// hedge-mode long and short legs; 0 is one-way and follows `side`.
fn parse_position(row: &Value) -> Result<Option<OpenPosition>, VenueError> {
    let size = decimal_field(row, "size")?;
    if size.is_zero() {
        return Ok(None);
    }
    let side = match (
        opt_id_field(row, "positionIdx").as_deref(),
        opt_str_field(row, "side"),
    ) {
        (Some("1"), _) => PositionSide::Long,
        (Some("2"), _) => PositionSide::Short,
        (_, Some(s)) if s.eq_ignore_ascii_case("sell") => PositionSide::Short,
        _ => PositionSide::Long,
    };
    Ok(Some(OpenPosition {
        symbol: Symbol::new(str_field(row, "symbol")?),
        side,
        size: size.abs(),
        entry_price: decimal_field(row, "avgPrice")?,
        mark_price: opt_decimal_field(row, "markPrice"),
        unrealized_pnl: opt_decimal_field(row, "unrealisedPnl"),
    }))
}
