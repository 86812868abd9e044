use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tradeledger::datasource::Market;
use tradeledger::domain::{
    AssetBalance, IncomeType, OpenOrder, OpenPosition, PositionOrigin, SymbolInfo,
};
use tradeledger::pagination::WindowError;
use tradeledger::{
    Asset, Config, Credential, Decimal, Ledger, LedgerError, MockVenueSource, PositionSide,
    RawFill, RawIncomeEntry, Side, Symbol, TimeMs, Venue, VenueError, VenueRegistry,
};

const DAY_MS: i64 = 86_400_000;

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

fn cred(venue: Venue) -> Credential {
    Credential::new(venue, "test-key", "test-secret")
}

fn ledger_with(mock: Arc<MockVenueSource>) -> Ledger {
    let config = Config {
        window_concurrency: 2,
        ..Config::default()
    };
    Ledger::new(VenueRegistry::new().with_source(mock), config)
}

fn tradeable(symbol: &str, base: &str, quote: &str) -> SymbolInfo {
    SymbolInfo {
        symbol: Symbol::from(symbol),
        base: Asset::from(base),
        quote: Asset::from(quote),
        tradeable: true,
    }
}

fn holding(asset: &str, amount: &str) -> AssetBalance {
    AssetBalance::new(Asset::from(asset), d(amount), Decimal::zero())
}

fn spot_fill(symbol: &str, side: Side, px: &str, qty: &str, t: i64, tid: i64) -> RawFill {
    RawFill::new(Symbol::from(symbol), side, d(px), d(qty), TimeMs::new(t))
        .with_trade_id(tid.to_string())
}

fn spot_mock() -> MockVenueSource {
    MockVenueSource::new(Venue::Binance)
        .with_balance(holding("BTC", "1"))
        .with_balance(holding("ETH", "2"))
        .with_symbol(tradeable("BTCUSDT", "BTC", "USDT"))
        .with_symbol(tradeable("ETHUSDT", "ETH", "USDT"))
        .with_spot_fills(vec![
            spot_fill("BTCUSDT", Side::Buy, "100", "1", 1_000, 1),
            spot_fill("BTCUSDT", Side::Sell, "120", "1", 2 * DAY_MS + 5, 2),
            spot_fill("ETHUSDT", Side::Buy, "10", "2", DAY_MS + 10, 3),
            spot_fill("ETHUSDT", Side::Sell, "11", "2", DAY_MS + 20, 4),
        ])
}

fn three_days() -> Option<(TimeMs, TimeMs)> {
    Some((TimeMs::new(0), TimeMs::new(3 * DAY_MS - 1)))
}

#[tokio::test]
async fn test_spot_import_nets_across_windows() {
    let mock = Arc::new(spot_mock());
    let ledger = ledger_with(mock.clone());
    let cancel = CancellationToken::new();

    let report = ledger
        .import_trade_history(&cred(Venue::Binance), three_days(), &cancel)
        .await
        .unwrap();

    assert!(report.coverage.is_complete());
    assert_eq!(report.symbols_scanned, 2);
    assert_eq!(report.trades.len(), 2);
    // Sorted by timestamp: ETH closes on day 1, BTC on day 2.
    assert_eq!(report.trades[0].symbol.as_str(), "ETHUSDT");
    assert_eq!(report.trades[0].pnl, d("2"));
    assert_eq!(report.trades[1].symbol.as_str(), "BTCUSDT");
    assert_eq!(report.trades[1].pnl, d("20"));

    let fill_calls = mock
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("spot_fills BTCUSDT"))
        .count();
    assert_eq!(fill_calls, 3);
}

#[tokio::test]
async fn test_failing_symbol_is_recorded_and_others_survive() {
    let mock = Arc::new(spot_mock().failing_symbol("ETHUSDT"));
    let ledger = ledger_with(mock);

    let report = ledger
        .import_trade_history(&cred(Venue::Binance), three_days(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.trades.len(), 1);
    assert_eq!(report.trades[0].symbol.as_str(), "BTCUSDT");
    assert_eq!(report.coverage.len(), 3);
    assert!(report
        .coverage
        .failures
        .iter()
        .all(|f| f.symbol == Some(Symbol::from("ETHUSDT"))));
}

#[tokio::test]
async fn test_failing_window_is_recorded_per_symbol() {
    let mock = Arc::new(spot_mock().failing_window_at(TimeMs::new(DAY_MS + 1)));
    let ledger = ledger_with(mock);

    let report = ledger
        .import_trade_history(&cred(Venue::Binance), three_days(), &CancellationToken::new())
        .await
        .unwrap();

    // The ETH round trip lived in the failed window.
    assert_eq!(report.trades.len(), 1);
    assert_eq!(report.coverage.len(), 2);
    for failure in &report.coverage.failures {
        let window = failure.window.unwrap();
        assert_eq!(window.start.as_ms(), DAY_MS);
        assert_eq!(window.end.as_ms(), 2 * DAY_MS - 1);
    }
}

#[tokio::test]
async fn test_cancellation_aborts_import() {
    let cancel = CancellationToken::new();
    let mock = Arc::new(spot_mock().cancelling_on("BTCUSDT", cancel.clone()));
    let ledger = ledger_with(mock);

    let result = ledger
        .import_trade_history(&cred(Venue::Binance), three_days(), &cancel)
        .await;

    assert_eq!(result.unwrap_err(), LedgerError::Cancelled);
}

#[tokio::test]
async fn test_inverted_range_rejected_before_any_call() {
    let mock = Arc::new(spot_mock());
    let ledger = ledger_with(mock.clone());

    let result = ledger
        .import_trade_history(
            &cred(Venue::Binance),
            Some((TimeMs::new(10), TimeMs::new(5))),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(
        result.unwrap_err(),
        LedgerError::Window(WindowError::InvalidRange { start: 10, end: 5 })
    );
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_blank_credential_is_authentication_error() {
    let ledger = ledger_with(Arc::new(spot_mock()));

    let result = ledger
        .import_trade_history(
            &Credential::new(Venue::Binance, "", ""),
            three_days(),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(
        result,
        Err(LedgerError::Venue(VenueError::Authentication(_)))
    ));
}

#[tokio::test]
async fn test_unconfigured_venue() {
    let ledger = ledger_with(Arc::new(spot_mock()));
    let result = ledger
        .balance_snapshot(&cred(Venue::Bybit), &CancellationToken::new())
        .await;
    assert_eq!(result.unwrap_err(), LedgerError::UnknownVenue(Venue::Bybit));
}

fn realized(symbol: &str, amount: &str, t: i64, tran: &str) -> RawIncomeEntry {
    RawIncomeEntry {
        symbol: Symbol::from(symbol),
        income_type: IncomeType::RealizedPnl,
        amount: d(amount),
        asset: Asset::from("USDT"),
        time_ms: TimeMs::new(t),
        tran_id: tran.to_string(),
    }
}

#[tokio::test]
async fn test_derivatives_import_with_income_only_symbol() {
    let mock = Arc::new(
        MockVenueSource::new(Venue::Binance)
            .with_income(vec![
                realized("ETHUSDT", "50", 3 * DAY_MS, "1"),
                realized("SOLUSDT", "-7", 4 * DAY_MS, "2"),
            ])
            .with_derivative_fills(vec![
                spot_fill("ETHUSDT", Side::Buy, "2000", "1", DAY_MS, 10).with_realized_pnl(d("0")),
                spot_fill("ETHUSDT", Side::Sell, "2050", "1", 3 * DAY_MS, 11)
                    .with_realized_pnl(d("50")),
                spot_fill("BTCUSDT", Side::Buy, "30000", "1", 5 * DAY_MS, 12),
            ])
            .with_position(OpenPosition {
                symbol: Symbol::from("BTCUSDT"),
                side: PositionSide::Long,
                size: d("1"),
                entry_price: d("30000"),
                mark_price: None,
                unrealized_pnl: None,
            }),
    );
    let ledger = ledger_with(mock.clone());

    let report = ledger
        .import_derivatives(
            &cred(Venue::Binance),
            TimeMs::new(0),
            TimeMs::new(7 * DAY_MS - 1),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.symbols_scanned, 3);
    assert_eq!(report.open_positions, 1);
    assert_eq!(report.trades.len(), 2);
    assert_eq!(report.trades[0].source, "binance_futures");
    assert_eq!(report.trades[0].pnl, d("50"));
    assert_eq!(report.trades[1].source, "binance_income");
    assert_eq!(report.trades[1].size, Decimal::zero());

    let calls = mock.calls();
    assert_eq!(calls.iter().filter(|c| c.starts_with("income")).count(), 1);
    assert!(calls.iter().any(|c| c.starts_with("derivative_fills BTCUSDT")));
}

#[tokio::test]
async fn test_derivatives_import_to_now_seeds_leg_from_positions() {
    let now = TimeMs::now().as_ms();
    let mock = Arc::new(
        MockVenueSource::new(Venue::Binance)
            .with_income(vec![realized("BTCUSDT", "10", now - 3_600_000, "1")])
            .with_derivative_fills(vec![spot_fill(
                "BTCUSDT",
                Side::Sell,
                "110",
                "3",
                now - 3_600_000,
                1,
            )
            .with_realized_pnl(d("10"))])
            .with_position(OpenPosition {
                symbol: Symbol::from("BTCUSDT"),
                side: PositionSide::Short,
                size: d("2"),
                entry_price: d("110"),
                mark_price: None,
                unrealized_pnl: None,
            }),
    );
    let ledger = ledger_with(mock);

    let report = ledger
        .import_derivatives(
            &cred(Venue::Binance),
            TimeMs::new(now - DAY_MS),
            TimeMs::new(now),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(report.coverage.is_complete());
    assert_eq!(report.trades.len(), 1);
    assert_eq!(report.trades[0].size, d("1"));
    assert_eq!(report.trades[0].pnl, d("10"));
    assert_eq!(report.trades[0].entry_price, d("100"));
    assert_eq!(report.open_positions, 1);
}

#[tokio::test]
async fn test_oversized_range_rejected_before_any_call() {
    let mock = Arc::new(spot_mock());
    let ledger = ledger_with(mock.clone());

    let result = ledger
        .import_trade_history(
            &cred(Venue::Binance),
            Some((TimeMs::new(0), TimeMs::new(1_760_000_000_000))),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(
        result,
        Err(LedgerError::Window(WindowError::TooManyWindows { .. }))
    ));
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_spot_only_venue_rejects_derivatives_import() {
    let mock = Arc::new(MockVenueSource::new(Venue::Mexc).spot_only());
    let ledger = ledger_with(mock);

    let result = ledger
        .import_derivatives(
            &cred(Venue::Mexc),
            TimeMs::new(0),
            TimeMs::new(DAY_MS),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(
        result.unwrap_err(),
        LedgerError::Venue(VenueError::unsupported(Venue::Mexc, Market::Derivatives))
    );
}

#[tokio::test]
async fn test_balance_snapshot_bridges_and_adds_derivatives() {
    let mock = Arc::new(
        MockVenueSource::new(Venue::Binance)
            .with_balance(holding("XYZ", "0.5"))
            .with_balance(holding("USDC", "100"))
            .with_balance(holding("NOPE", "9"))
            .with_price("XYZBTC", d("2"))
            .with_price("BTCUSDT", d("50000"))
            .with_derivatives_equity(d("1000")),
    );
    let ledger = ledger_with(mock);

    let snapshot = ledger
        .balance_snapshot(&cred(Venue::Binance), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(snapshot.quote_asset, Asset::from("USDT"));
    assert_eq!(snapshot.spot_value, d("50100"));
    assert_eq!(snapshot.derivatives_value, d("1000"));
    assert_eq!(snapshot.total, d("51100"));
    assert!(snapshot.derivatives_available);
    assert_eq!(snapshot.unpriced_assets, vec![Asset::from("NOPE")]);
}

#[tokio::test]
async fn test_balance_snapshot_degrades_without_derivatives_permission() {
    let mock = Arc::new(
        MockVenueSource::new(Venue::Binance)
            .with_balance(holding("USDT", "250"))
            .with_price("BTCUSDT", d("50000")),
    );
    let ledger = ledger_with(mock);

    let snapshot = ledger
        .balance_snapshot(&cred(Venue::Binance), &CancellationToken::new())
        .await
        .unwrap();

    assert!(!snapshot.derivatives_available);
    assert_eq!(snapshot.derivatives_value, Decimal::zero());
    assert_eq!(snapshot.total, d("250"));
}

#[tokio::test]
async fn test_running_positions_merge_positions_and_orders() {
    let mock = Arc::new(
        MockVenueSource::new(Venue::Binance)
            .with_price("BTCUSDT", d("110"))
            .with_price("ETHUSDT", d("2100"))
            .with_position(OpenPosition {
                symbol: Symbol::from("BTCUSDT"),
                side: PositionSide::Long,
                size: d("2"),
                entry_price: d("100"),
                mark_price: None,
                unrealized_pnl: None,
            })
            .with_order(OpenOrder {
                symbol: Symbol::from("ETHUSDT"),
                side: Side::Sell,
                price: d("2000"),
                open_qty: d("1"),
            }),
    );
    let ledger = ledger_with(mock);

    let running = ledger
        .running_positions(&cred(Venue::Binance), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(running.len(), 2);
    assert_eq!(running[0].origin, PositionOrigin::DerivativesPosition);
    assert_eq!(running[0].mark_price, d("110"));
    assert_eq!(running[0].unrealized_pnl, d("20"));
    assert_eq!(running[1].origin, PositionOrigin::SpotOrder);
    assert_eq!(running[1].side, PositionSide::Short);
    assert_eq!(running[1].unrealized_pnl, d("-100"));
}

#[tokio::test]
async fn test_running_positions_on_spot_only_venue() {
    let mock = Arc::new(
        MockVenueSource::new(Venue::Mexc)
            .spot_only()
            .with_order(OpenOrder {
                symbol: Symbol::from("BTCUSDT"),
                side: Side::Buy,
                price: d("100"),
                open_qty: d("1"),
            }),
    );
    let ledger = ledger_with(mock);

    let running = ledger
        .running_positions(&cred(Venue::Mexc), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(running.len(), 1);
    // No ticker: marked at the order price.
    assert_eq!(running[0].unrealized_pnl, Decimal::zero());
}
