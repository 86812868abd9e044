use axum::http::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;
use tradeledger::api;
use tradeledger::domain::{AssetBalance, SymbolInfo};
use tradeledger::{
    Asset, Config, Decimal, Ledger, MockVenueSource, RawFill, Side, Symbol, TimeMs, Venue,
    VenueRegistry,
};

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

fn setup_app() -> axum::Router {
    let binance = MockVenueSource::new(Venue::Binance)
        .with_balance(AssetBalance::new(Asset::from("BTC"), d("0.5"), d("0.5")))
        .with_price("BTCUSDT", d("40000"))
        .with_derivatives_equity(d("500"))
        .with_symbol(SymbolInfo {
            symbol: Symbol::from("BTCUSDT"),
            base: Asset::from("BTC"),
            quote: Asset::from("USDT"),
            tradeable: true,
        })
        .with_spot_fills(vec![
            RawFill::new(Symbol::from("BTCUSDT"), Side::Buy, d("100"), d("1"), TimeMs::new(10))
                .with_trade_id("1"),
            RawFill::new(Symbol::from("BTCUSDT"), Side::Sell, d("130"), d("1"), TimeMs::new(20))
                .with_trade_id("2"),
        ]);
    let mexc = MockVenueSource::new(Venue::Mexc).spot_only();

    let registry = VenueRegistry::new()
        .with_source(Arc::new(binance))
        .with_source(Arc::new(mexc));
    let ledger = Ledger::new(registry, Config::default());
    api::create_router(api::AppState::new(ledger))
}

async fn request(app: axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let req = axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(v) => axum::body::Body::from(v.to_string()),
            None => axum::body::Body::empty(),
        })
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn credential(venue: &str) -> Value {
    json!({"venue": venue, "apiKey": "k", "apiSecret": "s"})
}

#[tokio::test]
async fn test_health() {
    let (status, body) = request(setup_app(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_balance_snapshot() {
    let (status, body) = request(setup_app(), "POST", "/v1/balance", Some(credential("binance"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quoteAsset"], "USDT");
    assert_eq!(body["spotValue"], 40000.0);
    assert_eq!(body["derivativesValue"], 500.0);
    assert_eq!(body["total"], 40500.0);
    assert_eq!(body["derivativesAvailable"], true);
}

#[tokio::test]
async fn test_blank_key_is_unauthorized() {
    let body = json!({"venue": "binance", "apiKey": " ", "apiSecret": "s"});
    let (status, body) = request(setup_app(), "POST", "/v1/balance", Some(body)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("Unauthorized"));
}

#[tokio::test]
async fn test_missing_secret_is_unauthorized() {
    let body = json!({"venue": "binance", "apiKey": "k"});
    let (status, body) = request(setup_app(), "POST", "/v1/balance", Some(body)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("Unauthorized"));
}

#[tokio::test]
async fn test_history_since_epoch_is_bad_request() {
    let mut body = credential("binance");
    body["fromMs"] = json!(0);
    body["toMs"] = json!(1_760_000_000_000i64);
    let (status, body) = request(setup_app(), "POST", "/v1/trades/import", Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("windows"));
}

#[tokio::test]
async fn test_trade_import_returns_trades() {
    let mut body = credential("binance");
    body["fromMs"] = json!(0);
    body["toMs"] = json!(999);
    let (status, body) = request(setup_app(), "POST", "/v1/trades/import", Some(body)).await;

    assert_eq!(status, StatusCode::OK);
    let trades = body["trades"].as_array().unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0]["symbol"], "BTCUSDT");
    assert_eq!(trades[0]["entryPrice"], 100.0);
    assert_eq!(trades[0]["exitPrice"], 130.0);
    assert_eq!(trades[0]["pnl"], 30.0);
    assert_eq!(trades[0]["source"], "binance_spot");
    assert_eq!(trades[0]["id"], "binance_spot:BTCUSDT:20:0");
    assert_eq!(body["coverage"]["failures"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_inverted_range_is_bad_request() {
    let mut body = credential("binance");
    body["fromMs"] = json!(500);
    body["toMs"] = json!(100);
    let (status, _) = request(setup_app(), "POST", "/v1/trades/import", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_half_open_range_is_bad_request() {
    let mut body = credential("binance");
    body["fromMs"] = json!(500);
    let (status, body) = request(setup_app(), "POST", "/v1/trades/import", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("fromMs"));
}

#[tokio::test]
async fn test_futures_import_on_spot_only_venue_is_unprocessable() {
    let mut body = credential("mexc");
    body["fromMs"] = json!(0);
    body["toMs"] = json!(86_400_000);
    let (status, body) = request(setup_app(), "POST", "/v1/futures/import", Some(body)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("mexc"));
}

#[tokio::test]
async fn test_futures_import_requires_range() {
    let (status, _) = request(setup_app(), "POST", "/v1/futures/import", Some(credential("binance"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_running_positions_on_spot_only_venue() {
    let (status, body) =
        request(setup_app(), "POST", "/v1/positions/running", Some(credential("mexc"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["positions"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_unconfigured_venue_is_bad_request() {
    let (status, _) = request(setup_app(), "POST", "/v1/balance", Some(credential("bybit"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
