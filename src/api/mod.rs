pub mod balance;
pub mod health;
pub mod positions;
pub mod trades;

use crate::orchestration::Ledger;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
}

impl AppState {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger: Arc::new(ledger),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/v1/balance", post(balance::post_balance))
        .route("/v1/trades/import", post(trades::post_trade_import))
        .route("/v1/futures/import", post(trades::post_futures_import))
        .route("/v1/positions/running", post(positions::post_running_positions))
        .layer(cors)
        .with_state(state)
}
