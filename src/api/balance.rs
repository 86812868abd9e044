use crate::api::AppState;
use crate::domain::{BalanceSnapshot, Credential};
use crate::error::AppError;
use axum::extract::State;
use axum::Json;
use tokio_util::sync::CancellationToken;

pub async fn post_balance(
    State(state): State<AppState>,
    Json(credential): Json<Credential>,
) -> Result<Json<BalanceSnapshot>, AppError> {
    // Dropped with the handler when the client goes away.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let snapshot = state.ledger.balance_snapshot(&credential, &cancel).await?;
    Ok(Json(snapshot))
}
