use crate::api::AppState;
use crate::domain::{Credential, RunningPosition};
use crate::error::AppError;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningPositionsResponse {
    pub positions: Vec<RunningPosition>,
}

pub async fn post_running_positions(
    State(state): State<AppState>,
    Json(credential): Json<Credential>,
) -> Result<Json<RunningPositionsResponse>, AppError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let positions = state.ledger.running_positions(&credential, &cancel).await?;
    Ok(Json(RunningPositionsResponse { positions }))
}
