use crate::api::AppState;
use crate::domain::{Credential, TimeMs};
use crate::error::AppError;
use crate::orchestration::ImportReport;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    #[serde(flatten)]
    pub credential: Credential,
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
}

/// Spot history. Without a range the configured lookback ending now is used;
/// a half-open range is rejected.
pub async fn post_trade_import(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> Result<Json<ImportReport>, AppError> {
    let range = match (request.from_ms, request.to_ms) {
        (Some(from), Some(to)) => Some((TimeMs::new(from), TimeMs::new(to))),
        (None, None) => None,
        _ => {
            return Err(AppError::BadRequest(
                "fromMs and toMs must be given together".into(),
            ))
        }
    };

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let report = state
        .ledger
        .import_trade_history(&request.credential, range, &cancel)
        .await?;
    Ok(Json(report))
}

pub async fn post_futures_import(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> Result<Json<ImportReport>, AppError> {
    let (Some(from), Some(to)) = (request.from_ms, request.to_ms) else {
        return Err(AppError::BadRequest("fromMs and toMs are required".into()));
    };

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let report = state
        .ledger
        .import_derivatives(&request.credential, TimeMs::new(from), TimeMs::new(to), &cancel)
        .await?;
    Ok(Json(report))
}
