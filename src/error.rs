use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::datasource::VenueError;
use crate::orchestration::LedgerError;

/// Non-standard "client closed request" status.
const CLIENT_CLOSED_REQUEST: u16 = 499;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("Upstream venue error: {0}")]
    BadGateway(String),
    #[error("Request cancelled")]
    Cancelled,
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Cancelled => AppError::Cancelled,
            LedgerError::Window(e) => AppError::BadRequest(e.to_string()),
            LedgerError::UnknownVenue(v) => AppError::BadRequest(format!("venue {} is not configured", v)),
            LedgerError::Venue(e) => match e {
                VenueError::Authentication(msg) => AppError::Unauthorized(msg),
                VenueError::Unsupported { .. } => AppError::Unsupported(e.to_string()),
                VenueError::Cancelled => AppError::Cancelled,
                VenueError::Transport(_)
                | VenueError::Venue { .. }
                | VenueError::Parse(_)
                | VenueError::Truncated { .. } => {
                    AppError::BadGateway(e.to_string())
                }
            },
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unsupported(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Cancelled => StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                .unwrap_or(StatusCode::REQUEST_TIMEOUT),
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
