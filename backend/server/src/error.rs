use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use governance::GovernanceError;
use serde::Serialize;
use thiserror::Error;

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("A sync is already running")]
    SyncInProgress,

    #[error("Unknown session")]
    SessionNotFound,

    #[error("{0}")]
    Governance(#[from] GovernanceError),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::SyncInProgress => StatusCode::CONFLICT,
            AppError::SessionNotFound => StatusCode::NOT_FOUND,
            AppError::Governance(err) => match err {
                GovernanceError::FetchFailed { .. } => StatusCode::BAD_GATEWAY,
                GovernanceError::ConnectionFailure { .. } => StatusCode::SERVICE_UNAVAILABLE,
                GovernanceError::MissingConfiguration(_)
                | GovernanceError::InvalidConfiguration { .. }
                | GovernanceError::InvalidWeight(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
