use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::HostError;

/// JSON body of every error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl HostError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            HostError::UnknownJob(_) => StatusCode::NOT_FOUND,
            HostError::AlreadyStopped(_) | HostError::JobExists(_) => StatusCode::CONFLICT,
            HostError::InvalidJob(_) => StatusCode::BAD_REQUEST,
            HostError::Backend(_) | HostError::StreamWrite(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HostError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
