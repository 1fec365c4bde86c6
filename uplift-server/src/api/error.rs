use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use uplift_core::{ErrorCode, UpliftError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    code: ErrorCode,
    message: String,
    retryable: bool,
}

/// HTTP face of [`UpliftError`].
#[derive(Debug)]
pub struct ApiError(pub UpliftError);

impl From<UpliftError> for ApiError {
    fn from(error: UpliftError) -> Self {
        Self(error)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            UpliftError::InvalidMessage(_) | UpliftError::InvalidFeedback(_) => {
                StatusCode::BAD_REQUEST
            }
            UpliftError::UnknownSession(_) => StatusCode::NOT_FOUND,
            UpliftError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            UpliftError::ChannelClosed => StatusCode::SERVICE_UNAVAILABLE,
            UpliftError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.0.code();
        let body = ErrorBody {
            code,
            message: self.0.to_string(),
            retryable: code.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}
