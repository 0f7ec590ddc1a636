//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use cardmill_core::Error;

/// Wrapper turning a core error into an HTTP response.
///
/// The status comes from the error's kind; the body carries the message
/// plus any diagnostic details the error captured.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut body = serde_json::json!({
            "error": self.0.to_string(),
        });
        if let Some(details) = self.0.details() {
            body["details"] = details.clone();
        }

        (status, Json(body)).into_response()
    }
}
