use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::core::FacturaError;

/// A [`FacturaError`] rendered as `{"error": "..."}` with a matching status.
#[derive(Debug)]
pub struct ApiError(pub FacturaError);

impl From<FacturaError> for ApiError {
    fn from(e: FacturaError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            FacturaError::Validation(_) | FacturaError::Builder(_) => StatusCode::UNPROCESSABLE_ENTITY,
            FacturaError::NotFound(_) => StatusCode::NOT_FOUND,
            FacturaError::Auth(_) => StatusCode::UNAUTHORIZED,
            FacturaError::Conflict(_) => StatusCode::CONFLICT,
            FacturaError::Channel(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, status = status.as_u16(), "request failed");
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "request rejected");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_status_codes() {
        let status = |e: FacturaError| ApiError(e).status().as_u16();
        assert_eq!(status(FacturaError::Validation("x".into())), 422);
        assert_eq!(status(FacturaError::Builder("x".into())), 422);
        assert_eq!(status(FacturaError::NotFound("x".into())), 404);
        assert_eq!(status(FacturaError::Auth("x".into())), 401);
        assert_eq!(status(FacturaError::Conflict("x".into())), 409);
        assert_eq!(status(FacturaError::Channel("x".into())), 502);
        assert_eq!(status(FacturaError::Chain("x".into())), 500);
    }
}
