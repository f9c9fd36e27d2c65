//! Service error taxonomy and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

/// Everything a request can fail with, mapped at the handler boundary.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request body failed validation before any external call.
    #[error("{0}")]
    InvalidInput(String),

    /// The model provider call failed.
    #[error("Extraction failed: {0}")]
    Extraction(#[source] anyhow::Error),

    /// The database write or read failed.
    #[error("Storage failed: {0}")]
    Storage(#[source] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Extraction(_) | ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_maps_to_400() {
        let err = ApiError::InvalidInput("Invalid base64 image encoding".to_string());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_extraction_and_storage_map_to_500() {
        let err = ApiError::Extraction(anyhow::anyhow!("provider unreachable"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = ApiError::Storage(anyhow::anyhow!("disk full"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_text_reaches_the_body() {
        let err = ApiError::Extraction(anyhow::anyhow!("quota exceeded"));
        assert_eq!(err.to_string(), "Extraction failed: quota exceeded");
    }
}
