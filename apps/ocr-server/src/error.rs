//! Error types for the OCR server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::ocr::EngineError;
use crate::preprocess::DecodeError;
use crate::upload::ValidationError;

/// Everything that can end an `/ocr` request early
#[derive(Error, Debug)]
pub enum OcrRequestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Failed to stage upload on disk: {0}")]
    Staging(#[source] std::io::Error),
}

impl OcrRequestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Engine(e) => e.status_code(),
            Self::Decode(_) | Self::Staging(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supported_types: Option<Vec<String>>,
}

impl IntoResponse for OcrRequestError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            OcrRequestError::Validation(e) => {
                tracing::info!("Upload rejected: {}", e);
                ErrorResponse {
                    error: e.code().to_string(),
                    message: e.to_string(),
                    supported_types: e
                        .supported_types()
                        .map(|types| types.iter().map(|t| t.to_string()).collect()),
                }
            }
            OcrRequestError::Engine(e) if status == StatusCode::SERVICE_UNAVAILABLE => {
                tracing::warn!("OCR engine unavailable: {}", e);
                ErrorResponse {
                    error: "OCR engine unavailable".to_string(),
                    message: e.to_string(),
                    supported_types: None,
                }
            }
            other => {
                tracing::error!("OCR processing error: {}", other);
                ErrorResponse {
                    error: "OCR processing failed".to_string(),
                    message: other.to_string(),
                    supported_types: None,
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: OcrRequestError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_maps_to_400() {
        let (status, body) = body_json(ValidationError::FileTooLarge { max: 5 * 1024 * 1024 }.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "File too large");
        assert_eq!(body["message"], "File size must be less than 5MB");
        assert!(body.get("supported_types").is_none());

        let (status, body) =
            body_json(ValidationError::UnsupportedContentType("text/plain".into()).into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Unsupported file type");
        assert_eq!(body["supported_types"][0], "image/jpeg");
    }

    #[tokio::test]
    async fn test_unavailable_maps_to_503() {
        let (status, body) =
            body_json(EngineError::Unavailable("model files missing".into()).into()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "OCR engine unavailable");
        assert!(body["message"].as_str().unwrap().contains("model files missing"));
    }

    #[tokio::test]
    async fn test_processing_failures_map_to_500_with_detail() {
        let (status, body) =
            body_json(EngineError::ProcessingError("segfault".into()).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "OCR processing failed");
        assert_eq!(body["message"], "OCR processing failed: segfault");

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let (status, body) = body_json(OcrRequestError::Staging(io)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Failed to stage upload on disk: disk full");
    }
}
