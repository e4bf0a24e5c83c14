//! OCR Routes
//!
//! Endpoints:
//! - POST /ocr - multipart upload (field `file`), returns the recognized text

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::OcrRequestError;
use crate::ocr::RecognitionLine;
use crate::state::AppState;
use crate::upload::{check_declared_type, Upload, ValidationError};

const NO_TEXT_MESSAGE: &str = "No text detected";

/// Successful OCR response
#[derive(Debug, Serialize)]
pub struct OcrResponse {
    pub success: bool,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_size: Option<String>,
    pub total_text_blocks: usize,
    pub full_text: String,
    pub text_blocks: Vec<RecognitionLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

/// POST /ocr
pub async fn recognize_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<OcrResponse>, OcrRequestError> {
    let request_id = Uuid::new_v4();
    let upload = read_upload(&mut multipart, &state).await?;

    tracing::info!(
        %request_id,
        filename = upload.filename.as_deref().unwrap_or(""),
        content_type = upload.content_type.as_deref().unwrap_or(""),
        bytes = upload.size(),
        "OCR request received"
    );

    let outcome = state.ocr().process(&upload).await.map_err(|e| {
        tracing::debug!(%request_id, "OCR request failed: {}", e);
        e
    })?;

    tracing::info!(
        %request_id,
        lines = outcome.result.count,
        image_size = outcome.image_size.as_deref().unwrap_or("-"),
        "OCR request complete"
    );

    let empty = outcome.result.is_empty();
    Ok(Json(OcrResponse {
        success: true,
        filename: upload.filename,
        content_type: upload.content_type,
        image_size: outcome.image_size,
        total_text_blocks: outcome.result.count,
        full_text: outcome.result.full_text,
        text_blocks: outcome.result.lines,
        message: empty.then_some(NO_TEXT_MESSAGE),
    }))
}

/// Pull the `file` field out of the multipart body.
///
/// The declared type is checked from the part headers before the body is
/// read, so unsupported uploads are rejected without buffering them.
async fn read_upload(multipart: &mut Multipart, state: &AppState) -> Result<Upload, ValidationError> {
    let rules = state.ocr().rules();
    let body_limit = state.config().server.body_limit;
    let too_large = || ValidationError::FileTooLarge {
        max: rules.max_bytes.unwrap_or(body_limit).min(body_limit),
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, &too_large))?
    {
        if field.name() != Some("file") {
            tracing::debug!("Skipping multipart field {:?}", field.name());
            continue;
        }

        let filename = field.file_name().map(|s| s.to_string());
        let content_type = field.content_type().map(|s| s.to_string());

        check_declared_type(filename.as_deref(), content_type.as_deref(), rules)?;

        let data = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, &too_large))?;

        return Ok(Upload {
            filename,
            content_type,
            data,
        });
    }

    tracing::warn!("No file field found in multipart upload");
    Err(ValidationError::MissingFile)
}

fn multipart_error(error: MultipartError, too_large: impl Fn() -> ValidationError) -> ValidationError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large()
    } else {
        ValidationError::Malformed(error.body_text())
    }
}
