//! Liveness and health endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::ocr::EngineStatus;
use crate::state::AppState;

pub const SERVICE_NAME: &str = "OCR API";

#[derive(Serialize)]
pub struct RootResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub engine: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// GET /
///
/// Static liveness payload. Never touches the engine.
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /health
///
/// 503 once engine initialization has failed, 200 otherwise (including
/// before the engine has been needed).
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let engine = state.ocr().engine_status();

    if engine.is_healthy() {
        return (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy",
                service: SERVICE_NAME,
                engine: engine.label(),
                detail: None,
            }),
        );
    }

    let detail = match &engine {
        EngineStatus::Retrying { attempts, last_error } => format!(
            "OCR engine failed to initialize after {} attempt(s), retrying: {}",
            attempts, last_error
        ),
        EngineStatus::Degraded { attempts, last_error } => format!(
            "OCR engine failed to initialize after {} attempt(s), restart required: {}",
            attempts, last_error
        ),
        _ => "OCR engine unavailable".to_string(),
    };

    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(HealthResponse {
            status: "unhealthy",
            service: SERVICE_NAME,
            engine: engine.label(),
            detail: Some(detail),
        }),
    )
}
