//! Configuration management for the OCR server
//!
//! Everything is read from the environment (a `.env` file is loaded first by
//! `main`). Every key has a default, so a bare `cargo run` starts a server that
//! behaves like the strict single-node deployment: 5MB uploads, `image/*` only,
//! in-memory normalization, Tesseract backend.

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::ocr::JoinPolicy;
use crate::upload::{ValidationPolicy, DEFAULT_MAX_UPLOAD_BYTES};

/// Default cap on the longer image side after normalization
pub const DEFAULT_MAX_DIMENSION: u32 = 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub upload: UploadConfig,
    pub pipeline: PipelineConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Hard limit on the request body, enforced by the HTTP layer
    pub body_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub policy: ValidationPolicy,
    /// `None` disables the size ceiling
    pub max_bytes: Option<usize>,
}

/// How the upload reaches the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    /// Decode and normalize in memory, hand pixels to the engine
    Memory,
    /// Stage the raw upload in a scoped temp file, hand the path to the engine
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub input_mode: InputMode,
    /// Longer-side cap applied during normalization (0 = no cap)
    pub max_dimension: u32,
    pub join: JoinPolicy,
    /// `None` keeps the engine's confidence unrounded
    pub confidence_decimals: Option<u32>,
    pub include_bbox: bool,
    /// Directory for staged uploads (system temp dir when unset)
    pub temp_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineBackend {
    Tesseract,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub backend: EngineBackend,
    pub language: String,
    /// Run orientation classification before recognition
    pub use_angle_cls: bool,
    pub tesseract_path: String,
    pub engine_url: String,
    pub init_max_attempts: u32,
    pub init_backoff_ms: u64,
    /// Build the engine at startup instead of on the first request
    pub eager_init: bool,
}

impl EngineConfig {
    pub fn init_backoff(&self) -> Duration {
        Duration::from_millis(self.init_backoff_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                body_limit: 32 * 1024 * 1024,
            },
            upload: UploadConfig {
                policy: ValidationPolicy::ContentType,
                max_bytes: Some(DEFAULT_MAX_UPLOAD_BYTES),
            },
            pipeline: PipelineConfig {
                input_mode: InputMode::Memory,
                max_dimension: DEFAULT_MAX_DIMENSION,
                join: JoinPolicy::Space,
                confidence_decimals: Some(4),
                include_bbox: true,
                temp_dir: None,
            },
            engine: EngineConfig {
                backend: EngineBackend::Tesseract,
                language: "chi_sim+eng".to_string(),
                use_angle_cls: false,
                tesseract_path: "tesseract".to_string(),
                engine_url: "http://localhost:8866".to_string(),
                init_max_attempts: 3,
                init_backoff_ms: 500,
                eager_init: false,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();

        let port = env::var("PORT")
            .or_else(|_| env::var("SERVER_PORT"))
            .ok()
            .and_then(|raw| parse_or_warn("PORT", &raw))
            .unwrap_or(defaults.server.port);

        Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port,
                body_limit: env_or("OCR_BODY_LIMIT_BYTES", defaults.server.body_limit),
            },
            upload: UploadConfig {
                policy: match env_lower("OCR_VALIDATION").as_deref() {
                    Some("extension") => ValidationPolicy::Extension,
                    Some("content-type") | Some("content_type") | None => ValidationPolicy::ContentType,
                    Some(other) => {
                        tracing::warn!("Unknown OCR_VALIDATION {:?}, using content-type", other);
                        ValidationPolicy::ContentType
                    }
                },
                max_bytes: match env_or("OCR_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES) {
                    0 => None,
                    n => Some(n),
                },
            },
            pipeline: PipelineConfig {
                input_mode: match env_lower("OCR_INPUT_MODE").as_deref() {
                    Some("file") => InputMode::File,
                    _ => InputMode::Memory,
                },
                max_dimension: env_or("OCR_MAX_DIMENSION", defaults.pipeline.max_dimension),
                join: match env_lower("OCR_JOIN").as_deref() {
                    Some("newline") => JoinPolicy::Newline,
                    _ => JoinPolicy::Space,
                },
                confidence_decimals: match env_lower("OCR_CONFIDENCE_DECIMALS").as_deref() {
                    None => defaults.pipeline.confidence_decimals,
                    Some("") | Some("none") => None,
                    Some(raw) => parse_or_warn("OCR_CONFIDENCE_DECIMALS", raw)
                        .or(defaults.pipeline.confidence_decimals),
                },
                include_bbox: env_flag("OCR_INCLUDE_BBOX", defaults.pipeline.include_bbox),
                temp_dir: env::var("OCR_TEMP_DIR").ok().filter(|s| !s.is_empty()).map(PathBuf::from),
            },
            engine: EngineConfig {
                backend: match env_lower("OCR_ENGINE").as_deref() {
                    Some("http") | Some("paddle") => EngineBackend::Http,
                    _ => EngineBackend::Tesseract,
                },
                language: env::var("OCR_LANG").unwrap_or(defaults.engine.language),
                use_angle_cls: env_flag("OCR_USE_ANGLE_CLS", defaults.engine.use_angle_cls),
                tesseract_path: env::var("OCR_TESSERACT_PATH").unwrap_or(defaults.engine.tesseract_path),
                engine_url: env::var("OCR_ENGINE_URL").unwrap_or(defaults.engine.engine_url),
                init_max_attempts: env_or("OCR_INIT_MAX_ATTEMPTS", defaults.engine.init_max_attempts),
                init_backoff_ms: env_or("OCR_INIT_BACKOFF_MS", defaults.engine.init_backoff_ms),
                eager_init: env_flag("OCR_EAGER_INIT", defaults.engine.eager_init),
            },
        }
    }
}

fn env_lower(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_ascii_lowercase())
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => parse_or_warn(key, &raw).unwrap_or(default),
        Err(_) => default,
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => parse_flag(&raw).unwrap_or_else(|| {
            tracing::warn!("Invalid boolean for {}: {:?}, using {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

fn parse_or_warn<T: FromStr>(key: &str, raw: &str) -> Option<T> {
    let parsed = raw.trim().parse().ok();
    if parsed.is_none() {
        tracing::warn!("Invalid value for {}: {:?}, using default", key, raw);
    }
    parsed
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
