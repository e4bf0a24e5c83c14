//! OCR Service
//!
//! Runs one upload through the pipeline: validate, stage or normalize,
//! recognize, shape the result. Each stage returns its own error type and
//! the first failure ends the request.

use std::sync::Arc;

use super::provider::EngineFactory;
use super::raw::RawOutput;
use super::slot::{EngineSlot, EngineStatus, InitPolicy};
use super::types::{EngineError, EngineInput, RecognitionResult, RecognizeOptions, TransformOptions};
use crate::config::{Config, InputMode, PipelineConfig, UploadConfig};
use crate::error::OcrRequestError;
use crate::preprocess;
use crate::upload::{self, temp_suffix, ScopedTempFile, Upload};

/// What one successful request produced
#[derive(Debug, Clone)]
pub struct OcrOutcome {
    pub result: RecognitionResult,
    /// `WIDTHxHEIGHT` after normalization; absent when the engine read a file
    pub image_size: Option<String>,
}

/// OCR pipeline shared by all requests
pub struct OcrService {
    slot: EngineSlot,
    rules: UploadConfig,
    pipeline: PipelineConfig,
    recognize: RecognizeOptions,
    transform: TransformOptions,
}

impl OcrService {
    /// Create the service. The engine itself is built on first use.
    pub fn new(config: &Config, factory: Arc<dyn EngineFactory>) -> Self {
        let policy = InitPolicy {
            max_attempts: config.engine.init_max_attempts,
            backoff: config.engine.init_backoff(),
        };

        Self {
            slot: EngineSlot::new(factory, policy),
            rules: config.upload.clone(),
            pipeline: config.pipeline.clone(),
            recognize: RecognizeOptions {
                classify_orientation: config.engine.use_angle_cls,
            },
            transform: TransformOptions {
                join: config.pipeline.join,
                confidence_decimals: config.pipeline.confidence_decimals,
                include_bbox: config.pipeline.include_bbox,
            },
        }
    }

    pub fn rules(&self) -> &UploadConfig {
        &self.rules
    }

    pub fn engine_status(&self) -> EngineStatus {
        self.slot.status()
    }

    /// Build the engine now rather than on the first request
    pub async fn warm_up(&self) -> Result<(), EngineError> {
        self.slot.get().await.map(|_| ())
    }

    /// Process one upload
    pub async fn process(&self, upload: &Upload) -> Result<OcrOutcome, OcrRequestError> {
        upload::validate(upload, &self.rules)?;

        let engine = self.slot.get().await?;

        let use_file = self.pipeline.input_mode == InputMode::File || upload.is_pdf();

        let (raw, image_size) = if use_file {
            let staged = ScopedTempFile::write(
                self.pipeline.temp_dir.as_deref(),
                &temp_suffix(upload),
                &upload.data,
            )
            .await
            .map_err(OcrRequestError::Staging)?;

            let raw = engine
                .recognize(EngineInput::File(staged.path()), &self.recognize)
                .await?;
            (raw, None)
        } else {
            let image =
                preprocess::normalize_blocking(upload.data.clone(), self.pipeline.max_dimension).await?;

            let raw = engine
                .recognize(EngineInput::Pixels(&image), &self.recognize)
                .await?;
            (raw, Some(image.size_label()))
        };

        if let RawOutput::Empty = raw {
            tracing::debug!(engine = engine.name(), "No text detected");
        }

        Ok(OcrOutcome {
            result: RecognitionResult::from_raw(&raw, &self.transform),
            image_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::provider::mock::{MockEngine, MockFactory};
    use crate::upload::ValidationError;
    use axum::body::Bytes;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn png(width: u32, height: u32) -> Bytes {
        let image = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut std::io::Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        Bytes::from(buffer)
    }

    fn image_upload(data: Bytes) -> Upload {
        Upload {
            filename: Some("scan.png".to_string()),
            content_type: Some("image/png".to_string()),
            data,
        }
    }

    fn service(config: &Config, engine: MockEngine) -> (OcrService, Arc<MockFactory>) {
        let factory = Arc::new(MockFactory::new(engine));
        (OcrService::new(config, factory.clone()), factory)
    }

    #[tokio::test]
    async fn test_memory_mode_reports_size() {
        let engine = MockEngine::returning(json!([[[null, ["Hi", 0.91234]]]]));
        let (service, _) = service(&Config::default(), engine);

        let outcome = service.process(&image_upload(png(2048, 1024))).await.unwrap();
        assert_eq!(outcome.image_size.as_deref(), Some("1024x512"));
        assert_eq!(outcome.result.count, 1);
        assert_eq!(outcome.result.full_text, "Hi");
        assert_eq!(outcome.result.lines[0].confidence, 0.9123);
    }

    #[tokio::test]
    async fn test_rejected_upload_never_reaches_engine() {
        let engine = MockEngine::returning(json!(null));
        let calls = engine.calls.clone();
        let (service, factory) = service(&Config::default(), engine);

        let upload = Upload {
            filename: Some("notes.docx".to_string()),
            content_type: Some("application/msword".to_string()),
            data: Bytes::from_static(b"PK"),
        };
        let err = service.process(&upload).await.unwrap_err();
        assert!(matches!(
            err,
            OcrRequestError::Validation(ValidationError::UnsupportedContentType(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(factory.builds(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_image_is_decode_error() {
        let (service, _) = service(&Config::default(), MockEngine::returning(json!(null)));
        let err = service
            .process(&image_upload(Bytes::from_static(b"not a png")))
            .await
            .unwrap_err();
        assert!(matches!(err, OcrRequestError::Decode(_)));
    }

    #[tokio::test]
    async fn test_file_mode_cleans_up_on_success_and_failure() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.pipeline.input_mode = InputMode::File;
        config.pipeline.temp_dir = Some(dir.path().to_path_buf());

        let (ok_service, _) = service(&config, MockEngine::returning(json!([[[null, ["x", 1.0]]]])));
        let outcome = ok_service.process(&image_upload(png(4, 4))).await.unwrap();
        assert!(outcome.image_size.is_none());
        assert_eq!(outcome.result.count, 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let failing = MockEngine {
            response: Err(EngineError::ProcessingError("engine crashed".to_string())),
            calls: Default::default(),
        };
        let (bad_service, _) = service(&config, failing);
        let err = bad_service.process(&image_upload(png(4, 4))).await.unwrap_err();
        assert!(matches!(err, OcrRequestError::Engine(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_pdf_is_staged_even_in_memory_mode() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.upload.policy = crate::upload::ValidationPolicy::Extension;
        config.pipeline.temp_dir = Some(dir.path().to_path_buf());

        let (service, _) = service(&config, MockEngine::returning(json!([])));
        let upload = Upload {
            filename: Some("scan.pdf".to_string()),
            content_type: Some("application/pdf".to_string()),
            data: Bytes::from_static(b"%PDF-1.4"),
        };

        let outcome = service.process(&upload).await.unwrap();
        assert!(outcome.result.is_empty());
        assert!(outcome.image_size.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_engine_unavailable_surfaces() {
        let factory = Arc::new(MockFactory::failing(usize::MAX));
        let service = OcrService::new(&Config::default(), factory);

        let err = service.process(&image_upload(png(2, 2))).await.unwrap_err();
        assert!(matches!(err, OcrRequestError::Engine(EngineError::Unavailable(_))));
        assert!(!service.engine_status().is_healthy());
    }
}
