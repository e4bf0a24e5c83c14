//! OCR Engines
//!
//! Defines the engine and factory traits and the HTTP engine backend. The
//! Tesseract backend lives in `tesseract.rs`.

use std::sync::Arc;

use async_trait::async_trait;

use super::raw::RawOutput;
use super::tesseract::TesseractFactory;
use super::types::{EngineError, EngineInput, RecognizeOptions};
use crate::config::{EngineBackend, EngineConfig};

/// A ready-to-use OCR engine
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Short backend name, for logs
    fn name(&self) -> &'static str;

    /// Recognize text in an image (or document, for file input)
    async fn recognize(
        &self,
        input: EngineInput<'_>,
        options: &RecognizeOptions,
    ) -> Result<RawOutput, EngineError>;
}

/// Builds an engine. Construction may be slow and may fail.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    fn name(&self) -> &'static str;

    async fn build(&self) -> Result<Arc<dyn OcrEngine>, EngineError>;
}

/// Pick the factory for the configured backend
pub fn factory_for(config: &EngineConfig) -> Arc<dyn EngineFactory> {
    match config.backend {
        EngineBackend::Tesseract => Arc::new(TesseractFactory::new(
            &config.tesseract_path,
            &config.language,
            config.use_angle_cls,
        )),
        EngineBackend::Http => Arc::new(HttpEngineFactory::new(&config.engine_url, &config.language)),
    }
}

// ============================================================================
// HTTP engine
// ============================================================================

/// Remote PaddleOCR-style engine.
///
/// `POST {base}/ocr` with `{"image": <base64>, "cls": bool, "lang": str}`;
/// the reply is either the nested raw result or `{"result": <raw>}`.
pub struct HttpEngine {
    client: reqwest::Client,
    base_url: String,
    language: String,
}

impl HttpEngine {
    pub fn new(base_url: &str, language: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            language: language.to_string(),
        }
    }
}

#[async_trait]
impl OcrEngine for HttpEngine {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn recognize(
        &self,
        input: EngineInput<'_>,
        options: &RecognizeOptions,
    ) -> Result<RawOutput, EngineError> {
        use base64::Engine;

        let image_data = match input {
            EngineInput::Pixels(image) => image
                .to_png()
                .map_err(|e| EngineError::ProcessingError(format!("Failed to encode image: {}", e)))?,
            EngineInput::File(path) => tokio::fs::read(path).await.map_err(|e| {
                EngineError::ProcessingError(format!("Failed to read {}: {}", path.display(), e))
            })?,
        };

        let request = serde_json::json!({
            "image": base64::engine::general_purpose::STANDARD.encode(&image_data),
            "cls": options.classify_orientation,
            "lang": self.language,
        });

        let url = format!("{}/ocr", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::ApiError(format!("Failed to call OCR engine: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::ApiError(format!(
                "OCR engine returned {}: {}",
                status, body
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EngineError::ApiError(format!("Failed to parse response: {}", e)))?;

        match body.get("result") {
            Some(result) => RawOutput::from_json(result),
            None => RawOutput::from_json(&body),
        }
    }
}

/// Probes `{base}/health` before handing out an [`HttpEngine`]
pub struct HttpEngineFactory {
    base_url: String,
    language: String,
}

impl HttpEngineFactory {
    pub fn new(base_url: &str, language: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            language: language.to_string(),
        }
    }
}

#[async_trait]
impl EngineFactory for HttpEngineFactory {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn build(&self) -> Result<Arc<dyn OcrEngine>, EngineError> {
        let url = format!("{}/health", self.base_url);
        let response = reqwest::Client::new()
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::InitFailed(format!("OCR engine at {} unreachable: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(EngineError::InitFailed(format!(
                "OCR engine at {} reported {}",
                url,
                response.status()
            )));
        }

        Ok(Arc::new(HttpEngine::new(&self.base_url, &self.language)))
    }
}

// ============================================================================
// Test doubles
// ============================================================================

#[cfg(test)]
pub mod mock {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    /// Engine returning a canned raw result
    pub struct MockEngine {
        pub response: Result<serde_json::Value, EngineError>,
        pub calls: Arc<AtomicUsize>,
    }

    impl MockEngine {
        pub fn returning(value: serde_json::Value) -> Self {
            Self {
                response: Ok(value),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl OcrEngine for MockEngine {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn recognize(
            &self,
            _input: EngineInput<'_>,
            _options: &RecognizeOptions,
        ) -> Result<RawOutput, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Ok(value) => RawOutput::from_json(value),
                Err(e) => Err(e.clone()),
            }
        }
    }

    /// Factory that fails its first `failures` builds, then hands out `engine`
    pub struct MockFactory {
        pub engine: Arc<MockEngine>,
        pub failures: usize,
        pub delay: Duration,
        pub builds: AtomicUsize,
    }

    impl MockFactory {
        pub fn new(engine: MockEngine) -> Self {
            Self {
                engine: Arc::new(engine),
                failures: 0,
                delay: Duration::ZERO,
                builds: AtomicUsize::new(0),
            }
        }

        pub fn failing(failures: usize) -> Self {
            Self {
                failures,
                ..Self::new(MockEngine::returning(serde_json::Value::Null))
            }
        }

        pub fn builds(&self) -> usize {
            self.builds.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EngineFactory for MockFactory {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn build(&self) -> Result<Arc<dyn OcrEngine>, EngineError> {
            let attempt = self.builds.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if attempt < self.failures {
                return Err(EngineError::InitFailed("model files missing".to_string()));
            }
            Ok(self.engine.clone())
        }
    }
}
