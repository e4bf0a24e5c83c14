//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::ocr::{EngineFactory, OcrService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    ocr: OcrService,
}

impl AppState {
    /// Create a new application state
    ///
    /// The engine is not built here; see [`OcrService::warm_up`] for eager
    /// initialization.
    pub fn new(config: Config, factory: Arc<dyn EngineFactory>) -> Self {
        let ocr = OcrService::new(&config, factory);
        Self {
            inner: Arc::new(AppStateInner { config, ocr }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the OCR pipeline
    pub fn ocr(&self) -> &OcrService {
        &self.inner.ocr
    }
}
