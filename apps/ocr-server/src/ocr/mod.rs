//! OCR Module
//!
//! Engine abstraction, the shared engine slot, and the upload-to-text
//! pipeline.
//!
//! Supports two backends:
//! - Tesseract (local CLI, requires installation)
//! - HTTP (a remote PaddleOCR-style service)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ocr_server::ocr::{factory_for, OcrService};
//!
//! let factory = factory_for(&config.engine);
//! let service = OcrService::new(&config, factory);
//!
//! let outcome = service.process(&upload).await?;
//! println!("{}", outcome.result.full_text);
//! ```

mod provider;
mod raw;
mod service;
mod slot;
mod tesseract;
mod types;

#[cfg(test)]
pub(crate) use provider::mock;
pub use provider::{factory_for, EngineFactory, HttpEngine, HttpEngineFactory, OcrEngine};
pub use raw::{RawDetection, RawOutput, RawPage};
pub use service::{OcrOutcome, OcrService};
pub use slot::{EngineSlot, EngineStatus, InitPolicy};
pub use tesseract::{TesseractEngine, TesseractFactory};
pub use types::{
    EngineError, EngineInput, JoinPolicy, Point, RecognitionLine, RecognitionResult,
    RecognizeOptions, TransformOptions,
};
