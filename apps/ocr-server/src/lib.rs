//! OCR Server Library
//!
//! HTTP service that accepts an uploaded image (or PDF) and returns the text
//! recognized by an external OCR engine. The binary in main.rs wires these
//! modules to a listener; integration tests drive [`routes::app`] directly.
//!
//! # Modules
//!
//! - `upload`: validation and scoped on-disk staging of uploads
//! - `preprocess`: image decoding and normalization
//! - `ocr`: engine backends, the shared engine slot, and the pipeline
//! - `routes`: `GET /`, `GET /health`, `POST /ocr`

pub mod config;
pub mod error;
pub mod ocr;
pub mod preprocess;
pub mod routes;
pub mod state;
pub mod upload;
