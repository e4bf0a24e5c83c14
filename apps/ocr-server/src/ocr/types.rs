//! OCR Types
//!
//! Recognition results as returned to clients, the transformation from raw
//! engine output, and the engine error type.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::raw::RawOutput;
use crate::preprocess::NormalizedImage;

/// A polygon vertex, `[x, y]` in image pixels
pub type Point = [f64; 2];

/// One recognized line of text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionLine {
    pub text: String,
    /// Engine certainty in [0, 1]
    pub confidence: f64,
    /// Outline of the text region, in order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<Point>>,
}

/// All lines recognized for one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionResult {
    pub lines: Vec<RecognitionLine>,
    pub full_text: String,
    pub count: usize,
}

/// Separator used when concatenating lines into `full_text`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinPolicy {
    #[default]
    Space,
    Newline,
}

impl JoinPolicy {
    pub fn separator(&self) -> &'static str {
        match self {
            Self::Space => " ",
            Self::Newline => "\n",
        }
    }
}

/// Shaping options for [`RecognitionResult::from_raw`]
#[derive(Debug, Clone)]
pub struct TransformOptions {
    pub join: JoinPolicy,
    pub confidence_decimals: Option<u32>,
    pub include_bbox: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            join: JoinPolicy::Space,
            confidence_decimals: Some(4),
            include_bbox: true,
        }
    }
}

impl RecognitionResult {
    /// Flatten raw engine output into response lines, in engine order.
    ///
    /// Empty output is a valid result with zero lines.
    pub fn from_raw(raw: &RawOutput, options: &TransformOptions) -> Self {
        let lines: Vec<RecognitionLine> = raw
            .detections()
            .map(|detection| RecognitionLine {
                text: detection.text.clone(),
                confidence: shape_confidence(detection.confidence, options.confidence_decimals),
                bbox: if options.include_bbox {
                    detection.polygon.clone()
                } else {
                    None
                },
            })
            .collect();

        let full_text = lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join(options.join.separator());

        Self {
            count: lines.len(),
            lines,
            full_text,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

fn shape_confidence(value: f64, decimals: Option<u32>) -> f64 {
    let clamped = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
    match decimals {
        Some(places) => {
            let factor = 10f64.powi(places.min(15) as i32);
            (clamped * factor).round() / factor
        }
        None => clamped,
    }
}

// ============================================================================
// Engine call contract
// ============================================================================

/// What an engine is asked to read
#[derive(Debug, Clone, Copy)]
pub enum EngineInput<'a> {
    /// Normalized pixels held in memory
    Pixels(&'a NormalizedImage),
    /// A file on disk, in its original format
    File(&'a Path),
}

/// Per-call engine options
#[derive(Debug, Clone, Copy, Default)]
pub struct RecognizeOptions {
    /// Detect and correct text orientation before recognition
    pub classify_orientation: bool,
}

/// OCR engine error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("OCR engine not available: {0}")]
    Unavailable(String),

    #[error("OCR engine initialization failed: {0}")]
    InitFailed(String),

    #[error("OCR processing failed: {0}")]
    ProcessingError(String),

    #[error("Malformed OCR engine output: {0}")]
    MalformedOutput(String),

    #[error("API error: {0}")]
    ApiError(String),
}

impl EngineError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::Unavailable(_) | Self::InitFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawOutput {
        RawOutput::from_json(&value).unwrap()
    }

    #[test]
    fn test_empty_output_is_zero_lines() {
        let result = RecognitionResult::from_raw(&RawOutput::Empty, &TransformOptions::default());
        assert!(result.is_empty());
        assert_eq!(result.count, 0);
        assert_eq!(result.full_text, "");
    }

    #[test]
    fn test_lines_in_engine_order() {
        let output = raw(json!([[
            [[[0, 0], [10, 0], [10, 5], [0, 5]], ["Hello", 0.987654]],
            [[[0, 6], [10, 6], [10, 11], [0, 11]], ["World", 0.5]]
        ]]));

        let result = RecognitionResult::from_raw(&output, &TransformOptions::default());
        assert_eq!(result.count, 2);
        assert_eq!(result.full_text, "Hello World");
        assert_eq!(result.lines[0].text, "Hello");
        assert_eq!(result.lines[0].confidence, 0.9877);
        assert_eq!(
            result.lines[0].bbox.as_deref(),
            Some(&[[0.0, 0.0], [10.0, 0.0], [10.0, 5.0], [0.0, 5.0]][..])
        );
        assert_eq!(result.lines[1].confidence, 0.5);
    }

    #[test]
    fn test_join_and_rounding_options() {
        let output = raw(json!([[
            [null, ["a", 0.123456]],
            [null, ["b", 0.9]]
        ]]));
        let options = TransformOptions {
            join: JoinPolicy::Newline,
            confidence_decimals: None,
            include_bbox: false,
        };

        let result = RecognitionResult::from_raw(&output, &options);
        assert_eq!(result.full_text, "a\nb");
        assert_eq!(result.lines[0].confidence, 0.123456);
        assert!(result.lines[0].bbox.is_none());
    }

    #[test]
    fn test_bbox_dropped_when_disabled() {
        let output = raw(json!([[[[[1, 2], [3, 4]], ["x", 1.0]]]]));
        let options = TransformOptions {
            include_bbox: false,
            ..TransformOptions::default()
        };
        let result = RecognitionResult::from_raw(&output, &options);
        assert!(result.lines[0].bbox.is_none());
    }

    #[test]
    fn test_confidence_clamped() {
        assert_eq!(shape_confidence(1.7, Some(4)), 1.0);
        assert_eq!(shape_confidence(-0.2, Some(4)), 0.0);
        assert_eq!(shape_confidence(f64::NAN, None), 0.0);
        assert_eq!(shape_confidence(0.33335, Some(2)), 0.33);
    }

    #[test]
    fn test_transform_is_deterministic() {
        let value = json!([[
            [[[0, 0], [1, 1]], ["same", 0.8]],
            [[[2, 2], [3, 3]], ["text", 0.7]]
        ]]);
        let options = TransformOptions::default();
        let first = RecognitionResult::from_raw(&raw(value.clone()), &options);
        let second = RecognitionResult::from_raw(&raw(value), &options);
        assert_eq!(first, second);
    }

    #[test]
    fn test_line_serialization_skips_missing_bbox() {
        let line = RecognitionLine {
            text: "hi".to_string(),
            confidence: 0.9,
            bbox: None,
        };
        assert_eq!(
            serde_json::to_value(&line).unwrap(),
            json!({"text": "hi", "confidence": 0.9})
        );
    }

    #[test]
    fn test_error_status_codes() {
        use axum::http::StatusCode;
        assert_eq!(
            EngineError::Unavailable("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            EngineError::InitFailed("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            EngineError::ProcessingError("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
