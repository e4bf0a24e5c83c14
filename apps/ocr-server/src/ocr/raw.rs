//! Raw engine output
//!
//! Engines report one entry per page, each page a list of detections, each
//! detection `[polygon, [text, confidence]]`. Any level may be `null`. This
//! module decodes that shape into [`RawOutput`], keeping "nothing detected"
//! apart from "not the shape we expect".

use serde_json::Value;

use super::types::{EngineError, Point};

/// Decoded engine output for one request
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
    /// The engine found no text
    Empty,
    /// At least one detection, grouped by page
    Pages(Vec<RawPage>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawPage {
    pub detections: Vec<RawDetection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub polygon: Option<Vec<Point>>,
    pub text: String,
    pub confidence: f64,
}

impl RawOutput {
    /// Build from pages, collapsing to [`RawOutput::Empty`] when no page
    /// holds a detection.
    pub fn from_pages(pages: Vec<RawPage>) -> Self {
        let pages: Vec<RawPage> = pages
            .into_iter()
            .filter(|page| !page.detections.is_empty())
            .collect();
        if pages.is_empty() {
            Self::Empty
        } else {
            Self::Pages(pages)
        }
    }

    /// Decode the nested JSON shape.
    ///
    /// `null`, `[]`, `[null]` and `[[]]` all mean "nothing detected". `null`
    /// pages and `null`/`[]` detections are skipped. Anything else that does
    /// not fit is reported as [`EngineError::MalformedOutput`].
    pub fn from_json(value: &Value) -> Result<Self, EngineError> {
        let pages = match value {
            Value::Null => return Ok(Self::Empty),
            Value::Array(pages) => pages,
            other => return Err(malformed("top level", other)),
        };

        let mut decoded = Vec::with_capacity(pages.len());
        for (page_index, page) in pages.iter().enumerate() {
            let entries = match page {
                Value::Null => continue,
                Value::Array(entries) => entries,
                other => return Err(malformed(&format!("page {}", page_index), other)),
            };

            let mut detections = Vec::with_capacity(entries.len());
            for (index, entry) in entries.iter().enumerate() {
                let location = format!("page {} detection {}", page_index, index);
                match entry {
                    Value::Null => continue,
                    Value::Array(parts) if parts.is_empty() => continue,
                    Value::Array(parts) => detections.push(decode_detection(parts, &location)?),
                    other => return Err(malformed(&location, other)),
                }
            }
            decoded.push(RawPage { detections });
        }

        Ok(Self::from_pages(decoded))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// All detections, page by page
    pub fn detections(&self) -> impl Iterator<Item = &RawDetection> {
        let pages: &[RawPage] = match self {
            Self::Empty => &[],
            Self::Pages(pages) => pages,
        };
        pages.iter().flat_map(|page| page.detections.iter())
    }
}

fn decode_detection(parts: &[Value], location: &str) -> Result<RawDetection, EngineError> {
    let [polygon, recognition] = parts else {
        return Err(EngineError::MalformedOutput(format!(
            "{}: expected [polygon, [text, confidence]], got {} elements",
            location,
            parts.len()
        )));
    };

    let polygon = decode_polygon(polygon, location)?;

    let (text, confidence) = match recognition {
        Value::Array(pair) if pair.len() == 2 => (&pair[0], &pair[1]),
        other => return Err(malformed(&format!("{} recognition", location), other)),
    };

    let text = match text {
        Value::String(text) => text.clone(),
        other => return Err(malformed(&format!("{} text", location), other)),
    };

    let confidence = coerce_f64(confidence)
        .ok_or_else(|| malformed(&format!("{} confidence", location), confidence))?;

    Ok(RawDetection {
        polygon,
        text,
        confidence,
    })
}

fn decode_polygon(value: &Value, location: &str) -> Result<Option<Vec<Point>>, EngineError> {
    let points = match value {
        Value::Null => return Ok(None),
        Value::Array(points) => points,
        other => return Err(malformed(&format!("{} polygon", location), other)),
    };

    points
        .iter()
        .map(|point| match point {
            Value::Array(xy) if xy.len() == 2 => match (coerce_f64(&xy[0]), coerce_f64(&xy[1])) {
                (Some(x), Some(y)) => Ok([x, y]),
                _ => Err(malformed(&format!("{} polygon point", location), point)),
            },
            other => Err(malformed(&format!("{} polygon point", location), other)),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Numbers, or strings holding a number
fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

fn malformed(location: &str, value: &Value) -> EngineError {
    let mut shown = value.to_string();
    if shown.len() > 80 {
        let cut = (0..=80).rev().find(|i| shown.is_char_boundary(*i)).unwrap_or(0);
        shown.truncate(cut);
        shown.push_str("...");
    }
    EngineError::MalformedOutput(format!("unexpected value at {}: {}", location, shown))
}
