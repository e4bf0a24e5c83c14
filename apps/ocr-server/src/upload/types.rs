//! Upload types for the OCR endpoint

use axum::body::Bytes;
use serde::Deserialize;
use std::path::Path;

// ============================================================================
// Constants
// ============================================================================

/// Default upload ceiling: 5MB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Content types advertised when a non-image upload is rejected
pub const SUPPORTED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png", "image/bmp", "image/tiff"];

/// Extensions accepted by the extension-based policy
pub const SUPPORTED_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".bmp", ".tiff", ".webp", ".pdf"];

// ============================================================================
// Upload
// ============================================================================

/// Which header decides whether an upload is acceptable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationPolicy {
    /// Declared content type must start with `image/`
    #[default]
    ContentType,
    /// Filename extension must be in [`SUPPORTED_EXTENSIONS`]
    Extension,
}

impl ValidationPolicy {
    /// Types listed back to the client on rejection
    pub fn supported_types(&self) -> &'static [&'static str] {
        match self {
            Self::ContentType => SUPPORTED_CONTENT_TYPES,
            Self::Extension => SUPPORTED_EXTENSIONS,
        }
    }
}

/// A file received on `POST /ocr`. Lives for one request.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Original file name, as sent by the client
    pub filename: Option<String>,
    /// Declared MIME type
    pub content_type: Option<String>,
    /// Raw file content
    pub data: Bytes,
}

impl Upload {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Lowercased filename extension without the dot
    pub fn extension(&self) -> Option<String> {
        self.filename.as_deref().and_then(extension_of)
    }

    pub fn is_pdf(&self) -> bool {
        self.extension().as_deref() == Some("pdf")
            || self
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.eq_ignore_ascii_case("application/pdf"))
    }
}

pub(crate) fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| ext.to_ascii_lowercase())
}

// ============================================================================
// Error Types
// ============================================================================

/// Client-side upload problems. Always answered with 400.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Only image files supported, got {0}")]
    UnsupportedContentType(String),

    #[error("File extension {0} is not supported")]
    UnsupportedExtension(String),

    #[error("File size must be less than {}", format_limit(.max))]
    FileTooLarge { max: usize },

    #[error("No file provided. Use field name 'file'")]
    MissingFile,

    #[error("Failed to read upload: {0}")]
    Malformed(String),
}

impl ValidationError {
    /// Stable, machine-readable error label
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedContentType(_) | Self::UnsupportedExtension(_) => "Unsupported file type",
            Self::FileTooLarge { .. } => "File too large",
            Self::MissingFile => "No file provided",
            Self::Malformed(_) => "Invalid upload",
        }
    }

    pub fn supported_types(&self) -> Option<&'static [&'static str]> {
        match self {
            Self::UnsupportedContentType(_) => Some(ValidationPolicy::ContentType.supported_types()),
            Self::UnsupportedExtension(_) => Some(ValidationPolicy::Extension.supported_types()),
            _ => None,
        }
    }
}

fn format_limit(bytes: &usize) -> String {
    const MB: usize = 1024 * 1024;
    const KB: usize = 1024;
    if *bytes >= MB && bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else if *bytes >= KB && bytes % KB == 0 {
        format!("{}KB", bytes / KB)
    } else {
        format!("{} bytes", bytes)
    }
}
