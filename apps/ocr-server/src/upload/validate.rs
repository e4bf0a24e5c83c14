//! Upload validation
//!
//! Pure checks over upload metadata. Nothing here decodes the file: a
//! rejection must happen before any expensive work is started.

use crate::config::UploadConfig;

use super::types::{extension_of, Upload, ValidationError, ValidationPolicy, SUPPORTED_EXTENSIONS};

/// Check the declared type of an upload against the configured policy.
///
/// Runs on the multipart headers, before the body is read.
pub fn check_declared_type(
    filename: Option<&str>,
    content_type: Option<&str>,
    rules: &UploadConfig,
) -> Result<(), ValidationError> {
    match rules.policy {
        ValidationPolicy::ContentType => {
            let declared = content_type.unwrap_or("").trim();
            if declared.to_ascii_lowercase().starts_with("image/") {
                Ok(())
            } else {
                let shown = if declared.is_empty() { "unknown" } else { declared };
                Err(ValidationError::UnsupportedContentType(shown.to_string()))
            }
        }
        ValidationPolicy::Extension => {
            let extension = filename.and_then(extension_of).map(|ext| format!(".{}", ext));
            match extension {
                Some(ext) if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
                Some(ext) => Err(ValidationError::UnsupportedExtension(ext)),
                None => Err(ValidationError::UnsupportedExtension("(none)".to_string())),
            }
        }
    }
}

/// Check an upload's byte length against the ceiling.
pub fn check_size(len: usize, rules: &UploadConfig) -> Result<(), ValidationError> {
    match rules.max_bytes {
        Some(max) if len > max => Err(ValidationError::FileTooLarge { max }),
        _ => Ok(()),
    }
}

/// Full validation of a received upload.
pub fn validate(upload: &Upload, rules: &UploadConfig) -> Result<(), ValidationError> {
    check_declared_type(upload.filename.as_deref(), upload.content_type.as_deref(), rules)?;
    check_size(upload.size(), rules)
}
