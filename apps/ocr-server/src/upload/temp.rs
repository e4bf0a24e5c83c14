//! Scoped on-disk staging for uploads
//!
//! Some engines only accept a path. The upload is written to a uniquely named
//! file that is removed when the guard is dropped, whatever way the request
//! ends. A failed removal is logged and otherwise ignored.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempPath;

use super::types::{extension_of, Upload, SUPPORTED_EXTENSIONS};

const TEMP_PREFIX: &str = "ocr-upload-";
const DEFAULT_SUFFIX: &str = ".png";

/// Temp file holding one upload. Deleted on drop.
#[derive(Debug)]
pub struct ScopedTempFile {
    path: PathBuf,
    temp: Option<TempPath>,
}

impl ScopedTempFile {
    /// Create a uniquely named file in `dir` (or the system temp dir) and
    /// write `data` to it.
    pub async fn write(dir: Option<&Path>, suffix: &str, data: &[u8]) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(TEMP_PREFIX).suffix(suffix);

        let file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        // From here on the guard owns the path, so a failed write still cleans up
        let temp = file.into_temp_path();
        let guard = Self {
            path: temp.to_path_buf(),
            temp: Some(temp),
        };

        tokio::fs::write(&guard.path, data).await?;

        tracing::debug!(path = %guard.path.display(), bytes = data.len(), "Staged upload");
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedTempFile {
    fn drop(&mut self) {
        if let Some(temp) = self.temp.take() {
            match temp.close() {
                Ok(()) => tracing::debug!(path = %self.path.display(), "Removed staged upload"),
                Err(e) => tracing::warn!(
                    path = %self.path.display(),
                    "Failed to remove staged upload: {}",
                    e
                ),
            }
        }
    }
}

/// Pick the temp file suffix for an upload: its own extension, else one
/// guessed from the content type, else `.png`.
pub fn temp_suffix(upload: &Upload) -> String {
    if let Some(ext) = upload.extension().filter(|ext| is_safe_extension(ext)) {
        return format!(".{}", ext);
    }

    let guessed = upload
        .content_type
        .as_deref()
        .and_then(mime_guess::get_mime_extensions_str)
        .and_then(|candidates| {
            candidates
                .iter()
                .find(|ext| SUPPORTED_EXTENSIONS.contains(&format!(".{}", ext).as_str()))
                .or_else(|| candidates.first())
        });

    match guessed {
        Some(ext) => format!(".{}", ext),
        None => DEFAULT_SUFFIX.to_string(),
    }
}

fn is_safe_extension(ext: &str) -> bool {
    !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric())
}
