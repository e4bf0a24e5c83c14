//! Upload handling
//!
//! Validation of incoming files and scoped on-disk staging for engines that
//! read from a path.

mod temp;
mod types;
mod validate;

pub use temp::{temp_suffix, ScopedTempFile};
pub use types::{
    Upload, ValidationError, ValidationPolicy, DEFAULT_MAX_UPLOAD_BYTES, SUPPORTED_CONTENT_TYPES,
    SUPPORTED_EXTENSIONS,
};
pub use validate::{check_declared_type, check_size, validate};
