//! Upload validation
//!
//! Cheap checks that run before any decoding or inference, in a fixed
//! order: presence, filename, extension, size.

use thiserror::Error;

use crate::settings::UploadConfig;

const MIB: usize = 1024 * 1024;

/// A file received in the `image` form field
#[derive(Debug, Clone, Default)]
pub struct Upload {
    /// Declared filename, only used for the extension check
    pub filename: String,
    /// File bytes; truncated once `size` passes the upload limit
    pub data: Vec<u8>,
    /// Total number of bytes received for the field
    pub size: usize,
}

/// Client-correctable upload problems
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("No image file provided")]
    Missing,
    #[error("No image file selected")]
    EmptyFilename,
    #[error("Invalid file type. Allowed types: {}", .allowed.join(", "))]
    InvalidExtension { allowed: Vec<String> },
    #[error("File too large. Maximum size allowed: {max_mb}MB")]
    TooLarge { max_mb: usize },
}

/// Whole megabytes in a byte limit, as reported to clients
pub fn limit_in_mb(max_bytes: usize) -> usize {
    max_bytes / MIB
}

/// Whether `filename` ends in one of the allowed extensions.
///
/// The extension is the text after the last `.`, compared case-insensitively.
pub fn allowed_file(filename: &str, allowed: &[String]) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => {
            let ext = ext.to_lowercase();
            allowed.iter().any(|a| *a == ext)
        }
        None => false,
    }
}

/// Validate an upload, returning it when every check passes
pub fn validate_upload(upload: Option<Upload>, policy: &UploadConfig) -> Result<Upload, UploadError> {
    let upload = upload.ok_or(UploadError::Missing)?;

    if upload.filename.is_empty() {
        return Err(UploadError::EmptyFilename);
    }

    if !allowed_file(&upload.filename, &policy.allowed_extensions) {
        return Err(UploadError::InvalidExtension {
            allowed: policy.allowed_extensions.clone(),
        });
    }

    if upload.size > policy.max_bytes {
        return Err(UploadError::TooLarge {
            max_mb: limit_in_mb(policy.max_bytes),
        });
    }

    Ok(upload)
}
