//! Validation of file names used for persisted artifacts.
//!
//! The master key file and the JSON credential collection are referenced by
//! configurable names. Only a bare base name made of safe characters is
//! accepted; anything that could steer I/O outside the configured data
//! directory is rejected before a path is ever built.

use thiserror::Error;

/// Longest accepted file name in bytes (the common filesystem limit).
pub const MAX_FILE_NAME_LEN: usize = 255;

/// Reasons a file name is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileNameError {
    #[error("file name cannot be empty")]
    Empty,

    #[error("file name too long ({0} bytes, max {MAX_FILE_NAME_LEN})")]
    TooLong(usize),

    #[error("file name '{0}' contains a path separator")]
    PathSeparator(String),

    #[error("file name '{0}' contains a parent-directory reference")]
    ParentReference(String),

    #[error("file name '{0}' starts with a dot")]
    Hidden(String),

    #[error("file name '{name}' contains disallowed character {ch:?}")]
    InvalidCharacter { name: String, ch: char },
}

/// Checks that `name` is a safe base name and returns it unchanged.
///
/// Accepted names are non-empty, at most [`MAX_FILE_NAME_LEN`] bytes, do
/// not start with `.`, contain no `/`, `\` or `..`, and use only ASCII
/// alphanumerics, `.`, `_` and `-`.
///
/// # Errors
///
/// Returns the first [`FileNameError`] that applies.
pub fn sanitize_file_name(name: &str) -> Result<&str, FileNameError> {
    if name.is_empty() {
        return Err(FileNameError::Empty);
    }
    if name.contains('/') || name.contains('\\') {
        return Err(FileNameError::PathSeparator(name.to_string()));
    }
    if name.contains("..") {
        return Err(FileNameError::ParentReference(name.to_string()));
    }
    if name.starts_with('.') {
        return Err(FileNameError::Hidden(name.to_string()));
    }
    if let Some(ch) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(FileNameError::InvalidCharacter {
            name: name.to_string(),
            ch,
        });
    }
    if name.len() > MAX_FILE_NAME_LEN {
        return Err(FileNameError::TooLong(name.len()));
    }
    Ok(name)
}
