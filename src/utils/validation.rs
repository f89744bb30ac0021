//! Validation utilities for image formats and paths

use std::path::Path;

use crate::config::formats;
use crate::error::{AppError, Result};

/// Normalize an extension and check it against the allow-list
///
/// # Arguments
/// * `extension` - The extension, with or without leading dot
///
/// # Returns
/// The lowercase extension without dot, or `UnsupportedFormat`
pub fn validate_extension(extension: &str) -> Result<String> {
    let normalized = extension.trim().trim_start_matches('.').to_lowercase();

    if !formats::is_allowed_extension(&normalized) {
        return Err(AppError::UnsupportedFormat(format!(
            "Formato non supportato: '{}' (ammessi: {})",
            extension,
            formats::ALLOWED_EXTENSIONS.join(", ")
        )));
    }

    Ok(normalized)
}

/// Lowercase extension of `path`, if any
pub fn file_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_extension() {
        assert_eq!(validate_extension(".PNG").unwrap(), "png");
        assert_eq!(validate_extension(" jpeg ").unwrap(), "jpeg");
        match validate_extension("tiff") {
            Err(AppError::UnsupportedFormat(msg)) => {
                assert!(msg.contains("'tiff'"));
                assert!(msg.contains("png"));
            }
            other => panic!("atteso UnsupportedFormat, ottenuto {:?}", other),
        }
        assert!(validate_extension("").is_err());
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(
            file_extension(Path::new("/tmp/foto.JPG")).as_deref(),
            Some("jpg")
        );
        assert_eq!(file_extension(Path::new("/tmp/senza")), None);
    }
}
