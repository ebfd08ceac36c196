//! # Error Module
//!
//! Error types for the barcode PDF router.
//!
//! ## Design Principles
//! - **Never panic** on document content - return errors instead
//! - **Include context** - paths, file names, what went wrong
//! - **Separate misses from failures** - "no barcode" is an outcome, not an error
//! - **Transient vs fatal** - a bad candidate image never aborts a document

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum BarcodePdfError {
    #[error("Document error: {0}")]
    Document(#[from] DocumentOpenError),

    #[error("Move error: {0}")]
    Move(#[from] MoveError),

    #[error("Watch setup error: {0}")]
    Watch(#[from] WatchSetupError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Barcode encoding error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Failed to write image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Failed to install Ctrl+C handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// Errors that occur while opening a PDF
///
/// A producer that is still writing the file usually shows up as
/// `Unreadable` or `Corrupt`.
#[derive(Error, Debug)]
pub enum DocumentOpenError {
    #[error("Document not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to read document {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Document {path} is not a valid PDF: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Errors that affect a single candidate image.
///
/// These are recovered locally: the candidate is skipped and the next
/// one is tried.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unsupported image filter: {filter}")]
    UnsupportedFilter { filter: String },

    #[error("Unsupported colour space: {name}")]
    UnsupportedColorSpace { name: String },

    #[error("Invalid image: {reason}")]
    InvalidImage { reason: String },

    #[error("Page {page} could not be rendered: {reason}")]
    Render { page: u32, reason: String },
}

/// Errors that occur while moving a document
#[derive(Error, Debug)]
pub enum MoveError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move {from} to {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Copy verification failed for {to}: source {expected} bytes, destination {actual} bytes")]
    VerifyFailed {
        to: PathBuf,
        expected: u64,
        actual: u64,
    },
}

/// Errors that prevent a watch session from starting
#[derive(Error, Debug)]
pub enum WatchSetupError {
    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to watch {path}: {reason}")]
    WatchFailed { path: PathBuf, reason: String },
}

/// Errors from loading the configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// Errors from encoding a CODE-128 symbol
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Cannot encode an empty payload")]
    Empty,

    #[error("Character {ch:?} cannot be encoded in CODE-128 code set B")]
    UnsupportedCharacter { ch: char },
}

/// Why processing a document failed
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error(transparent)]
    Document(#[from] DocumentOpenError),

    #[error(transparent)]
    Move(#[from] MoveError),

    #[error("Failed to read metadata for {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, BarcodePdfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_error_includes_path() {
        let error = DocumentOpenError::Corrupt {
            path: PathBuf::from("/scans/incoming/broken.pdf"),
            reason: "invalid file header".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("/scans/incoming/broken.pdf"));
        assert!(message.contains("invalid file header"));
    }

    #[test]
    fn move_error_names_both_paths() {
        let error = MoveError::Move {
            from: PathBuf::from("/scans/a.pdf"),
            to: PathBuf::from("/done/12345.pdf"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let message = error.to_string();
        assert!(message.contains("/scans/a.pdf"));
        assert!(message.contains("/done/12345.pdf"));
    }

    #[test]
    fn process_error_is_transparent() {
        let error: ProcessError = DocumentOpenError::NotFound {
            path: PathBuf::from("/scans/gone.pdf"),
        }
        .into();
        assert_eq!(error.to_string(), "Document not found: /scans/gone.pdf");
    }

    #[test]
    fn encode_error_shows_character() {
        let error = EncodeError::UnsupportedCharacter { ch: 'é' };
        assert!(error.to_string().contains("'é'"));
    }
}
