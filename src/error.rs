//! Centralized error types for email-to-epub.
//!
//! [`ConvertError`] covers everything that aborts a run. Per-image problems
//! are described by [`FetchError`] and only ever logged.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that abort a conversion run.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No `.eml` files were given or found.
    #[error("no eml given")]
    NoInput,

    /// The output file is already there; we never overwrite it.
    #[error("output file {0} already exists")]
    OutputExists(PathBuf),

    /// The email file could not be parsed as an RFC 5322 message.
    #[error("cannot parse email: {0}")]
    EmailParse(PathBuf),

    /// The cover image is unusable.
    #[error("cannot add cover: {0}")]
    Cover(String),

    /// The book builder rejected an image or section.
    #[error("book error: {0}")]
    Book(String),

    /// Writing the EPUB container failed.
    #[error("cannot write output epub: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The HTTP client could not be set up.
    #[error("cannot build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// The user interrupted the run.
    #[error("Operation cancelled by user")]
    Cancelled,
}

/// Convenience alias for `Result<T, ConvertError>`.
pub type Result<T> = std::result::Result<T, ConvertError>;

impl ConvertError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `ConvertError::io`).
impl From<std::io::Error> for ConvertError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}

/// Why a single remote image could not be stored locally.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("response status code {0} invalid")]
    Status(u16),

    /// Fewer bytes arrived than the server announced.
    #[error("expected {expected} but downloaded {written}")]
    Truncated { expected: String, written: String },

    #[error("cannot write '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl FetchError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a `Truncated` error with human-readable sizes.
    pub fn truncated(expected: u64, written: u64) -> Self {
        use humansize::{format_size, DECIMAL};

        Self::Truncated {
            expected: format_size(expected, DECIMAL),
            written: format_size(written, DECIMAL),
        }
    }
}
