//! Error types for the Scangate service.

use thiserror::Error;

/// Main error type for Scangate operations.
///
/// Admission rejections (rate limit, cooldown, opt-out) are not errors; they
/// are a typed outcome of `ScanService::admit_scan`. This enum covers faults
/// in the crate's own plumbing and in the external capabilities it consumes.
#[derive(Error, Debug)]
pub enum ScangateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Report store errors
    #[error("Report store error: {0}")]
    Store(String),

    /// Scanner execution errors
    #[error("Scanner error: {0}")]
    Scanner(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Scangate operations.
pub type Result<T> = std::result::Result<T, ScangateError>;
