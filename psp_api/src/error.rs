//! Platform support error types

use thiserror::Error;

/// Errors returned by platform support calls
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PspError {
    /// Persistent region read or write failed
    #[error("CDS media access error: {0}")]
    AccessError(String),

    /// Offset/length fell outside the persistent region
    #[error("CDS access out of range")]
    OutOfRange,

    /// The platform provides no usable persistent region
    #[error("CDS not available on this platform")]
    Unavailable,
}
