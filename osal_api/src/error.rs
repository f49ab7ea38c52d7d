//! OS abstraction error types

use thiserror::Error;

/// Errors returned by OS abstraction calls
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OsError {
    /// Task creation failed
    #[error("Failed to create task: {0}")]
    TaskCreateFailed(String),

    /// Task deletion failed
    #[error("Failed to delete task: {0}")]
    TaskDeleteFailed(String),

    /// A handle did not resolve to a live OS object
    #[error("Invalid OS handle")]
    InvalidHandle,

    /// Semaphore operation failed
    #[error("Semaphore error: {0}")]
    SemError(String),

    /// Semaphore timed wait expired
    #[error("Operation timed out")]
    Timeout,

    /// File could not be opened
    #[error("Failed to open file: {0}")]
    FileOpenFailed(String),

    /// File write failed
    #[error("File write failed")]
    FileWriteFailed,

    /// File read failed
    #[error("File read failed")]
    FileReadFailed,

    /// Module load failed
    #[error("Failed to load module: {0}")]
    ModuleLoadFailed(String),

    /// Module unload failed
    #[error("Failed to unload module: {0}")]
    ModuleUnloadFailed(String),

    /// Symbol lookup failed
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// OS resource table exhausted
    #[error("OS resource exhausted: {0}")]
    ResourceExhausted(String),
}
