//! Executive services error taxonomy
//!
//! Errors fall into four families: caller-argument errors, resource
//! exhaustion, persistent-media errors, and corruption errors. Media
//! faults and corruption are deliberately distinct variants so a caller
//! can tell "transient I/O fault" from "lost data".

use thiserror::Error;

/// Errors returned by executive services operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EsError {
    /// A caller argument was invalid (null-equivalent, out of range)
    #[error("Bad argument: {0}")]
    BadArgument(String),

    /// Application or library creation failed
    #[error("Application create failed: {0}")]
    AppCreate(String),

    /// The named application does not exist
    #[error("Application not found: {0}")]
    AppNotFound(String),

    /// An app id did not resolve to a live application record
    #[error("Invalid application id")]
    InvalidAppId,

    /// A task id did not resolve to a live task record
    #[error("Invalid task id")]
    InvalidTaskId,

    /// Child task operation invoked from the wrong context
    #[error("Child task operation not permitted: {0}")]
    ChildTaskContext(String),

    /// Attempted to delete a main task through the child task interface
    #[error("Cannot delete a main task by task id")]
    ChildTaskDelete,

    /// No free slot remains in a fixed-capacity table
    #[error("No free slots: {0}")]
    NoFreeSlots(String),

    /// A memory pool or CDS handle failed validation
    #[error("Invalid memory handle")]
    ErrMemHandle,

    /// No configured block size class can satisfy the request
    #[error("Invalid memory block size")]
    ErrMemBlockSize,

    /// The CDS registry has no free entries
    #[error("CDS registry full")]
    CdsRegistryFull,

    /// A CDS name was empty or exceeded the maximum length
    #[error("Invalid CDS name: {0}")]
    CdsInvalidName(String),

    /// A CDS block size was zero or above the configured maximum
    #[error("Invalid CDS size")]
    CdsInvalidSize,

    /// The named CDS block was not found in the registry
    #[error("CDS not found: {0}")]
    CdsNotFound(String),

    /// The CDS block's owning application is still active
    #[error("CDS owner still active")]
    CdsOwnerActive,

    /// Persistent media read/write failed (transient I/O fault)
    #[error("CDS access error: {0}")]
    CdsAccessError(String),

    /// Stored CRC did not match the payload (lost data)
    #[error("CDS block CRC mismatch")]
    CdsBlockCrc,

    /// The persistent region contents failed validation
    #[error("CDS invalid")]
    CdsInvalid,

    /// The platform region is too small; the CDS is running degraded
    #[error("CDS not available")]
    CdsNotAvailable,

    /// The system log is full and configured to discard
    #[error("System log full")]
    SysLogFull,

    /// A background job of this kind is already in progress
    #[error("Background job already pending")]
    Pending,

    /// OS service call failed
    #[error("OS error: {0}")]
    Os(String),
}
