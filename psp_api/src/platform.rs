//! Platform support trait and exception reporting types

use crate::PspError;
use exec_types::{ResetSubtype, ResetType, TaskId};

/// A pending processor exception reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionInfo {
    /// Task that raised the exception, when the platform can attribute it
    pub task: Option<TaskId>,
    /// Platform description of the fault
    pub description: String,
}

/// A restart requested through the platform layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartRequest {
    pub reset_type: ResetType,
    pub subtype: ResetSubtype,
}

/// The platform support trait
///
/// Implementations wrap the board support package. `RamCds` plus the
/// default method bodies give an in-memory platform suitable for tests.
pub trait PspApi {
    /// Reports the usable size of the persistent CDS region
    fn cds_size(&self) -> Result<usize, PspError>;

    /// Reads from the persistent region at a byte offset
    fn cds_read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), PspError>;

    /// Writes to the persistent region at a byte offset
    fn cds_write(&mut self, offset: usize, data: &[u8]) -> Result<(), PspError>;

    /// Reports how this boot was triggered
    fn reset_info(&self) -> (ResetType, ResetSubtype);

    /// Requests a processor or power-on restart
    ///
    /// On hardware this does not return; implementations here record
    /// the request so the caller (and tests) can observe it.
    fn restart(&mut self, request: RestartRequest);

    /// Halts with a reason code; the fatal-startup escalation path
    fn panic(&mut self, reason: u32, message: &str);

    /// Drains all exceptions the platform has latched since last drain
    fn drain_exceptions(&mut self) -> Vec<ExceptionInfo>;
}
