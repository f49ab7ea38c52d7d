//! OS API trait and handle types

use crate::OsError;
use exec_types::TaskId;
use std::fmt;

/// Handle to an open file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(pub u32);

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "File({})", self.0)
    }
}

/// File open mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Read,
    Write,
}

/// Handle to a binary semaphore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SemHandle(pub u32);

/// Handle to a loaded object module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(pub u32);

/// Resolved entry-point address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolAddr(pub u64);

/// The OS abstraction trait
///
/// Implementations: a real RTOS binding, or `sim_osal` for tests. Every
/// call returns a status; the executive propagates failures rather than
/// panicking, except on the fatal startup paths that escalate through
/// the platform layer.
pub trait OsApi {
    /// Creates a preemptive OS task
    ///
    /// The returned `TaskId` is a slot index bounded by the platform
    /// task limit; the executive uses it to key its own task records.
    fn task_create(
        &mut self,
        name: &str,
        priority: u8,
        stack_size: usize,
    ) -> Result<TaskId, OsError>;

    /// Deletes an OS task
    fn task_delete(&mut self, task: TaskId) -> Result<(), OsError>;

    /// Returns the identity of the calling task
    fn task_self(&self) -> Result<TaskId, OsError>;

    /// Creates a binary semaphore with an initial value
    fn bin_sem_create(&mut self, name: &str, initial: u32) -> Result<SemHandle, OsError>;

    /// Deletes a binary semaphore
    fn bin_sem_delete(&mut self, sem: SemHandle) -> Result<(), OsError>;

    /// Gives a binary semaphore
    fn bin_sem_give(&mut self, sem: SemHandle) -> Result<(), OsError>;

    /// Takes a binary semaphore, waiting at most `timeout_ms`
    ///
    /// Timeouts are cooperative; there is no preemptive cancellation.
    fn bin_sem_timed_wait(&mut self, sem: SemHandle, timeout_ms: u32) -> Result<(), OsError>;

    /// Opens a file for reading or writing
    fn file_open(&mut self, path: &str, mode: FileMode) -> Result<FileHandle, OsError>;

    /// Writes bytes to an open file, returning the count written
    fn file_write(&mut self, file: FileHandle, data: &[u8]) -> Result<usize, OsError>;

    /// Reads bytes from an open file, returning the count read
    ///
    /// A return of 0 means end of file.
    fn file_read(&mut self, file: FileHandle, buf: &mut [u8]) -> Result<usize, OsError>;

    /// Closes an open file
    fn file_close(&mut self, file: FileHandle) -> Result<(), OsError>;

    /// Loads an object module from a file path
    fn module_load(&mut self, name: &str, path: &str) -> Result<ModuleId, OsError>;

    /// Unloads a previously loaded module
    fn module_unload(&mut self, module: ModuleId) -> Result<(), OsError>;

    /// Resolves an entry-point symbol by name
    fn symbol_lookup(&mut self, symbol: &str) -> Result<SymbolAddr, OsError>;

    /// Returns a monotonic millisecond clock, used for log timestamps
    fn clock_ms(&self) -> u64;
}
