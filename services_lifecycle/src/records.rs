//! Application, library, and task records

use exec_types::{AppId, ExceptionAction, LibId, TaskId};
use osal_api::ModuleId;
use serde::{Deserialize, Serialize};

/// Core applications ship with the executive; external ones come from
/// the startup script or ground command and may be restarted
/// individually
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppType {
    Core,
    External,
}

/// Per-application lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppState {
    /// Created but not yet through its first `run_loop` call; an empty
    /// table slot is `None`, not a state
    EarlyInit,
    Running,
    /// A control request is pending; the kill timer is counting down
    Waiting,
    Stopped,
}

/// Pending action on an application, processed by the table scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    /// Nothing requested; processing this is a diagnostic-worthy bug
    None,
    Run,
    /// The app's own main loop asked to exit cleanly
    Exit,
    /// The app's own main loop reported an error exit
    Error,
    SysRestart,
    /// Reload from a (possibly different) file
    SysReload(String),
    SysDelete,
    /// Invalid terminal state; processing it logs an error and tears
    /// the app down
    SysException,
}

/// Start parameters, as declared in the startup script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartParams {
    pub file: String,
    pub entry_point: String,
    pub priority: u8,
    pub stack_size: usize,
    pub exception_action: ExceptionAction,
}

/// One application table slot
#[derive(Debug, Clone)]
pub struct AppRecord {
    pub name: String,
    pub app_type: AppType,
    pub state: AppState,
    pub params: StartParams,
    pub main_task: TaskId,
    pub module: Option<ModuleId>,
    pub control: ControlRequest,
    /// Scan cycles left before a pending request escalates to delete
    pub timer: u32,
}

/// One library table slot
#[derive(Debug, Clone)]
pub struct LibRecord {
    pub name: String,
    pub module: ModuleId,
}

/// Maps an OS task back to its owning application
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub name: String,
    pub task: TaskId,
    pub app: AppId,
    pub is_main: bool,
}

/// Query view of one application, consumed by telemetry and the
/// background dump jobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppInfo {
    pub id: AppId,
    pub name: String,
    pub app_type: AppType,
    pub state: AppState,
    pub file: String,
    pub priority: u8,
    pub stack_size: usize,
    pub main_task: TaskId,
    pub child_tasks: usize,
}

/// Query view of one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskInfo {
    pub task: TaskId,
    pub name: String,
    pub app: AppId,
    pub is_main: bool,
}

/// Query view of one loaded library
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibInfo {
    pub id: LibId,
    pub name: String,
}
