//! Ground command set and replies
//!
//! Commands arrive decoded from the message bus; the supervisor
//! dispatches them through one exhaustive match. Replies carry the
//! query results back toward telemetry.

use exec_types::ResetType;
use services_background::JobId;
use services_lifecycle::{AppInfo, StartupEntry, TaskInfo};
use services_mempool::PoolStats;
use services_syslog::{SysLogMode, TriggerMode};

/// Executive commands
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Noop,
    /// Zeroes the command/error counters (and is itself not counted)
    ResetCounters,
    /// Commanded processor or power-on restart
    Restart { reset_type: ResetType },
    StartApp { entry: StartupEntry },
    StopApp { name: String },
    RestartApp { name: String },
    ReloadApp { name: String, file: String },
    QueryOne { name: String },
    QueryAll,
    QueryAllTasks,
    ClearSysLog,
    SetSysLogMode { mode: SysLogMode },
    /// Dumps the system log to a file
    WriteSysLog { path: String },
    ClearErLog,
    /// Starts a background dump of the exception/reset log
    WriteErLog { path: String },
    PerfStart { mode: TriggerMode },
    /// Ends collection; with a path, also dumps the captured window
    PerfStop { path: Option<String> },
    PerfSetFilterMask { word: usize, value: u32 },
    PerfSetTriggerMask { word: usize, value: u32 },
    DeleteCds { name: String, table: bool, force: bool },
    DumpCdsRegistry { path: String },
    SendMemPoolStats { pool: usize },
}

/// Successful command replies
#[derive(Debug, Clone, PartialEq)]
pub enum CmdReply {
    Done,
    AppInfo(AppInfo),
    AppList(Vec<AppInfo>),
    TaskList(Vec<TaskInfo>),
    PoolStats(PoolStats),
    JobStarted(JobId),
}
