//! # Application & Task Lifecycle
//!
//! The state machine at the heart of the executive: creating
//! applications and libraries from the startup script, gating their
//! main loops, processing control requests (restart, reload, stop),
//! scanning for exceptions, and synchronizing startup across the
//! system.
//!
//! All tables are fixed-capacity arenas indexed by integer handles and
//! owned by [`LifecycleManager`]; nothing here is global.

mod manager;
mod records;
mod script;

pub use manager::{LifecycleManager, RunStatus, StartupOutcome};
pub use records::{
    AppInfo, AppRecord, AppState, AppType, ControlRequest, LibInfo, LibRecord, StartParams,
    TaskInfo, TaskRecord,
};
pub use script::{parse_script, parse_script_line, ScriptEntryKind, StartupEntry};
