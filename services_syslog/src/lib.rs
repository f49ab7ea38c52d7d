//! # System, Exception & Performance Logging
//!
//! Three fixed-capacity logs shared by the executive:
//! - [`SysLog`]: a flat byte ring of timestamp-prefixed text messages,
//!   the primary diagnostic channel of the system.
//! - [`ErLog`]: the Exception & Reset log, a small ring of structured
//!   reset/exception records.
//! - [`PerfLog`]: a performance marker ring with triggered capture
//!   windows, filled from instrumented code paths.
//!
//! All three are plain owned structures; the supervisor decides where
//! they live and when they are cleared.

mod er_log;
mod perf;
mod system_log;

pub use er_log::{ErLog, ErLogEntry};
pub use perf::{PerfEntry, PerfLog, PerfState, TriggerMode};
pub use system_log::{SysLog, SysLogMode, SysLogReader, SysLogStatus};
