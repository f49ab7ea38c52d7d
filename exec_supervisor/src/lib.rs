//! # Executive Supervisor
//!
//! The owning manager object binding every executive service: the
//! lifecycle tables, the critical data store, the logs, the memory
//! pools, and the background scheduler. Constructed once at process
//! start over the OS and platform abstractions, with an explicit
//! `init`/`shutdown` lifecycle.

mod command;
mod executive;

pub use command::{CmdReply, Command};
pub use executive::{ExecConfig, Executive, Housekeeping};
