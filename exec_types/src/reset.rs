//! Reset classification and overall system state

use serde::{Deserialize, Serialize};
use std::fmt;

/// Processor reset type, as reported by the platform at boot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetType {
    /// Full power cycle; volatile and reset-area state is gone
    PowerOn,
    /// Processor reset; the reset area and CDS survive
    Processor,
}

/// Reset subtype, qualifying how the reset was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetSubtype {
    /// Normal power cycle
    PowerCycle,
    /// Reset commanded through the executive
    Commanded,
    /// Hardware special command (external supervisor line)
    HardwareSpecial,
    /// Watchdog expiration
    Watchdog,
    /// Reset budget exceeded, escalated by the executive
    MaxResetsExceeded,
    /// Cause not identifiable from platform registers
    Other,
}

/// Overall system state, advanced by the startup sequence
///
/// The supervisor holds applications at a barrier until the state
/// reaches the level they are waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SystemState {
    /// Executive early initialization, nothing else runs yet
    EarlyInit,
    /// Core services are starting
    CoreStartup,
    /// Core services ready, external apps may initialize
    CoreReady,
    /// External applications initializing
    AppsInit,
    /// All startup synchronization complete
    Operational,
    /// Orderly shutdown in progress
    Shutdown,
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SystemState::EarlyInit => "EARLY_INIT",
            SystemState::CoreStartup => "CORE_STARTUP",
            SystemState::CoreReady => "CORE_READY",
            SystemState::AppsInit => "APPS_INIT",
            SystemState::Operational => "OPERATIONAL",
            SystemState::Shutdown => "SHUTDOWN",
        };
        write!(f, "{}", name)
    }
}

/// Action taken when an application causes a processor exception
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExceptionAction {
    /// Restart only the offending application (external apps only)
    RestartApp,
    /// Restart the whole processor
    ProcessorReset,
}

impl ExceptionAction {
    /// Parses the numeric startup-script field (0 = restart app, else
    /// processor reset)
    pub fn from_script_field(value: u32) -> Self {
        if value == 0 {
            ExceptionAction::RestartApp
        } else {
            ExceptionAction::ProcessorReset
        }
    }
}
