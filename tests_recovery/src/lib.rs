//! Recovery Test Utilities
//!
//! Shared bootstrap helpers for the cross-crate recovery tests: the
//! full executive over the simulated OS and a RAM-backed persistent
//! region, so a test can crash, reboot, and assert on what survived.

use exec_supervisor::{ExecConfig, Executive};
use psp_api::RamCds;
use sim_osal::SimOs;

/// Default region size for recovery tests
pub const CDS_REGION: usize = 512 * 1024;

/// Startup script declaring one external app named `A`
pub const ONE_APP_SCRIPT: &[u8] = b"APP, /cf/apps/a.so, A_Main, A, 50, 8192, 0, 0;\n!\n";

/// Boots a fresh executive over a pristine region
pub fn boot() -> Executive<SimOs, RamCds> {
    boot_with(RamCds::new(CDS_REGION))
}

/// Boots an executive over an existing region, as after a reset
pub fn boot_with(psp: RamCds) -> Executive<SimOs, RamCds> {
    let mut os = SimOs::new();
    os.seed_file("/cf/startup.scr", ONE_APP_SCRIPT);
    let mut exec = Executive::new(os, psp, ExecConfig::default());
    exec.init().expect("executive init");
    exec
}
