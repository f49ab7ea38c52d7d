//! Platform configuration limits
//!
//! These are compile-time platform limits in the original deployment
//! sense: fixed table capacities and buffer sizes that bound worst-case
//! memory use and scan time.

/// Maximum number of application slots
pub const MAX_APPLICATIONS: usize = 32;

/// Maximum number of shared library slots
pub const MAX_LIBRARIES: usize = 10;

/// Maximum number of OS task slots (main tasks plus child tasks)
pub const MAX_TASKS: usize = 64;

/// Maximum length of an application, library, or task name
pub const MAX_API_NAME_LEN: usize = 20;

/// Maximum length of a file path in start parameters
pub const MAX_PATH_LEN: usize = 64;

/// Maximum number of CDS registry entries
pub const CDS_MAX_ENTRIES: usize = 512;

/// Maximum length of a full dotted `Owner.Name` CDS name
pub const CDS_MAX_FULL_NAME_LEN: usize = 38;

/// Smallest persistent region the CDS will manage; below this the CDS
/// reports itself unavailable and the system continues degraded
pub const CDS_MIN_REGION_SIZE: usize = 8 * 1024;

/// Largest single CDS block that can be allocated
pub const CDS_MAX_BLOCK_SIZE: usize = 81920;

/// System log capacity in bytes
pub const SYSTEM_LOG_SIZE: usize = 3072;

/// Longest single system log message, including the timestamp prefix
pub const MAX_SYSLOG_MSG_SIZE: usize = 128;

/// Exception & Reset log capacity in entries
pub const ER_LOG_ENTRIES: usize = 20;

/// Performance marker ring buffer capacity in entries
pub const PERF_BUFFER_ENTRIES: usize = 10_000;

/// Number of distinct performance marker ids (4 x u32 mask words)
pub const PERF_MAX_IDS: usize = 128;

/// Processor resets tolerated before escalating to a power-on reset
pub const MAX_PROCESSOR_RESETS: u32 = 2;

/// Longest accepted startup script line, in bytes
pub const STARTUP_SCRIPT_MAX_LINE: usize = 128;

/// Scan cycles a control request may stay pending before escalation
pub const APP_KILL_TIMEOUT: u32 = 5;

/// Startup synchronization timeout, in table-scan cycles
pub const STARTUP_SYNC_TIMEOUT_CYCLES: u32 = 15;

/// Maximum cardinality of a pool block-size table
pub const MAX_BLOCK_SIZES: usize = 17;

/// Default block-size classes for the generic memory pool (descending)
pub const MEM_POOL_DEFAULT_SIZES: [usize; 12] = [
    16384, 8192, 4096, 2048, 1024, 512, 256, 128, 64, 32, 16, 8,
];

/// Default block-size classes for the CDS block pool (descending)
pub const CDS_POOL_DEFAULT_SIZES: [usize; 13] = [
    CDS_MAX_BLOCK_SIZE,
    16384,
    8192,
    4096,
    2048,
    1024,
    512,
    256,
    128,
    64,
    32,
    16,
    8,
];

/// Bytes of ring-buffer content a background dump job writes per step
pub const BACKGROUND_MAX_DUMP_CHUNK: usize = 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_size_tables_are_descending() {
        for w in MEM_POOL_DEFAULT_SIZES.windows(2) {
            assert!(w[0] > w[1]);
        }
        for w in CDS_POOL_DEFAULT_SIZES.windows(2) {
            assert!(w[0] > w[1]);
        }
    }

    #[test]
    fn test_size_tables_fit_max_cardinality() {
        assert!(MEM_POOL_DEFAULT_SIZES.len() <= MAX_BLOCK_SIZES);
        assert!(CDS_POOL_DEFAULT_SIZES.len() <= MAX_BLOCK_SIZES);
    }
}
