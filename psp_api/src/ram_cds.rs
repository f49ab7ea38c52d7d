//! In-memory platform implementation
//!
//! Backs the persistent region with a byte vector. The region contents
//! survive executive re-initialization within a process, which is what
//! the CDS recovery tests exercise.

use crate::{ExceptionInfo, PspApi, PspError, RestartRequest};
use exec_types::{ResetSubtype, ResetType};

/// In-memory persistent region and platform state
pub struct RamCds {
    region: Vec<u8>,
    reset_type: ResetType,
    reset_subtype: ResetSubtype,
    pending_exceptions: Vec<ExceptionInfo>,
    restart_requests: Vec<RestartRequest>,
    panics: Vec<(u32, String)>,
}

impl RamCds {
    /// Creates a region of `size` zeroed bytes, reporting a power-on reset
    pub fn new(size: usize) -> Self {
        Self {
            region: vec![0u8; size],
            reset_type: ResetType::PowerOn,
            reset_subtype: ResetSubtype::PowerCycle,
            pending_exceptions: Vec::new(),
            restart_requests: Vec::new(),
            panics: Vec::new(),
        }
    }

    /// Sets the reset classification reported to the executive
    pub fn set_reset_info(&mut self, reset_type: ResetType, subtype: ResetSubtype) {
        self.reset_type = reset_type;
        self.reset_subtype = subtype;
    }

    /// Latches an exception for the next drain
    pub fn inject_exception(&mut self, exception: ExceptionInfo) {
        self.pending_exceptions.push(exception);
    }

    /// Restart requests observed so far (test inspection)
    pub fn restart_requests(&self) -> &[RestartRequest] {
        &self.restart_requests
    }

    /// Panic calls observed so far (test inspection)
    pub fn panics(&self) -> &[(u32, String)] {
        &self.panics
    }

    /// Direct access to the raw region (test inspection/corruption)
    pub fn raw(&mut self) -> &mut [u8] {
        &mut self.region
    }
}

impl PspApi for RamCds {
    fn cds_size(&self) -> Result<usize, PspError> {
        Ok(self.region.len())
    }

    fn cds_read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), PspError> {
        let end = offset.checked_add(buf.len()).ok_or(PspError::OutOfRange)?;
        if end > self.region.len() {
            return Err(PspError::OutOfRange);
        }
        buf.copy_from_slice(&self.region[offset..end]);
        Ok(())
    }

    fn cds_write(&mut self, offset: usize, data: &[u8]) -> Result<(), PspError> {
        let end = offset.checked_add(data.len()).ok_or(PspError::OutOfRange)?;
        if end > self.region.len() {
            return Err(PspError::OutOfRange);
        }
        self.region[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn reset_info(&self) -> (ResetType, ResetSubtype) {
        (self.reset_type, self.reset_subtype)
    }

    fn restart(&mut self, request: RestartRequest) {
        self.restart_requests.push(request);
    }

    fn panic(&mut self, reason: u32, message: &str) {
        self.panics.push((reason, message.to_string()));
    }

    fn drain_exceptions(&mut self) -> Vec<ExceptionInfo> {
        std::mem::take(&mut self.pending_exceptions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_round_trip() {
        let mut cds = RamCds::new(64);
        cds.cds_write(8, b"payload").unwrap();

        let mut buf = [0u8; 7];
        cds.cds_read(8, &mut buf).unwrap();
        assert_eq!(&buf, b"payload");
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut cds = RamCds::new(16);
        assert_eq!(cds.cds_write(10, &[0u8; 8]), Err(PspError::OutOfRange));

        let mut buf = [0u8; 8];
        assert_eq!(cds.cds_read(12, &mut buf), Err(PspError::OutOfRange));
    }

    #[test]
    fn test_exception_drain_empties_queue() {
        let mut cds = RamCds::new(16);
        cds.inject_exception(ExceptionInfo {
            task: None,
            description: "bus fault".to_string(),
        });

        assert_eq!(cds.drain_exceptions().len(), 1);
        assert!(cds.drain_exceptions().is_empty());
    }
}
