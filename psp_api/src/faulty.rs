//! Fault-injecting platform wrapper
//!
//! Wraps another `PspApi` and fails persistent-region calls according
//! to a policy. Used to exercise media-error and recovery paths without
//! real power loss.

use crate::{ExceptionInfo, PspApi, PspError, RestartRequest};
use exec_types::{ResetSubtype, ResetType};

/// Policy for when a CDS access should fail
#[derive(Debug, Clone)]
pub enum FaultPolicy {
    /// Never fail (passthrough)
    Never,
    /// Fail every call
    Always,
    /// Fail after N successful calls
    AfterCalls(usize),
    /// Fail exactly the Nth call (1-based), pass all others
    OnCall(usize),
}

impl FaultPolicy {
    fn should_fail(&self, call_index: usize) -> bool {
        match self {
            FaultPolicy::Never => false,
            FaultPolicy::Always => true,
            FaultPolicy::AfterCalls(n) => call_index > *n,
            FaultPolicy::OnCall(n) => call_index == *n,
        }
    }
}

/// `PspApi` wrapper with independent read and write fault policies
pub struct FaultyCds<P: PspApi> {
    inner: P,
    read_policy: FaultPolicy,
    write_policy: FaultPolicy,
    read_calls: usize,
    write_calls: usize,
}

impl<P: PspApi> FaultyCds<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            read_policy: FaultPolicy::Never,
            write_policy: FaultPolicy::Never,
            read_calls: 0,
            write_calls: 0,
        }
    }

    /// Sets the read fault policy and resets the read call counter
    pub fn set_read_policy(&mut self, policy: FaultPolicy) {
        self.read_policy = policy;
        self.read_calls = 0;
    }

    /// Sets the write fault policy and resets the write call counter
    pub fn set_write_policy(&mut self, policy: FaultPolicy) {
        self.write_policy = policy;
        self.write_calls = 0;
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut P {
        &mut self.inner
    }

    pub fn into_inner(self) -> P {
        self.inner
    }
}

impl<P: PspApi> PspApi for FaultyCds<P> {
    fn cds_size(&self) -> Result<usize, PspError> {
        self.inner.cds_size()
    }

    fn cds_read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), PspError> {
        self.read_calls += 1;
        if self.read_policy.should_fail(self.read_calls) {
            return Err(PspError::AccessError("injected read fault".to_string()));
        }
        self.inner.cds_read(offset, buf)
    }

    fn cds_write(&mut self, offset: usize, data: &[u8]) -> Result<(), PspError> {
        self.write_calls += 1;
        if self.write_policy.should_fail(self.write_calls) {
            return Err(PspError::AccessError("injected write fault".to_string()));
        }
        self.inner.cds_write(offset, data)
    }

    fn reset_info(&self) -> (ResetType, ResetSubtype) {
        self.inner.reset_info()
    }

    fn restart(&mut self, request: RestartRequest) {
        self.inner.restart(request);
    }

    fn panic(&mut self, reason: u32, message: &str) {
        self.inner.panic(reason, message);
    }

    fn drain_exceptions(&mut self) -> Vec<ExceptionInfo> {
        self.inner.drain_exceptions()
    }
}
