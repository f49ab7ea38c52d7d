//! Scheduler owning the dump job slots

use crate::dump::{DumpJob, DumpKind, DumpPhase, StepResult};
use exec_types::EsError;
use osal_api::OsApi;
use serde_json::json;
use services_syslog::{ErLogEntry, PerfEntry, SysLog};
use std::fmt;
use uuid::Uuid;

/// Identity of a started background job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Progress of a job slot, for housekeeping telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStatus {
    pub id: JobId,
    pub phase: DumpPhase,
    pub entry_count: usize,
}

struct Slot {
    id: JobId,
    job: DumpJob,
}

/// One slot per dump kind; starting a dump while that slot is busy is
/// rejected rather than queued
pub struct BackgroundScheduler {
    perf: Option<Slot>,
    er: Option<Slot>,
    completed_jobs: u32,
    failed_jobs: u32,
}

impl BackgroundScheduler {
    pub fn new() -> Self {
        Self {
            perf: None,
            er: None,
            completed_jobs: 0,
            failed_jobs: 0,
        }
    }

    /// Starts a performance log dump from a snapshot of the ring
    pub fn start_perf_dump(
        &mut self,
        path: &str,
        entries: &[PerfEntry],
    ) -> Result<JobId, EsError> {
        if self.perf.is_some() {
            return Err(EsError::Pending);
        }
        let header = header_line(DumpKind::Perf, entries.len());
        let body = body_lines(entries);
        let id = JobId::new();
        self.perf = Some(Slot {
            id,
            job: DumpJob::new(DumpKind::Perf, path, header, body, entries.len()),
        });
        Ok(id)
    }

    /// Starts an exception/reset log dump from a snapshot of the ring
    pub fn start_er_dump(
        &mut self,
        path: &str,
        entries: &[ErLogEntry],
    ) -> Result<JobId, EsError> {
        if self.er.is_some() {
            return Err(EsError::Pending);
        }
        let header = header_line(DumpKind::ErLog, entries.len());
        let body = body_lines(entries);
        let id = JobId::new();
        self.er = Some(Slot {
            id,
            job: DumpJob::new(DumpKind::ErLog, path, header, body, entries.len()),
        });
        Ok(id)
    }

    /// Advances every active job by at most one bounded step
    pub fn run_step<O: OsApi>(&mut self, os: &mut O, syslog: &mut SysLog) {
        for slot_ref in [&mut self.perf, &mut self.er] {
            let Some(slot) = slot_ref else { continue };
            match slot.job.step(os) {
                StepResult::InProgress => {}
                StepResult::Done => {
                    self.completed_jobs += 1;
                    let _ = syslog.append(
                        os.clock_ms(),
                        &format!(
                            "background: {} dump to {} complete ({} entries)",
                            slot.job.kind.label(),
                            slot.job.path,
                            slot.job.entry_count
                        ),
                    );
                    *slot_ref = None;
                }
                StepResult::Failed(err) => {
                    self.failed_jobs += 1;
                    let _ = syslog.append(
                        os.clock_ms(),
                        &format!(
                            "background: {} dump to {} aborted: {}",
                            slot.job.kind.label(),
                            slot.job.path,
                            err
                        ),
                    );
                    *slot_ref = None;
                }
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        self.perf.is_none() && self.er.is_none()
    }

    pub fn perf_status(&self) -> Option<JobStatus> {
        self.perf.as_ref().map(status)
    }

    pub fn er_status(&self) -> Option<JobStatus> {
        self.er.as_ref().map(status)
    }

    pub fn completed_jobs(&self) -> u32 {
        self.completed_jobs
    }

    pub fn failed_jobs(&self) -> u32 {
        self.failed_jobs
    }
}

impl Default for BackgroundScheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn status(slot: &Slot) -> JobStatus {
    JobStatus {
        id: slot.id,
        phase: slot.job.phase,
        entry_count: slot.job.entry_count,
    }
}

fn header_line(kind: DumpKind, count: usize) -> Vec<u8> {
    let mut line = json!({ "dump": kind.label(), "entries": count }).to_string();
    line.push('\n');
    line.into_bytes()
}

fn body_lines<T: serde::Serialize>(entries: &[T]) -> Vec<u8> {
    let mut out = Vec::new();
    for entry in entries {
        if let Ok(line) = serde_json::to_string(entry) {
            out.extend_from_slice(line.as_bytes());
            out.push(b'\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use exec_types::{ResetSubtype, ResetType};
    use services_syslog::SysLogMode;
    use sim_osal::{SimOp, SimOs};

    fn perf_entries(n: usize) -> Vec<PerfEntry> {
        (0..n)
            .map(|i| PerfEntry {
                marker: i as u32,
                timestamp_ms: i as u64,
                data: 0,
            })
            .collect()
    }

    fn drive(sched: &mut BackgroundScheduler, os: &mut SimOs, syslog: &mut SysLog) -> usize {
        let mut steps = 0;
        while !sched.is_idle() {
            sched.run_step(os, syslog);
            steps += 1;
            assert!(steps < 1000, "scheduler did not converge");
        }
        steps
    }

    #[test]
    fn test_perf_dump_completes_in_bounded_steps() {
        let mut os = SimOs::new();
        let mut syslog = SysLog::new(SysLogMode::Overwrite);
        let mut sched = BackgroundScheduler::new();

        sched.start_perf_dump("/ram/perf.dat", &perf_entries(50)).unwrap();
        drive(&mut sched, &mut os, &mut syslog);

        let written = os.written_file("/ram/perf.dat").unwrap();
        let text = std::str::from_utf8(written).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().contains("\"entries\":50"));
        assert_eq!(lines.count(), 50);
        assert_eq!(sched.completed_jobs(), 1);
    }

    #[test]
    fn test_large_dump_is_chunked() {
        let mut os = SimOs::new();
        let mut syslog = SysLog::new(SysLogMode::Overwrite);
        let mut sched = BackgroundScheduler::new();

        // Big enough that the body cannot fit one chunk
        sched
            .start_perf_dump("/ram/perf.dat", &perf_entries(500))
            .unwrap();
        let steps = drive(&mut sched, &mut os, &mut syslog);
        // Init, header, >1 entry chunks, delay, close
        assert!(steps > 5);
    }

    #[test]
    fn test_second_dump_while_pending_rejected() {
        let mut sched = BackgroundScheduler::new();
        sched.start_perf_dump("/ram/a.dat", &perf_entries(1)).unwrap();
        assert_eq!(
            sched.start_perf_dump("/ram/b.dat", &perf_entries(1)),
            Err(EsError::Pending)
        );
        // The other slot is independent
        assert!(sched.start_er_dump("/ram/er.dat", &[]).is_ok());
    }

    #[test]
    fn test_write_failure_aborts_to_idle_with_diagnostic() {
        let mut os = SimOs::new();
        let mut syslog = SysLog::new(SysLogMode::Overwrite);
        let mut sched = BackgroundScheduler::new();

        sched.start_perf_dump("/ram/perf.dat", &perf_entries(10)).unwrap();
        os.force_fail(SimOp::FileWrite);
        sched.run_step(&mut os, &mut syslog); // open
        sched.run_step(&mut os, &mut syslog); // header write fails

        assert!(sched.is_idle());
        assert_eq!(sched.failed_jobs(), 1);

        let mut reader = syslog.read_start();
        let mut out = vec![0u8; 512];
        let n = syslog.read_data(&mut reader, &mut out);
        let text = std::str::from_utf8(&out[..n]).unwrap();
        assert!(text.contains("aborted"));
    }

    #[test]
    fn test_er_dump_writes_snapshot() {
        let mut os = SimOs::new();
        let mut syslog = SysLog::new(SysLogMode::Overwrite);
        let mut sched = BackgroundScheduler::new();

        let entries = vec![ErLogEntry {
            log_counter: 1,
            reset_type: ResetType::Processor,
            reset_subtype: ResetSubtype::Watchdog,
            processor_reset_count: 1,
            description: "watchdog".to_string(),
            timestamp_ms: 42,
        }];
        sched.start_er_dump("/ram/er.dat", &entries).unwrap();
        drive(&mut sched, &mut os, &mut syslog);

        let text =
            String::from_utf8(os.written_file("/ram/er.dat").unwrap().to_vec()).unwrap();
        assert!(text.contains("watchdog"));
    }
}
