//! Bounded-step file dump state machine

use exec_types::config;
use osal_api::{FileHandle, FileMode, OsApi, OsError};

/// Which ring a dump job drains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpKind {
    Perf,
    ErLog,
}

impl DumpKind {
    pub fn label(self) -> &'static str {
        match self {
            DumpKind::Perf => "perf log",
            DumpKind::ErLog => "exception/reset log",
        }
    }
}

/// Dump job phases; each `step` call executes exactly one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpPhase {
    Init,
    WriteHeader,
    /// Cursor into the serialized body; one bounded chunk per step
    WriteEntries(usize),
    /// One idle slice before closing, yielding the task between the
    /// I/O burst and the close
    Delay,
    Close,
}

/// What a single step did
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StepResult {
    InProgress,
    Done,
    Failed(OsError),
}

pub(crate) struct DumpJob {
    pub kind: DumpKind,
    pub path: String,
    pub phase: DumpPhase,
    pub entry_count: usize,
    header: Vec<u8>,
    body: Vec<u8>,
    file: Option<FileHandle>,
}

impl DumpJob {
    /// Captures a snapshot of the source ring as serialized lines;
    /// the ring itself is never touched again after this point
    pub fn new(kind: DumpKind, path: &str, header: Vec<u8>, body: Vec<u8>, entry_count: usize) -> Self {
        Self {
            kind,
            path: path.to_string(),
            phase: DumpPhase::Init,
            entry_count,
            header,
            body,
            file: None,
        }
    }

    /// Advances the job one phase
    ///
    /// On failure the open file is best-effort closed and the caller
    /// drops the job.
    pub fn step<O: OsApi>(&mut self, os: &mut O) -> StepResult {
        let result = self.step_inner(os);
        if let StepResult::Failed(_) = result {
            if let Some(file) = self.file.take() {
                let _ = os.file_close(file);
            }
        }
        result
    }

    fn step_inner<O: OsApi>(&mut self, os: &mut O) -> StepResult {
        match self.phase {
            DumpPhase::Init => match os.file_open(&self.path, FileMode::Write) {
                Ok(file) => {
                    self.file = Some(file);
                    self.phase = DumpPhase::WriteHeader;
                    StepResult::InProgress
                }
                Err(err) => StepResult::Failed(err),
            },
            DumpPhase::WriteHeader => {
                let Some(file) = self.file else {
                    return StepResult::Failed(OsError::InvalidHandle);
                };
                match os.file_write(file, &self.header) {
                    Ok(_) => {
                        self.phase = DumpPhase::WriteEntries(0);
                        StepResult::InProgress
                    }
                    Err(err) => StepResult::Failed(err),
                }
            }
            DumpPhase::WriteEntries(cursor) => {
                let Some(file) = self.file else {
                    return StepResult::Failed(OsError::InvalidHandle);
                };
                let end = (cursor + config::BACKGROUND_MAX_DUMP_CHUNK).min(self.body.len());
                if cursor < end {
                    if let Err(err) = os.file_write(file, &self.body[cursor..end]) {
                        return StepResult::Failed(err);
                    }
                }
                if end == self.body.len() {
                    self.phase = DumpPhase::Delay;
                } else {
                    self.phase = DumpPhase::WriteEntries(end);
                }
                StepResult::InProgress
            }
            DumpPhase::Delay => {
                self.phase = DumpPhase::Close;
                StepResult::InProgress
            }
            DumpPhase::Close => {
                let Some(file) = self.file.take() else {
                    return StepResult::Failed(OsError::InvalidHandle);
                };
                match os.file_close(file) {
                    Ok(()) => StepResult::Done,
                    Err(err) => StepResult::Failed(err),
                }
            }
        }
    }
}
