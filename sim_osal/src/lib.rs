//! # Simulated OS
//!
//! An in-process implementation of `osal_api::OsApi` for tests.
//!
//! ## Purpose
//!
//! The simulated OS lets executive services run under `cargo test`:
//! - Deterministic (explicit clock, no real concurrency)
//! - Fast (no real I/O or context switches)
//! - Inspectable (task table, written files, and call failures are all
//!   directly accessible)
//!
//! Failure injection mirrors how the services are exercised against a
//! flaky RTOS: individual operations can be forced to fail always, or
//! only on their next N calls.

use exec_types::{config, TaskId};
use osal_api::{FileHandle, FileMode, ModuleId, OsApi, OsError, SemHandle, SymbolAddr};
use std::collections::{HashMap, HashSet};

/// Operations that can be forced to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimOp {
    TaskCreate,
    TaskDelete,
    SemCreate,
    SemGive,
    SemTimedWait,
    FileOpen,
    FileWrite,
    FileRead,
    ModuleLoad,
    ModuleUnload,
    SymbolLookup,
}

#[derive(Debug, Clone, Copy)]
enum FailMode {
    Always,
    Times(usize),
}

#[derive(Debug, Clone)]
struct SimTask {
    name: String,
    priority: u8,
    stack_size: usize,
}

#[derive(Debug)]
struct SimFile {
    path: String,
    mode: FileMode,
    data: Vec<u8>,
    read_pos: usize,
}

/// Simulated OS state
pub struct SimOs {
    tasks: Vec<Option<SimTask>>,
    current_task: Option<TaskId>,
    sems: HashMap<u32, u32>,
    next_sem: u32,
    open_files: HashMap<u32, SimFile>,
    next_file: u32,
    written_files: HashMap<String, Vec<u8>>,
    seeded_files: HashMap<String, Vec<u8>>,
    modules: HashMap<u32, String>,
    next_module: u32,
    missing_symbols: HashSet<String>,
    failures: HashMap<SimOp, FailMode>,
    clock_ms: u64,
}

impl SimOs {
    pub fn new() -> Self {
        Self {
            tasks: vec![None; config::MAX_TASKS],
            current_task: None,
            sems: HashMap::new(),
            next_sem: 0,
            open_files: HashMap::new(),
            next_file: 0,
            written_files: HashMap::new(),
            seeded_files: HashMap::new(),
            modules: HashMap::new(),
            next_module: 0,
            missing_symbols: HashSet::new(),
            failures: HashMap::new(),
            clock_ms: 0,
        }
    }

    /// Forces an operation to fail on every call until cleared
    pub fn force_fail(&mut self, op: SimOp) {
        self.failures.insert(op, FailMode::Always);
    }

    /// Forces an operation to fail on its next `n` calls only
    pub fn fail_times(&mut self, op: SimOp, n: usize) {
        self.failures.insert(op, FailMode::Times(n));
    }

    /// Clears all forced failures
    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }

    fn take_failure(&mut self, op: SimOp) -> bool {
        match self.failures.get_mut(&op) {
            None => false,
            Some(FailMode::Always) => true,
            Some(FailMode::Times(n)) => {
                if *n == 0 {
                    self.failures.remove(&op);
                    false
                } else {
                    *n -= 1;
                    true
                }
            }
        }
    }

    /// Sets the identity returned by `task_self`
    pub fn set_current_task(&mut self, task: Option<TaskId>) {
        self.current_task = task;
    }

    /// Advances the simulated millisecond clock
    pub fn advance_clock(&mut self, ms: u64) {
        self.clock_ms += ms;
    }

    /// Pre-seeds a file that `file_open(Read)` will find
    pub fn seed_file(&mut self, path: &str, data: &[u8]) {
        self.seeded_files.insert(path.to_string(), data.to_vec());
    }

    /// Marks a symbol as unresolvable
    pub fn remove_symbol(&mut self, symbol: &str) {
        self.missing_symbols.insert(symbol.to_string());
    }

    /// Content written to `path` so far (open or closed)
    pub fn written_file(&self, path: &str) -> Option<&[u8]> {
        if let Some(data) = self.written_files.get(path) {
            return Some(data);
        }
        self.open_files
            .values()
            .find(|f| f.path == path)
            .map(|f| f.data.as_slice())
    }

    /// Number of live task slots
    pub fn task_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_some()).count()
    }

    /// Whether a task slot is live
    pub fn task_exists(&self, task: TaskId) -> bool {
        self.tasks
            .get(task.as_usize())
            .map(|t| t.is_some())
            .unwrap_or(false)
    }

    /// Names of currently loaded modules
    pub fn loaded_modules(&self) -> Vec<String> {
        self.modules.values().cloned().collect()
    }

    /// Recorded priority of a live task, for test inspection
    pub fn task_priority(&self, task: TaskId) -> Option<u8> {
        self.tasks
            .get(task.as_usize())
            .and_then(|t| t.as_ref())
            .map(|t| t.priority)
    }
}

impl Default for SimOs {
    fn default() -> Self {
        Self::new()
    }
}

impl OsApi for SimOs {
    fn task_create(
        &mut self,
        name: &str,
        priority: u8,
        stack_size: usize,
    ) -> Result<TaskId, OsError> {
        if self.take_failure(SimOp::TaskCreate) {
            return Err(OsError::TaskCreateFailed("injected".to_string()));
        }
        let slot = self
            .tasks
            .iter()
            .position(|t| t.is_none())
            .ok_or_else(|| OsError::ResourceExhausted("task table".to_string()))?;
        self.tasks[slot] = Some(SimTask {
            name: name.to_string(),
            priority,
            stack_size,
        });
        Ok(TaskId::from_index(slot as u32))
    }

    fn task_delete(&mut self, task: TaskId) -> Result<(), OsError> {
        if self.take_failure(SimOp::TaskDelete) {
            return Err(OsError::TaskDeleteFailed("injected".to_string()));
        }
        let slot = self
            .tasks
            .get_mut(task.as_usize())
            .ok_or(OsError::InvalidHandle)?;
        if slot.take().is_none() {
            return Err(OsError::InvalidHandle);
        }
        Ok(())
    }

    fn task_self(&self) -> Result<TaskId, OsError> {
        self.current_task.ok_or(OsError::InvalidHandle)
    }

    fn bin_sem_create(&mut self, _name: &str, initial: u32) -> Result<SemHandle, OsError> {
        if self.take_failure(SimOp::SemCreate) {
            return Err(OsError::SemError("injected".to_string()));
        }
        let id = self.next_sem;
        self.next_sem += 1;
        self.sems.insert(id, initial);
        Ok(SemHandle(id))
    }

    fn bin_sem_delete(&mut self, sem: SemHandle) -> Result<(), OsError> {
        self.sems.remove(&sem.0).ok_or(OsError::InvalidHandle)?;
        Ok(())
    }

    fn bin_sem_give(&mut self, sem: SemHandle) -> Result<(), OsError> {
        if self.take_failure(SimOp::SemGive) {
            return Err(OsError::SemError("injected".to_string()));
        }
        let value = self.sems.get_mut(&sem.0).ok_or(OsError::InvalidHandle)?;
        *value = 1;
        Ok(())
    }

    fn bin_sem_timed_wait(&mut self, sem: SemHandle, _timeout_ms: u32) -> Result<(), OsError> {
        if self.take_failure(SimOp::SemTimedWait) {
            return Err(OsError::Timeout);
        }
        let value = self.sems.get_mut(&sem.0).ok_or(OsError::InvalidHandle)?;
        if *value == 0 {
            // Simulated wait: timed waits on an empty semaphore time out
            // rather than block, keeping tests deterministic.
            return Err(OsError::Timeout);
        }
        *value = 0;
        Ok(())
    }

    fn file_open(&mut self, path: &str, mode: FileMode) -> Result<FileHandle, OsError> {
        if self.take_failure(SimOp::FileOpen) {
            return Err(OsError::FileOpenFailed(path.to_string()));
        }
        let data = match mode {
            FileMode::Read => self
                .seeded_files
                .get(path)
                .cloned()
                .ok_or_else(|| OsError::FileOpenFailed(path.to_string()))?,
            FileMode::Write => Vec::new(),
        };
        let id = self.next_file;
        self.next_file += 1;
        self.open_files.insert(
            id,
            SimFile {
                path: path.to_string(),
                mode,
                data,
                read_pos: 0,
            },
        );
        Ok(FileHandle(id))
    }

    fn file_write(&mut self, file: FileHandle, data: &[u8]) -> Result<usize, OsError> {
        if self.take_failure(SimOp::FileWrite) {
            return Err(OsError::FileWriteFailed);
        }
        let f = self.open_files.get_mut(&file.0).ok_or(OsError::InvalidHandle)?;
        if f.mode != FileMode::Write {
            return Err(OsError::FileWriteFailed);
        }
        f.data.extend_from_slice(data);
        Ok(data.len())
    }

    fn file_read(&mut self, file: FileHandle, buf: &mut [u8]) -> Result<usize, OsError> {
        if self.take_failure(SimOp::FileRead) {
            return Err(OsError::FileReadFailed);
        }
        let f = self.open_files.get_mut(&file.0).ok_or(OsError::InvalidHandle)?;
        if f.mode != FileMode::Read {
            return Err(OsError::FileReadFailed);
        }
        let remaining = f.data.len().saturating_sub(f.read_pos);
        let n = remaining.min(buf.len());
        buf[..n].copy_from_slice(&f.data[f.read_pos..f.read_pos + n]);
        f.read_pos += n;
        Ok(n)
    }

    fn file_close(&mut self, file: FileHandle) -> Result<(), OsError> {
        let f = self.open_files.remove(&file.0).ok_or(OsError::InvalidHandle)?;
        if f.mode == FileMode::Write {
            self.written_files.insert(f.path, f.data);
        }
        Ok(())
    }

    fn module_load(&mut self, name: &str, path: &str) -> Result<ModuleId, OsError> {
        if self.take_failure(SimOp::ModuleLoad) {
            return Err(OsError::ModuleLoadFailed(path.to_string()));
        }
        let id = self.next_module;
        self.next_module += 1;
        self.modules.insert(id, name.to_string());
        Ok(ModuleId(id))
    }

    fn module_unload(&mut self, module: ModuleId) -> Result<(), OsError> {
        if self.take_failure(SimOp::ModuleUnload) {
            return Err(OsError::ModuleUnloadFailed(format!("module {}", module.0)));
        }
        self.modules.remove(&module.0).ok_or(OsError::InvalidHandle)?;
        Ok(())
    }

    fn symbol_lookup(&mut self, symbol: &str) -> Result<SymbolAddr, OsError> {
        if self.take_failure(SimOp::SymbolLookup) || self.missing_symbols.contains(symbol) {
            return Err(OsError::SymbolNotFound(symbol.to_string()));
        }
        // Deterministic fake address derived from the symbol name
        let addr = symbol
            .bytes()
            .fold(0x1000u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        Ok(SymbolAddr(addr))
    }

    fn clock_ms(&self) -> u64 {
        self.clock_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_create_and_delete() {
        let mut os = SimOs::new();
        let task = os.task_create("CI_APP", 70, 4096).unwrap();
        assert!(os.task_exists(task));

        os.task_delete(task).unwrap();
        assert!(!os.task_exists(task));
    }

    #[test]
    fn test_task_slots_are_reused_after_cleanup() {
        let mut os = SimOs::new();
        let first = os.task_create("A", 50, 1024).unwrap();
        os.task_delete(first).unwrap();
        let second = os.task_create("B", 50, 1024).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_forced_task_create_failure() {
        let mut os = SimOs::new();
        os.fail_times(SimOp::TaskCreate, 1);
        assert!(os.task_create("X", 1, 64).is_err());
        assert!(os.task_create("X", 1, 64).is_ok());
    }

    #[test]
    fn test_file_write_capture() {
        let mut os = SimOs::new();
        let f = os.file_open("/ram/dump.dat", FileMode::Write).unwrap();
        os.file_write(f, b"hello ").unwrap();
        os.file_write(f, b"world").unwrap();
        os.file_close(f).unwrap();

        assert_eq!(os.written_file("/ram/dump.dat").unwrap(), b"hello world");
    }

    #[test]
    fn test_seeded_file_read_to_eof() {
        let mut os = SimOs::new();
        os.seed_file("/cf/startup.scr", b"abcdef");
        let f = os.file_open("/cf/startup.scr", FileMode::Read).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(os.file_read(f, &mut buf).unwrap(), 4);
        assert_eq!(os.file_read(f, &mut buf).unwrap(), 2);
        assert_eq!(os.file_read(f, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_missing_symbol_lookup() {
        let mut os = SimOs::new();
        os.remove_symbol("NoSuchEntry");
        assert!(os.symbol_lookup("NoSuchEntry").is_err());
        assert!(os.symbol_lookup("RealEntry").is_ok());
    }

    #[test]
    fn test_sem_timed_wait_behavior() {
        let mut os = SimOs::new();
        let sem = os.bin_sem_create("SYNC", 0).unwrap();
        assert_eq!(os.bin_sem_timed_wait(sem, 100), Err(OsError::Timeout));

        os.bin_sem_give(sem).unwrap();
        assert!(os.bin_sem_timed_wait(sem, 100).is_ok());
    }
}
