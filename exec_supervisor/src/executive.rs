//! The executive object

use crate::command::{CmdReply, Command};
use exec_types::{EsError, ResetSubtype, ResetType, SystemState, TaskId};
use osal_api::{FileMode, OsApi, SemHandle};
use psp_api::{PspApi, RestartRequest};
use services_background::{BackgroundScheduler, JobStatus};
use services_cds::{CdsAvailability, CdsHandle, CdsManager, RegisterOutcome};
use services_lifecycle::{AppType, LifecycleManager, RunStatus, ScriptEntryKind, StartupEntry};
use services_mempool::SharedMemPool;
use services_syslog::{ErLog, PerfLog, PerfState, SysLog, SysLogMode};

/// Reason codes passed to the platform panic primitive on fatal
/// startup failures
pub mod panic_reason {
    /// The startup synchronization semaphore could not be created
    pub const STARTUP_SEM: u32 = 0x01;
    /// A core application could not be created
    pub const CORE_APP: u32 = 0x02;
}

/// Boot-time configuration for the executive
#[derive(Debug, Clone)]
pub struct ExecConfig {
    pub startup_script: String,
    pub syslog_mode: SysLogMode,
    /// Core applications started before the script runs; failure to
    /// create one is fatal
    pub core_apps: Vec<StartupEntry>,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            startup_script: "/cf/startup.scr".to_string(),
            syslog_mode: SysLogMode::Overwrite,
            core_apps: Vec::new(),
        }
    }
}

/// Counter and state snapshot published with housekeeping telemetry
#[derive(Debug, Clone)]
pub struct Housekeeping {
    pub cmd_count: u32,
    pub err_count: u32,
    pub reset_type: ResetType,
    pub reset_subtype: ResetSubtype,
    pub processor_reset_count: u32,
    pub system_state: SystemState,
    pub degraded_startup: bool,
    pub app_count: usize,
    pub task_count: usize,
    pub syslog_write_index: usize,
    pub syslog_end_index: usize,
    pub syslog_entries: u64,
    pub perf_state: PerfState,
    pub perf_entries: usize,
    pub cds_available: bool,
    pub cds_entries: usize,
    pub perf_dump: Option<JobStatus>,
    pub er_dump: Option<JobStatus>,
}

/// The executive services supervisor
pub struct Executive<O: OsApi, P: PspApi> {
    os: O,
    psp: P,
    config: ExecConfig,
    lifecycle: LifecycleManager,
    cds: CdsManager,
    syslog: SysLog,
    er_log: ErLog,
    perf: PerfLog,
    background: BackgroundScheduler,
    pools: Vec<SharedMemPool>,
    startup_sem: Option<SemHandle>,
    reset_type: ResetType,
    reset_subtype: ResetSubtype,
    cmd_count: u32,
    err_count: u32,
}

impl<O: OsApi, P: PspApi> Executive<O, P> {
    pub fn new(os: O, psp: P, config: ExecConfig) -> Self {
        let syslog = SysLog::new(config.syslog_mode);
        Self {
            os,
            psp,
            config,
            lifecycle: LifecycleManager::new(),
            cds: CdsManager::new(),
            syslog,
            er_log: ErLog::new(),
            perf: PerfLog::new(),
            background: BackgroundScheduler::new(),
            pools: Vec::new(),
            startup_sem: None,
            reset_type: ResetType::PowerOn,
            reset_subtype: ResetSubtype::PowerCycle,
            cmd_count: 0,
            err_count: 0,
        }
    }

    /// Boots the executive: reset classification, CDS recovery, core
    /// apps, startup script, startup synchronization arming
    ///
    /// Fatal failures (startup semaphore, core app) escalate through
    /// the platform panic primitive before returning the error.
    pub fn init(&mut self) -> Result<(), EsError> {
        let (reset_type, reset_subtype) = self.psp.reset_info();
        self.reset_type = reset_type;
        self.reset_subtype = reset_subtype;
        self.lifecycle.set_system_state(SystemState::CoreStartup);
        self.perf.reinit(reset_type);

        let _ = self.syslog.append(
            self.os.clock_ms(),
            &format!("executive boot, reset type {reset_type:?} ({reset_subtype:?})"),
        );
        self.er_log.add(
            reset_type,
            reset_subtype,
            self.lifecycle.processor_reset_count(),
            "boot",
            self.os.clock_ms(),
        );

        match self.cds.early_init(&mut self.psp) {
            Ok(CdsAvailability::Available) => {
                let _ = self.syslog.append(
                    self.os.clock_ms(),
                    &format!("CDS ready, {} entries recovered", self.cds.entry_count()),
                );
            }
            Ok(CdsAvailability::NotAvailable) => {
                let _ = self
                    .syslog
                    .append(self.os.clock_ms(), "CDS region absent, continuing degraded");
            }
            Err(err) => {
                let _ = self.syslog.append(
                    self.os.clock_ms(),
                    &format!("CDS unrecoverable, continuing degraded: {err}"),
                );
            }
        }

        match self.os.bin_sem_create("EXEC_STARTUP", 0) {
            Ok(sem) => self.startup_sem = Some(sem),
            Err(err) => {
                self.psp
                    .panic(panic_reason::STARTUP_SEM, "cannot create startup semaphore");
                return Err(EsError::Os(err.to_string()));
            }
        }

        let core_apps = self.config.core_apps.clone();
        for entry in &core_apps {
            if let Err(err) =
                self.lifecycle
                    .create_app(&mut self.os, &mut self.syslog, entry, AppType::Core)
            {
                self.psp.panic(
                    panic_reason::CORE_APP,
                    &format!("cannot create core app {}", entry.name),
                );
                return Err(err);
            }
        }

        let script = self.config.startup_script.clone();
        let outcome =
            self.lifecycle
                .start_applications(&mut self.os, &mut self.syslog, &script);
        let _ = self.syslog.append(
            self.os.clock_ms(),
            &format!(
                "startup script: {} apps, {} libs, {} failed",
                outcome.created_apps, outcome.created_libs, outcome.failed_entries
            ),
        );

        self.lifecycle.set_system_state(SystemState::CoreReady);
        Ok(())
    }

    /// Orderly shutdown: releases the startup semaphore and marks the
    /// system state so `run_loop` callers terminate
    pub fn shutdown(&mut self) {
        self.lifecycle.set_system_state(SystemState::Shutdown);
        if let Some(sem) = self.startup_sem.take() {
            let _ = self.os.bin_sem_delete(sem);
        }
        let _ = self.syslog.append(self.os.clock_ms(), "executive shutdown");
    }

    /// One supervisor cycle: exception scan, table scan, startup
    /// synchronization, and a background work slice
    pub fn periodic_step(&mut self) {
        self.lifecycle.exception_scan(
            &mut self.os,
            &mut self.psp,
            &mut self.syslog,
            &mut self.er_log,
        );
        self.lifecycle.scan_app_table(&mut self.os, &mut self.syslog);
        if self.lifecycle.system_state() < SystemState::Operational {
            let state = self
                .lifecycle
                .startup_sync_step(&mut self.os, &mut self.syslog);
            if state == SystemState::Operational {
                // Release everything pended in wait_for_startup_sync
                if let Some(sem) = self.startup_sem {
                    let _ = self.os.bin_sem_give(sem);
                }
            }
        }
        self.background.run_step(&mut self.os, &mut self.syslog);
    }

    /// Dispatches one ground command
    ///
    /// Valid commands bump `cmd_count`; failures bump `err_count` and
    /// leave a syslog diagnostic.
    pub fn dispatch(&mut self, cmd: Command) -> Result<CmdReply, EsError> {
        if cmd == Command::ResetCounters {
            self.cmd_count = 0;
            self.err_count = 0;
            return Ok(CmdReply::Done);
        }
        match self.execute(cmd) {
            Ok(reply) => {
                self.cmd_count += 1;
                Ok(reply)
            }
            Err(err) => {
                self.err_count += 1;
                let _ = self
                    .syslog
                    .append(self.os.clock_ms(), &format!("command failed: {err}"));
                Err(err)
            }
        }
    }

    fn execute(&mut self, cmd: Command) -> Result<CmdReply, EsError> {
        match cmd {
            Command::Noop => Ok(CmdReply::Done),
            Command::ResetCounters => Ok(CmdReply::Done),
            Command::Restart { reset_type } => {
                self.psp.restart(RestartRequest {
                    reset_type,
                    subtype: ResetSubtype::Commanded,
                });
                Ok(CmdReply::Done)
            }
            Command::StartApp { entry } => {
                if entry.kind != ScriptEntryKind::App {
                    return Err(EsError::BadArgument(
                        "start-app entry must declare an application".to_string(),
                    ));
                }
                self.lifecycle
                    .create_app(&mut self.os, &mut self.syslog, &entry, AppType::External)?;
                Ok(CmdReply::Done)
            }
            Command::StopApp { name } => {
                let id = self.app_by_name(&name)?;
                self.lifecycle.request_stop_app(id)?;
                Ok(CmdReply::Done)
            }
            Command::RestartApp { name } => {
                let id = self.app_by_name(&name)?;
                self.lifecycle.request_restart_app(id)?;
                Ok(CmdReply::Done)
            }
            Command::ReloadApp { name, file } => {
                let id = self.app_by_name(&name)?;
                self.lifecycle.request_reload_app(id, &file)?;
                Ok(CmdReply::Done)
            }
            Command::QueryOne { name } => {
                let id = self.app_by_name(&name)?;
                Ok(CmdReply::AppInfo(self.lifecycle.app_info(id)?))
            }
            Command::QueryAll => Ok(CmdReply::AppList(self.lifecycle.all_apps())),
            Command::QueryAllTasks => Ok(CmdReply::TaskList(self.lifecycle.all_tasks())),
            Command::ClearSysLog => {
                self.syslog.clear();
                Ok(CmdReply::Done)
            }
            Command::SetSysLogMode { mode } => {
                self.syslog.set_mode(mode);
                Ok(CmdReply::Done)
            }
            Command::WriteSysLog { path } => {
                self.write_syslog_file(&path)?;
                Ok(CmdReply::Done)
            }
            Command::ClearErLog => {
                self.er_log.clear();
                Ok(CmdReply::Done)
            }
            Command::WriteErLog { path } => {
                let snapshot = self.er_log.snapshot();
                let id = self.background.start_er_dump(&path, &snapshot)?;
                Ok(CmdReply::JobStarted(id))
            }
            Command::PerfStart { mode } => {
                self.perf.start(mode);
                Ok(CmdReply::Done)
            }
            Command::PerfStop { path } => {
                self.perf.stop();
                match path {
                    Some(path) => {
                        let snapshot = self.perf.snapshot();
                        let id = self.background.start_perf_dump(&path, &snapshot)?;
                        Ok(CmdReply::JobStarted(id))
                    }
                    None => Ok(CmdReply::Done),
                }
            }
            Command::PerfSetFilterMask { word, value } => {
                self.perf.set_filter_mask(word, value)?;
                Ok(CmdReply::Done)
            }
            Command::PerfSetTriggerMask { word, value } => {
                self.perf.set_trigger_mask(word, value)?;
                Ok(CmdReply::Done)
            }
            Command::DeleteCds { name, table, force } => {
                let owner = name.split('.').next().unwrap_or("");
                let owner_active = !force && self.lifecycle.is_app_active(owner);
                self.cds.delete(&mut self.psp, &name, table, owner_active)?;
                Ok(CmdReply::Done)
            }
            Command::DumpCdsRegistry { path } => {
                self.write_cds_registry_file(&path)?;
                Ok(CmdReply::Done)
            }
            Command::SendMemPoolStats { pool } => {
                let pool = self.pools.get(pool).ok_or(EsError::ErrMemHandle)?;
                Ok(CmdReply::PoolStats(pool.stats()))
            }
        }
    }

    fn app_by_name(&self, name: &str) -> Result<exec_types::AppId, EsError> {
        self.lifecycle
            .app_id_by_name(name)
            .ok_or_else(|| EsError::AppNotFound(name.to_string()))
    }

    /// Synchronous syslog dump through the bounded read API
    fn write_syslog_file(&mut self, path: &str) -> Result<(), EsError> {
        let file = self
            .os
            .file_open(path, FileMode::Write)
            .map_err(|e| EsError::Os(e.to_string()))?;
        let mut reader = self.syslog.read_start();
        let mut chunk = [0u8; 256];
        loop {
            let n = self.syslog.read_data(&mut reader, &mut chunk);
            if n == 0 {
                break;
            }
            if let Err(err) = self.os.file_write(file, &chunk[..n]) {
                let _ = self.os.file_close(file);
                return Err(EsError::Os(err.to_string()));
            }
        }
        self.os
            .file_close(file)
            .map_err(|e| EsError::Os(e.to_string()))
    }

    fn write_cds_registry_file(&mut self, path: &str) -> Result<(), EsError> {
        let entries = self.cds.registry_snapshot();
        let file = self
            .os
            .file_open(path, FileMode::Write)
            .map_err(|e| EsError::Os(e.to_string()))?;
        for entry in &entries {
            let mut line = serde_json::to_string(entry)
                .map_err(|e| EsError::Os(e.to_string()))?;
            line.push('\n');
            if let Err(err) = self.os.file_write(file, line.as_bytes()) {
                let _ = self.os.file_close(file);
                return Err(EsError::Os(err.to_string()));
            }
        }
        self.os
            .file_close(file)
            .map_err(|e| EsError::Os(e.to_string()))
    }

    /// Bounded wait for startup synchronization to complete
    ///
    /// Returns immediately once the system is operational; otherwise
    /// pends on the startup semaphore, which the periodic step gives
    /// when synchronization finishes. The semaphore is re-given after a
    /// successful wait so every pending caller passes.
    pub fn wait_for_startup_sync(&mut self, timeout_ms: u32) -> Result<(), EsError> {
        if self.lifecycle.system_state() >= SystemState::Operational {
            return Ok(());
        }
        let sem = self
            .startup_sem
            .ok_or_else(|| EsError::Os("startup semaphore missing".to_string()))?;
        self.os
            .bin_sem_timed_wait(sem, timeout_ms)
            .map_err(|e| EsError::Os(e.to_string()))?;
        let _ = self.os.bin_sem_give(sem);
        Ok(())
    }

    /// Per-iteration gate for application main loops
    pub fn run_loop(&mut self, status: RunStatus) -> bool {
        if self.lifecycle.system_state() == SystemState::Shutdown {
            return false;
        }
        self.lifecycle.run_loop(&mut self.os, status)
    }

    /// Records a performance marker
    pub fn perf_entry(&mut self, marker: u32, data: u32) {
        let now = self.os.clock_ms();
        self.perf.add(marker, data, now);
    }

    /// Registers a named CDS block for the calling application
    pub fn register_cds(
        &mut self,
        name: &str,
        size: usize,
        table: bool,
    ) -> Result<(RegisterOutcome, CdsHandle), EsError> {
        self.cds.register(&mut self.psp, name, size, table)
    }

    /// Writes a registered CDS block
    pub fn copy_to_cds(&mut self, handle: CdsHandle, data: &[u8]) -> Result<(), EsError> {
        self.cds.copy_to_cds(&mut self.psp, handle, data)
    }

    /// Reads back a registered CDS block, verifying its CRC
    pub fn restore_from_cds(&mut self, handle: CdsHandle, buf: &mut [u8]) -> Result<(), EsError> {
        self.cds.restore_from_cds(&mut self.psp, handle, buf)
    }

    /// Creates a child task for the calling application
    pub fn create_child_task(
        &mut self,
        name: &str,
        priority: u8,
        stack_size: usize,
    ) -> Result<TaskId, EsError> {
        self.lifecycle
            .create_child_task(&mut self.os, name, priority, stack_size)
    }

    /// Deletes a child task
    pub fn delete_child_task(&mut self, task: TaskId) -> Result<(), EsError> {
        self.lifecycle.delete_child_task(&mut self.os, task)
    }

    /// Creates a mutex-protected memory pool, returning its index for
    /// the pool-stats command
    pub fn create_pool(&mut self, size: usize) -> Result<usize, EsError> {
        let pool = SharedMemPool::create(size)?;
        self.pools.push(pool);
        Ok(self.pools.len() - 1)
    }

    pub fn pool(&self, index: usize) -> Option<&SharedMemPool> {
        self.pools.get(index)
    }

    pub fn housekeeping(&self) -> Housekeeping {
        Housekeeping {
            cmd_count: self.cmd_count,
            err_count: self.err_count,
            reset_type: self.reset_type,
            reset_subtype: self.reset_subtype,
            processor_reset_count: self.lifecycle.processor_reset_count(),
            system_state: self.lifecycle.system_state(),
            degraded_startup: self.lifecycle.degraded_startup(),
            app_count: self.lifecycle.app_count(),
            task_count: self.lifecycle.task_count(),
            syslog_write_index: self.syslog.write_index(),
            syslog_end_index: self.syslog.end_index(),
            syslog_entries: self.syslog.entry_count(),
            perf_state: self.perf.state(),
            perf_entries: self.perf.entry_count(),
            cds_available: self.cds.availability() == CdsAvailability::Available,
            cds_entries: self.cds.entry_count(),
            perf_dump: self.background.perf_status(),
            er_dump: self.background.er_status(),
        }
    }

    pub fn os(&mut self) -> &mut O {
        &mut self.os
    }

    pub fn psp(&mut self) -> &mut P {
        &mut self.psp
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn system_state(&self) -> SystemState {
        self.lifecycle.system_state()
    }

    /// Tears the executive down, handing back the OS and platform
    /// layers; used to simulate a restart against the same hardware
    pub fn into_parts(self) -> (O, P) {
        (self.os, self.psp)
    }
}
