//! The lifecycle manager

use crate::records::{
    AppInfo, AppRecord, AppState, AppType, ControlRequest, LibInfo, LibRecord, StartParams,
    TaskInfo, TaskRecord,
};
use crate::script::{parse_script, ScriptEntryKind, StartupEntry};
use exec_types::{config, AppId, EsError, ExceptionAction, LibId, ResetSubtype, ResetType, SystemState, TaskId};
use osal_api::{FileMode, OsApi};
use psp_api::{PspApi, RestartRequest};
use services_syslog::{ErLog, SysLog};

/// Status an application's main loop reports into `run_loop`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Run,
    Exit,
    Error,
}

/// Tally of one startup script run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StartupOutcome {
    pub created_apps: usize,
    pub created_libs: usize,
    pub failed_entries: usize,
}

/// Owns the application, library, and task tables
pub struct LifecycleManager {
    apps: Vec<Option<AppRecord>>,
    libs: Vec<Option<LibRecord>>,
    tasks: Vec<Option<TaskRecord>>,
    system_state: SystemState,
    processor_reset_count: u32,
    sync_cycles: u32,
    degraded_startup: bool,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self {
            apps: (0..config::MAX_APPLICATIONS).map(|_| None).collect(),
            libs: (0..config::MAX_LIBRARIES).map(|_| None).collect(),
            tasks: (0..config::MAX_TASKS).map(|_| None).collect(),
            system_state: SystemState::EarlyInit,
            processor_reset_count: 0,
            sync_cycles: 0,
            degraded_startup: false,
        }
    }

    pub fn system_state(&self) -> SystemState {
        self.system_state
    }

    pub fn set_system_state(&mut self, state: SystemState) {
        self.system_state = state;
    }

    pub fn processor_reset_count(&self) -> u32 {
        self.processor_reset_count
    }

    pub fn set_processor_reset_count(&mut self, count: u32) {
        self.processor_reset_count = count;
    }

    pub fn degraded_startup(&self) -> bool {
        self.degraded_startup
    }

    /// Runs the startup script at `path`
    ///
    /// An unreadable script logs a diagnostic and returns an empty
    /// outcome; a malformed line fails that entry only.
    pub fn start_applications<O: OsApi>(
        &mut self,
        os: &mut O,
        syslog: &mut SysLog,
        path: &str,
    ) -> StartupOutcome {
        let mut outcome = StartupOutcome::default();
        let text = match self.read_script(os, path) {
            Ok(text) => text,
            Err(err) => {
                let _ = syslog.append(
                    os.clock_ms(),
                    &format!("startup: cannot read script {path}: {err}"),
                );
                return outcome;
            }
        };

        for parsed in parse_script(&text) {
            let entry = match parsed {
                Ok(entry) => entry,
                Err(err) => {
                    outcome.failed_entries += 1;
                    let _ = syslog.append(os.clock_ms(), &format!("startup: {err}"));
                    continue;
                }
            };
            let result = match entry.kind {
                ScriptEntryKind::App => self
                    .create_app(os, syslog, &entry, AppType::External)
                    .map(|_| ()),
                ScriptEntryKind::Lib => self.load_library(os, syslog, &entry).map(|_| ()),
            };
            match result {
                Ok(()) => match entry.kind {
                    ScriptEntryKind::App => outcome.created_apps += 1,
                    ScriptEntryKind::Lib => outcome.created_libs += 1,
                },
                Err(err) => {
                    outcome.failed_entries += 1;
                    let _ = syslog.append(
                        os.clock_ms(),
                        &format!("startup: entry {} failed: {err}", entry.name),
                    );
                }
            }
        }
        outcome
    }

    fn read_script<O: OsApi>(&self, os: &mut O, path: &str) -> Result<String, EsError> {
        let file = os
            .file_open(path, FileMode::Read)
            .map_err(|e| EsError::Os(e.to_string()))?;
        let mut data = Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            match os.file_read(file, &mut chunk) {
                Ok(0) => break,
                Ok(n) => data.extend_from_slice(&chunk[..n]),
                Err(err) => {
                    let _ = os.file_close(file);
                    return Err(EsError::Os(err.to_string()));
                }
            }
        }
        let _ = os.file_close(file);
        String::from_utf8(data).map_err(|_| EsError::Os("script is not UTF-8".to_string()))
    }

    /// Creates an application from a parsed script entry
    pub fn create_app<O: OsApi>(
        &mut self,
        os: &mut O,
        syslog: &mut SysLog,
        entry: &StartupEntry,
        app_type: AppType,
    ) -> Result<AppId, EsError> {
        let params = StartParams {
            file: entry.file.clone(),
            entry_point: entry.entry_point.clone(),
            priority: entry.priority,
            stack_size: entry.stack_size,
            exception_action: entry.exception_action,
        };
        self.create_app_internal(os, syslog, &entry.name, params, app_type)
    }

    /// Slot allocation, module load, symbol lookup, and main task
    /// creation — unwinding everything done so far on any failure
    fn create_app_internal<O: OsApi>(
        &mut self,
        os: &mut O,
        syslog: &mut SysLog,
        name: &str,
        params: StartParams,
        app_type: AppType,
    ) -> Result<AppId, EsError> {
        if name.is_empty() || name.len() > config::MAX_API_NAME_LEN {
            return Err(EsError::AppCreate(format!("bad app name '{name}'")));
        }
        if self.app_id_by_name(name).is_some() {
            return Err(EsError::AppCreate(format!("app '{name}' already exists")));
        }
        let slot = self
            .apps
            .iter()
            .position(|s| s.is_none())
            .ok_or_else(|| EsError::AppCreate("no free application slots".to_string()))?;

        let module = os
            .module_load(name, &params.file)
            .map_err(|e| EsError::AppCreate(format!("module load of {}: {e}", params.file)))?;

        if let Err(err) = os.symbol_lookup(&params.entry_point) {
            let _ = os.module_unload(module);
            return Err(EsError::AppCreate(format!(
                "entry point {}: {err}",
                params.entry_point
            )));
        }

        let main_task = match os.task_create(name, params.priority, params.stack_size) {
            Ok(task) => task,
            Err(err) => {
                let _ = os.module_unload(module);
                return Err(EsError::AppCreate(format!("main task: {err}")));
            }
        };

        let app_id = AppId::from_index(slot as u32);
        self.tasks[main_task.as_usize()] = Some(TaskRecord {
            name: name.to_string(),
            task: main_task,
            app: app_id,
            is_main: true,
        });
        self.apps[slot] = Some(AppRecord {
            name: name.to_string(),
            app_type,
            state: AppState::EarlyInit,
            params,
            main_task,
            module: Some(module),
            control: ControlRequest::Run,
            timer: 0,
        });
        let _ = syslog.append(os.clock_ms(), &format!("created app {name} in slot {slot}"));
        Ok(app_id)
    }

    /// Loads a shared library declared in the startup script
    pub fn load_library<O: OsApi>(
        &mut self,
        os: &mut O,
        syslog: &mut SysLog,
        entry: &StartupEntry,
    ) -> Result<LibId, EsError> {
        if entry.name.is_empty() || entry.name.len() > config::MAX_API_NAME_LEN {
            return Err(EsError::BadArgument(format!(
                "bad library name '{}'",
                entry.name
            )));
        }
        if self.libs.iter().flatten().any(|l| l.name == entry.name) {
            return Err(EsError::AppCreate(format!(
                "library '{}' already exists",
                entry.name
            )));
        }
        let slot = self
            .libs
            .iter()
            .position(|s| s.is_none())
            .ok_or_else(|| EsError::NoFreeSlots("library table".to_string()))?;

        let module = os
            .module_load(&entry.name, &entry.file)
            .map_err(|e| EsError::AppCreate(format!("module load of {}: {e}", entry.file)))?;
        if let Err(err) = os.symbol_lookup(&entry.entry_point) {
            let _ = os.module_unload(module);
            return Err(EsError::AppCreate(format!(
                "library init {}: {err}",
                entry.entry_point
            )));
        }

        self.libs[slot] = Some(LibRecord {
            name: entry.name.clone(),
            module,
        });
        let _ = syslog.append(os.clock_ms(), &format!("loaded library {}", entry.name));
        Ok(LibId::from_index(slot as u32))
    }

    /// Per-iteration gate called from every application's main loop
    ///
    /// Resolves the caller by task identity; an unknown caller gets
    /// `false` (terminate) rather than being trusted. Transitions
    /// EARLY_INIT to RUNNING on the first call.
    pub fn run_loop<O: OsApi>(&mut self, os: &mut O, status: RunStatus) -> bool {
        let Ok(caller) = os.task_self() else {
            return false;
        };
        let Some(app_id) = self.task_owner(caller) else {
            return false;
        };
        let Some(rec) = self.apps[app_id.as_usize()].as_mut() else {
            return false;
        };

        match status {
            RunStatus::Exit => {
                rec.control = ControlRequest::Exit;
                rec.state = AppState::Waiting;
                rec.timer = config::APP_KILL_TIMEOUT;
                false
            }
            RunStatus::Error => {
                rec.control = ControlRequest::Error;
                rec.state = AppState::Waiting;
                rec.timer = config::APP_KILL_TIMEOUT;
                false
            }
            RunStatus::Run => match rec.control {
                ControlRequest::Run | ControlRequest::None => {
                    if rec.state == AppState::EarlyInit {
                        rec.state = AppState::Running;
                    }
                    true
                }
                _ => {
                    rec.state = AppState::Waiting;
                    rec.timer = config::APP_KILL_TIMEOUT;
                    false
                }
            },
        }
    }

    /// Periodic table scan: counts down kill timers and processes the
    /// requests whose timer expired
    ///
    /// Processing frees the slot, so an expired timer escalates to
    /// deletion exactly once.
    pub fn scan_app_table<O: OsApi>(&mut self, os: &mut O, syslog: &mut SysLog) {
        let mut due = Vec::new();
        for (slot, rec) in self.apps.iter_mut().enumerate() {
            let Some(app) = rec else { continue };
            match app.state {
                AppState::Waiting => {
                    if app.timer > 0 {
                        app.timer -= 1;
                    }
                    if app.timer == 0 {
                        due.push(AppId::from_index(slot as u32));
                    }
                }
                AppState::Stopped => due.push(AppId::from_index(slot as u32)),
                _ => {}
            }
        }
        for app_id in due {
            self.process_control_request(os, syslog, app_id);
        }
    }

    /// Exhaustive dispatch over the pending control request
    pub fn process_control_request<O: OsApi>(
        &mut self,
        os: &mut O,
        syslog: &mut SysLog,
        app_id: AppId,
    ) {
        let Some(rec) = self.apps.get(app_id.as_usize()).and_then(|s| s.as_ref()) else {
            return;
        };
        let name = rec.name.clone();
        let control = rec.control.clone();
        let params = rec.params.clone();
        let app_type = rec.app_type;

        match control {
            ControlRequest::None => {
                let _ = syslog.append(
                    os.clock_ms(),
                    &format!("control request for {name} in unknown state"),
                );
            }
            ControlRequest::Run => {}
            ControlRequest::Exit => {
                let _ = syslog.append(os.clock_ms(), &format!("app {name} exited"));
                self.cleanup_app(os, app_id);
            }
            ControlRequest::Error => {
                let _ = syslog.append(os.clock_ms(), &format!("app {name} exited with error"));
                self.cleanup_app(os, app_id);
            }
            ControlRequest::SysDelete => {
                let _ = syslog.append(os.clock_ms(), &format!("deleting app {name}"));
                self.cleanup_app(os, app_id);
            }
            ControlRequest::SysRestart => {
                self.cleanup_app(os, app_id);
                if let Err(err) =
                    self.create_app_internal(os, syslog, &name, params, app_type)
                {
                    let _ = syslog.append(
                        os.clock_ms(),
                        &format!("restart of {name} failed: {err}"),
                    );
                }
            }
            ControlRequest::SysReload(new_file) => {
                let reloaded = StartParams {
                    file: new_file,
                    ..params
                };
                self.cleanup_app(os, app_id);
                if let Err(err) =
                    self.create_app_internal(os, syslog, &name, reloaded, app_type)
                {
                    let _ = syslog.append(
                        os.clock_ms(),
                        &format!("reload of {name} failed: {err}"),
                    );
                }
            }
            ControlRequest::SysException => {
                // No internal path sets this; treat it as an invalid
                // terminal state and tear the app down.
                let _ = syslog.append(
                    os.clock_ms(),
                    &format!("app {name} in unexpected exception state, deleting"),
                );
                self.cleanup_app(os, app_id);
            }
        }
    }

    /// Deletes the app's tasks, unloads its module, and frees the slot
    fn cleanup_app<O: OsApi>(&mut self, os: &mut O, app_id: AppId) {
        let Some(rec) = self.apps[app_id.as_usize()].take() else {
            return;
        };
        for slot in self.tasks.iter_mut() {
            if slot.as_ref().is_some_and(|t| t.app == app_id) {
                if let Some(task) = slot.take() {
                    let _ = os.task_delete(task.task);
                }
            }
        }
        if let Some(module) = rec.module {
            let _ = os.module_unload(module);
        }
    }

    /// Requests a restart of an external application
    pub fn request_restart_app(&mut self, app_id: AppId) -> Result<(), EsError> {
        self.request(app_id, ControlRequest::SysRestart)
    }

    /// Requests a reload of an external application from `file`
    pub fn request_reload_app(&mut self, app_id: AppId, file: &str) -> Result<(), EsError> {
        if file.len() > config::MAX_PATH_LEN {
            return Err(EsError::BadArgument(format!(
                "reload path exceeds {} bytes",
                config::MAX_PATH_LEN
            )));
        }
        self.request(app_id, ControlRequest::SysReload(file.to_string()))
    }

    /// Requests deletion of an external application
    pub fn request_stop_app(&mut self, app_id: AppId) -> Result<(), EsError> {
        self.request(app_id, ControlRequest::SysDelete)
    }

    fn request(&mut self, app_id: AppId, control: ControlRequest) -> Result<(), EsError> {
        let rec = self
            .apps
            .get_mut(app_id.as_usize())
            .and_then(|s| s.as_mut())
            .ok_or(EsError::InvalidAppId)?;
        if rec.app_type == AppType::Core {
            return Err(EsError::BadArgument(format!(
                "core app {} cannot be controlled individually",
                rec.name
            )));
        }
        rec.control = control;
        rec.state = AppState::Waiting;
        rec.timer = config::APP_KILL_TIMEOUT;
        Ok(())
    }

    /// Drains pending platform exceptions
    ///
    /// External apps configured for app-restart are marked for
    /// SYS_RESTART; core apps, unresolvable tasks, and apps configured
    /// for processor reset escalate through the platform, with the
    /// reset budget forcing a power-on reset when exhausted.
    pub fn exception_scan<O: OsApi, P: PspApi>(
        &mut self,
        os: &mut O,
        psp: &mut P,
        syslog: &mut SysLog,
        er_log: &mut ErLog,
    ) {
        for exc in psp.drain_exceptions() {
            er_log.add(
                ResetType::Processor,
                ResetSubtype::Other,
                self.processor_reset_count,
                &exc.description,
                os.clock_ms(),
            );
            let _ = syslog.append(os.clock_ms(), &format!("exception: {}", exc.description));

            let owner = exc.task.and_then(|task| self.task_owner(task));
            let restartable = owner.is_some_and(|app_id| {
                self.apps[app_id.as_usize()].as_ref().is_some_and(|rec| {
                    rec.app_type == AppType::External
                        && rec.params.exception_action == ExceptionAction::RestartApp
                })
            });

            if restartable {
                // request() only rejects core apps, excluded above
                if let Some(app_id) = owner {
                    let _ = self.request(app_id, ControlRequest::SysRestart);
                }
            } else {
                self.escalate_reset(psp);
            }
        }
    }

    /// Processor reset, or power-on once the budget is exhausted
    fn escalate_reset<P: PspApi>(&mut self, psp: &mut P) {
        if self.processor_reset_count >= config::MAX_PROCESSOR_RESETS {
            psp.restart(RestartRequest {
                reset_type: ResetType::PowerOn,
                subtype: ResetSubtype::MaxResetsExceeded,
            });
        } else {
            self.processor_reset_count += 1;
            psp.restart(RestartRequest {
                reset_type: ResetType::Processor,
                subtype: ResetSubtype::Other,
            });
        }
    }

    /// One startup synchronization cycle
    ///
    /// Advances CORE_READY → APPS_INIT → OPERATIONAL as external apps
    /// reach RUNNING; past the timeout, stragglers are forced to
    /// STOPPED and the system proceeds degraded.
    pub fn startup_sync_step<O: OsApi>(&mut self, os: &mut O, syslog: &mut SysLog) -> SystemState {
        if self.system_state != SystemState::CoreReady
            && self.system_state != SystemState::AppsInit
        {
            return self.system_state;
        }

        let stragglers: Vec<usize> = self
            .apps
            .iter()
            .enumerate()
            .filter_map(|(slot, rec)| {
                rec.as_ref()
                    .filter(|r| {
                        r.app_type == AppType::External && r.state == AppState::EarlyInit
                    })
                    .map(|_| slot)
            })
            .collect();

        if stragglers.is_empty() {
            self.system_state = SystemState::Operational;
            let _ = syslog.append(os.clock_ms(), "startup sync complete");
        } else {
            self.system_state = SystemState::AppsInit;
            self.sync_cycles += 1;
            if self.sync_cycles >= config::STARTUP_SYNC_TIMEOUT_CYCLES {
                for slot in stragglers {
                    if let Some(rec) = self.apps[slot].as_mut() {
                        let _ = syslog.append(
                            os.clock_ms(),
                            &format!("startup sync timeout: stopping {}", rec.name),
                        );
                        rec.state = AppState::Stopped;
                        rec.control = ControlRequest::Error;
                    }
                }
                self.degraded_startup = true;
                self.system_state = SystemState::Operational;
            }
        }
        self.system_state
    }

    /// Creates a child task for the calling application
    ///
    /// Only an application's main task may spawn children.
    pub fn create_child_task<O: OsApi>(
        &mut self,
        os: &mut O,
        name: &str,
        priority: u8,
        stack_size: usize,
    ) -> Result<TaskId, EsError> {
        if name.is_empty() || name.len() > config::MAX_API_NAME_LEN {
            return Err(EsError::BadArgument(format!("bad task name '{name}'")));
        }
        let caller = os.task_self().map_err(|e| EsError::Os(e.to_string()))?;
        let caller_rec = self
            .tasks
            .get(caller.as_usize())
            .and_then(|s| s.as_ref())
            .ok_or(EsError::InvalidTaskId)?;
        if !caller_rec.is_main {
            return Err(EsError::ChildTaskContext(
                "child tasks must be created from the app main task".to_string(),
            ));
        }
        let app = caller_rec.app;

        let task = os
            .task_create(name, priority, stack_size)
            .map_err(|e| EsError::Os(e.to_string()))?;
        self.tasks[task.as_usize()] = Some(TaskRecord {
            name: name.to_string(),
            task,
            app,
            is_main: false,
        });
        Ok(task)
    }

    /// Deletes a child task; main tasks are rejected
    pub fn delete_child_task<O: OsApi>(
        &mut self,
        os: &mut O,
        task: TaskId,
    ) -> Result<(), EsError> {
        let rec = self
            .tasks
            .get(task.as_usize())
            .and_then(|s| s.as_ref())
            .ok_or(EsError::InvalidTaskId)?;
        if rec.is_main {
            return Err(EsError::ChildTaskDelete);
        }
        os.task_delete(task).map_err(|e| EsError::Os(e.to_string()))?;
        self.tasks[task.as_usize()] = None;
        Ok(())
    }

    fn task_owner(&self, task: TaskId) -> Option<AppId> {
        self.tasks
            .get(task.as_usize())
            .and_then(|s| s.as_ref())
            .map(|rec| rec.app)
    }

    pub fn app_id_by_name(&self, name: &str) -> Option<AppId> {
        self.apps.iter().enumerate().find_map(|(slot, rec)| {
            rec.as_ref()
                .filter(|r| r.name == name)
                .map(|_| AppId::from_index(slot as u32))
        })
    }

    /// True while an app with this name holds a slot and has not been
    /// stopped; used for the CDS owner-active check
    pub fn is_app_active(&self, name: &str) -> bool {
        self.apps
            .iter()
            .flatten()
            .any(|rec| rec.name == name && rec.state != AppState::Stopped)
    }

    pub fn app_info(&self, app_id: AppId) -> Result<AppInfo, EsError> {
        let rec = self
            .apps
            .get(app_id.as_usize())
            .and_then(|s| s.as_ref())
            .ok_or(EsError::InvalidAppId)?;
        Ok(self.info_for(app_id, rec))
    }

    pub fn all_apps(&self) -> Vec<AppInfo> {
        self.apps
            .iter()
            .enumerate()
            .filter_map(|(slot, rec)| {
                rec.as_ref()
                    .map(|r| self.info_for(AppId::from_index(slot as u32), r))
            })
            .collect()
    }

    pub fn all_tasks(&self) -> Vec<TaskInfo> {
        self.tasks
            .iter()
            .flatten()
            .map(|rec| TaskInfo {
                task: rec.task,
                name: rec.name.clone(),
                app: rec.app,
                is_main: rec.is_main,
            })
            .collect()
    }

    pub fn all_libs(&self) -> Vec<LibInfo> {
        self.libs
            .iter()
            .enumerate()
            .filter_map(|(slot, rec)| {
                rec.as_ref().map(|r| LibInfo {
                    id: LibId::from_index(slot as u32),
                    name: r.name.clone(),
                })
            })
            .collect()
    }

    pub fn app_count(&self) -> usize {
        self.apps.iter().flatten().count()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.iter().flatten().count()
    }

    fn info_for(&self, app_id: AppId, rec: &AppRecord) -> AppInfo {
        let child_tasks = self
            .tasks
            .iter()
            .flatten()
            .filter(|t| t.app == app_id && !t.is_main)
            .count();
        AppInfo {
            id: app_id,
            name: rec.name.clone(),
            app_type: rec.app_type,
            state: rec.state,
            file: rec.params.file.clone(),
            priority: rec.params.priority,
            stack_size: rec.params.stack_size,
            main_task: rec.main_task,
            child_tasks,
        }
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use psp_api::{ExceptionInfo, RamCds};
    use services_syslog::SysLogMode;
    use sim_osal::{SimOp, SimOs};

    fn entry(name: &str) -> StartupEntry {
        StartupEntry {
            kind: ScriptEntryKind::App,
            file: format!("/cf/apps/{}.so", name.to_lowercase()),
            entry_point: format!("{name}_Main"),
            name: name.to_string(),
            priority: 50,
            stack_size: 8192,
            exception_action: ExceptionAction::RestartApp,
        }
    }

    fn setup() -> (LifecycleManager, SimOs, SysLog) {
        (
            LifecycleManager::new(),
            SimOs::new(),
            SysLog::new(SysLogMode::Overwrite),
        )
    }

    #[test]
    fn test_create_app_populates_tables() {
        let (mut mgr, mut os, mut log) = setup();
        let id = mgr
            .create_app(&mut os, &mut log, &entry("SAMPLE"), AppType::External)
            .unwrap();

        let info = mgr.app_info(id).unwrap();
        assert_eq!(info.name, "SAMPLE");
        assert_eq!(info.state, AppState::EarlyInit);
        assert!(os.task_exists(info.main_task));
        assert_eq!(os.loaded_modules(), vec!["SAMPLE".to_string()]);
        assert_eq!(mgr.task_count(), 1);
    }

    #[test]
    fn test_create_app_unwinds_on_symbol_failure() {
        let (mut mgr, mut os, mut log) = setup();
        os.remove_symbol("SAMPLE_Main");
        let err = mgr.create_app(&mut os, &mut log, &entry("SAMPLE"), AppType::External);
        assert!(matches!(err, Err(EsError::AppCreate(_))));
        // Module unloaded, no slot or task left behind
        assert!(os.loaded_modules().is_empty());
        assert_eq!(mgr.app_count(), 0);
        assert_eq!(mgr.task_count(), 0);
    }

    #[test]
    fn test_create_app_unwinds_on_task_failure() {
        let (mut mgr, mut os, mut log) = setup();
        os.force_fail(SimOp::TaskCreate);
        let err = mgr.create_app(&mut os, &mut log, &entry("SAMPLE"), AppType::External);
        assert!(matches!(err, Err(EsError::AppCreate(_))));
        assert!(os.loaded_modules().is_empty());
        assert_eq!(mgr.app_count(), 0);
    }

    #[test]
    fn test_app_table_capacity() {
        let (mut mgr, mut os, mut log) = setup();
        for i in 0..config::MAX_APPLICATIONS {
            mgr.create_app(&mut os, &mut log, &entry(&format!("A{i}")), AppType::External)
                .unwrap();
        }
        let err = mgr.create_app(&mut os, &mut log, &entry("ONEMORE"), AppType::External);
        assert!(matches!(err, Err(EsError::AppCreate(_))));
    }

    #[test]
    fn test_run_loop_gates_by_control_request() {
        let (mut mgr, mut os, mut log) = setup();
        let id = mgr
            .create_app(&mut os, &mut log, &entry("SAMPLE"), AppType::External)
            .unwrap();
        let main_task = mgr.app_info(id).unwrap().main_task;

        os.set_current_task(Some(main_task));
        assert!(mgr.run_loop(&mut os, RunStatus::Run));
        assert_eq!(mgr.app_info(id).unwrap().state, AppState::Running);

        mgr.request_stop_app(id).unwrap();
        assert!(!mgr.run_loop(&mut os, RunStatus::Run));
        assert_eq!(mgr.app_info(id).unwrap().state, AppState::Waiting);
    }

    #[test]
    fn test_run_loop_rejects_unknown_caller() {
        let (mut mgr, mut os, _) = setup();
        os.set_current_task(None);
        assert!(!mgr.run_loop(&mut os, RunStatus::Run));
    }

    #[test]
    fn test_exit_status_stops_app() {
        let (mut mgr, mut os, mut log) = setup();
        let id = mgr
            .create_app(&mut os, &mut log, &entry("SAMPLE"), AppType::External)
            .unwrap();
        os.set_current_task(Some(mgr.app_info(id).unwrap().main_task));
        assert!(!mgr.run_loop(&mut os, RunStatus::Exit));
        assert_eq!(mgr.app_info(id).unwrap().state, AppState::Waiting);
    }

    #[test]
    fn test_timer_expiry_deletes_exactly_once() {
        let (mut mgr, mut os, mut log) = setup();
        let id = mgr
            .create_app(&mut os, &mut log, &entry("SAMPLE"), AppType::External)
            .unwrap();
        let main_task = mgr.app_info(id).unwrap().main_task;
        mgr.request_stop_app(id).unwrap();

        for _ in 0..config::APP_KILL_TIMEOUT {
            assert_eq!(mgr.app_count(), 1);
            mgr.scan_app_table(&mut os, &mut log);
        }
        assert_eq!(mgr.app_count(), 0);
        assert!(!os.task_exists(main_task));

        // Subsequent scans are a no-op on the freed slot
        mgr.scan_app_table(&mut os, &mut log);
        assert_eq!(mgr.app_count(), 0);
    }

    #[test]
    fn test_restart_recreates_app() {
        let (mut mgr, mut os, mut log) = setup();
        let id = mgr
            .create_app(&mut os, &mut log, &entry("SAMPLE"), AppType::External)
            .unwrap();
        mgr.request_restart_app(id).unwrap();
        for _ in 0..config::APP_KILL_TIMEOUT {
            mgr.scan_app_table(&mut os, &mut log);
        }

        let id = mgr.app_id_by_name("SAMPLE").unwrap();
        assert_eq!(mgr.app_info(id).unwrap().state, AppState::EarlyInit);
        assert_eq!(os.loaded_modules(), vec!["SAMPLE".to_string()]);
    }

    #[test]
    fn test_reload_uses_new_file() {
        let (mut mgr, mut os, mut log) = setup();
        let id = mgr
            .create_app(&mut os, &mut log, &entry("SAMPLE"), AppType::External)
            .unwrap();
        assert!(matches!(
            mgr.request_reload_app(id, &format!("/cf/{}.so", "x".repeat(80))),
            Err(EsError::BadArgument(_))
        ));
        mgr.request_reload_app(id, "/cf/apps/sample_v2.so").unwrap();
        for _ in 0..config::APP_KILL_TIMEOUT {
            mgr.scan_app_table(&mut os, &mut log);
        }

        let id = mgr.app_id_by_name("SAMPLE").unwrap();
        assert_eq!(mgr.app_info(id).unwrap().file, "/cf/apps/sample_v2.so");
    }

    #[test]
    fn test_core_app_cannot_be_stopped() {
        let (mut mgr, mut os, mut log) = setup();
        let id = mgr
            .create_app(&mut os, &mut log, &entry("CORE"), AppType::Core)
            .unwrap();
        assert!(matches!(
            mgr.request_stop_app(id),
            Err(EsError::BadArgument(_))
        ));
    }

    #[test]
    fn test_exception_marks_external_app_for_restart() {
        let (mut mgr, mut os, mut log) = setup();
        let mut psp = RamCds::new(16 * 1024);
        let mut er = ErLog::new();
        let id = mgr
            .create_app(&mut os, &mut log, &entry("SAMPLE"), AppType::External)
            .unwrap();
        let main_task = mgr.app_info(id).unwrap().main_task;

        psp.inject_exception(ExceptionInfo {
            task: Some(main_task),
            description: "divide by zero".to_string(),
        });
        mgr.exception_scan(&mut os, &mut psp, &mut log, &mut er);

        assert_eq!(mgr.app_info(id).unwrap().state, AppState::Waiting);
        assert!(psp.restart_requests().is_empty());
        assert_eq!(er.len(), 1);

        // The pending SYS_RESTART recreates the app once the kill
        // timer runs down
        for _ in 0..config::APP_KILL_TIMEOUT {
            mgr.scan_app_table(&mut os, &mut log);
        }
        let id = mgr.app_id_by_name("SAMPLE").unwrap();
        assert_eq!(mgr.app_info(id).unwrap().state, AppState::EarlyInit);
    }

    #[test]
    fn test_unexpected_exception_request_deletes_app() {
        let (mut mgr, mut os, mut log) = setup();
        let id = mgr
            .create_app(&mut os, &mut log, &entry("SAMPLE"), AppType::External)
            .unwrap();
        // Force the invalid terminal state directly; no internal path
        // produces it
        if let Some(rec) = mgr.apps[id.as_usize()].as_mut() {
            rec.control = ControlRequest::SysException;
            rec.state = AppState::Stopped;
        }
        let before = log.entry_count();
        mgr.scan_app_table(&mut os, &mut log);
        assert_eq!(mgr.app_count(), 0);
        assert!(log.entry_count() > before);
    }

    #[test]
    fn test_unattributable_exception_escalates_to_reset() {
        let (mut mgr, mut os, mut log) = setup();
        let mut psp = RamCds::new(16 * 1024);
        let mut er = ErLog::new();

        for _ in 0..config::MAX_PROCESSOR_RESETS {
            psp.inject_exception(ExceptionInfo {
                task: None,
                description: "bus fault".to_string(),
            });
            mgr.exception_scan(&mut os, &mut psp, &mut log, &mut er);
        }
        assert!(psp
            .restart_requests()
            .iter()
            .all(|r| r.reset_type == ResetType::Processor));

        // Budget exhausted: next exception forces a power-on reset
        psp.inject_exception(ExceptionInfo {
            task: None,
            description: "bus fault".to_string(),
        });
        mgr.exception_scan(&mut os, &mut psp, &mut log, &mut er);
        let last = psp.restart_requests().last().unwrap();
        assert_eq!(last.reset_type, ResetType::PowerOn);
        assert_eq!(last.subtype, ResetSubtype::MaxResetsExceeded);
    }

    #[test]
    fn test_startup_sync_completes_when_apps_run() {
        let (mut mgr, mut os, mut log) = setup();
        let id = mgr
            .create_app(&mut os, &mut log, &entry("SAMPLE"), AppType::External)
            .unwrap();
        mgr.set_system_state(SystemState::CoreReady);

        assert_eq!(
            mgr.startup_sync_step(&mut os, &mut log),
            SystemState::AppsInit
        );

        os.set_current_task(Some(mgr.app_info(id).unwrap().main_task));
        mgr.run_loop(&mut os, RunStatus::Run);
        assert_eq!(
            mgr.startup_sync_step(&mut os, &mut log),
            SystemState::Operational
        );
        assert!(!mgr.degraded_startup());
    }

    #[test]
    fn test_startup_sync_timeout_degrades() {
        let (mut mgr, mut os, mut log) = setup();
        let id = mgr
            .create_app(&mut os, &mut log, &entry("STUCK"), AppType::External)
            .unwrap();
        mgr.set_system_state(SystemState::CoreReady);

        for _ in 0..config::STARTUP_SYNC_TIMEOUT_CYCLES {
            mgr.startup_sync_step(&mut os, &mut log);
        }
        assert_eq!(mgr.system_state(), SystemState::Operational);
        assert!(mgr.degraded_startup());
        assert_eq!(mgr.app_info(id).unwrap().state, AppState::Stopped);
    }

    #[test]
    fn test_child_task_rules() {
        let (mut mgr, mut os, mut log) = setup();
        let id = mgr
            .create_app(&mut os, &mut log, &entry("SAMPLE"), AppType::External)
            .unwrap();
        let main_task = mgr.app_info(id).unwrap().main_task;

        os.set_current_task(Some(main_task));
        let child = mgr.create_child_task(&mut os, "WORKER", 80, 2048).unwrap();
        assert_eq!(mgr.app_info(id).unwrap().child_tasks, 1);

        // A child task may not spawn further children
        os.set_current_task(Some(child));
        assert!(matches!(
            mgr.create_child_task(&mut os, "GRANDCHILD", 80, 2048),
            Err(EsError::ChildTaskContext(_))
        ));

        // Deleting the main task by id is rejected
        assert_eq!(
            mgr.delete_child_task(&mut os, main_task),
            Err(EsError::ChildTaskDelete)
        );
        mgr.delete_child_task(&mut os, child).unwrap();
        assert_eq!(mgr.app_info(id).unwrap().child_tasks, 0);
    }

    #[test]
    fn test_cleanup_deletes_child_tasks() {
        let (mut mgr, mut os, mut log) = setup();
        let id = mgr
            .create_app(&mut os, &mut log, &entry("SAMPLE"), AppType::External)
            .unwrap();
        os.set_current_task(Some(mgr.app_info(id).unwrap().main_task));
        let child = mgr.create_child_task(&mut os, "WORKER", 80, 2048).unwrap();

        mgr.request_stop_app(id).unwrap();
        for _ in 0..config::APP_KILL_TIMEOUT {
            mgr.scan_app_table(&mut os, &mut log);
        }
        assert!(!os.task_exists(child));
        assert_eq!(mgr.task_count(), 0);
    }

    #[test]
    fn test_start_applications_from_script() {
        let (mut mgr, mut os, mut log) = setup();
        os.seed_file(
            "/cf/startup.scr",
            b"APP, /cf/apps/a.so, A_Main, A, 50, 8192, 0, 0;\n\
              APP, broken;\n\
              LIB, /cf/apps/lib.so, LIB_Init, CFS_LIB, 0, 0, 0, 0;\n\
              !\n",
        );
        let outcome = mgr.start_applications(&mut os, &mut log, "/cf/startup.scr");
        assert_eq!(outcome.created_apps, 1);
        assert_eq!(outcome.created_libs, 1);
        assert_eq!(outcome.failed_entries, 1);
        assert!(mgr.app_id_by_name("A").is_some());
        assert_eq!(mgr.all_libs().len(), 1);
    }

    #[test]
    fn test_missing_script_logs_and_continues() {
        let (mut mgr, mut os, mut log) = setup();
        let outcome = mgr.start_applications(&mut os, &mut log, "/cf/nope.scr");
        assert_eq!(outcome, StartupOutcome::default());
        assert!(log.entry_count() > 0);
    }

    #[test]
    fn test_is_app_active_tracks_state() {
        let (mut mgr, mut os, mut log) = setup();
        let id = mgr
            .create_app(&mut os, &mut log, &entry("APPX"), AppType::External)
            .unwrap();
        assert!(mgr.is_app_active("APPX"));
        assert!(!mgr.is_app_active("OTHER"));

        // Mark stopped without freeing the slot
        if let Some(rec) = mgr.apps[id.as_usize()].as_mut() {
            rec.state = AppState::Stopped;
        }
        assert!(!mgr.is_app_active("APPX"));
    }
}
