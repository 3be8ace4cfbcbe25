// Debugging engine
//
// Top-level state owned by the dispatcher thread: the registry of debuggee processes
// and their runtime facades, and the handling of native callbacks.

use crate::callbacks::{DebugCallback, EngineEvent, PauseReason};
use crate::config::EngineConfig;
use crate::dispatcher::{DispatchTarget, Dispatcher, ThreadAffinity};
use crate::native::NativeProcess;
use crate::process::Process;
use crate::runtime::RuntimeFacade;
use crate::status::{EngineError, EngineResult, E_FAIL};
use crate::types::{ProcessId, ThreadId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub struct Engine {
    affinity: ThreadAffinity,
    config: EngineConfig,
    processes: HashMap<ProcessId, Process>,
    runtimes: HashMap<ProcessId, RuntimeFacade>,
    event_tx: mpsc::Sender<EngineEvent>,
}

/// Start the dispatcher thread with a fresh engine on it.
///
/// Returns the dispatcher, which the native callback thread and command issuers
/// share through its handles, and the receiving end of the engine event channel.
pub fn start_engine(config: EngineConfig) -> EngineResult<(Dispatcher<Engine>, mpsc::Receiver<EngineEvent>)> {
    config.validate()?;
    let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
    let name = config.thread_name.clone();
    let capacity = config.queue_capacity;

    let dispatcher = Dispatcher::start(&name, capacity, move |affinity| Engine::new(affinity, config, event_tx))?;
    info!("Engine started on thread {}", name);
    Ok((dispatcher, event_rx))
}

impl Engine {
    pub fn new(affinity: ThreadAffinity, config: EngineConfig, event_tx: mpsc::Sender<EngineEvent>) -> Self {
        Self {
            affinity,
            config,
            processes: HashMap::new(),
            runtimes: HashMap::new(),
            event_tx,
        }
    }

    pub fn affinity(&self) -> &ThreadAffinity {
        &self.affinity
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn process(&self, pid: ProcessId) -> EngineResult<&Process> {
        self.affinity.verify_access();
        self.processes.get(&pid).ok_or(EngineError::ProcessNotFound(pid))
    }

    pub fn runtime(&self, pid: ProcessId) -> EngineResult<&RuntimeFacade> {
        self.affinity.verify_access();
        self.runtimes.get(&pid).ok_or(EngineError::ProcessNotFound(pid))
    }

    /// Pids of all registered processes, in ascending order
    pub fn processes(&self) -> Vec<ProcessId> {
        self.affinity.verify_access();
        let mut pids: Vec<_> = self.processes.keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    pub fn continue_process(&self, pid: ProcessId) -> EngineResult<()> {
        self.process(pid)?.continue_process(false)
    }

    pub fn stop(&self, pid: ProcessId) -> EngineResult<()> {
        self.process(pid)?.stop(self.config.stop_timeout_ms)
    }

    /// Detach and forget the process. It stays registered if the runtime refuses.
    pub fn detach(&mut self, pid: ProcessId) -> EngineResult<()> {
        if !self.process(pid)?.detach() {
            return Err(EngineError::native("Detach", E_FAIL));
        }
        self.processes.remove(&pid);
        self.runtimes.remove(&pid);
        info!("Detached from process {}", pid);
        self.emit(EngineEvent::Detached { pid });
        Ok(())
    }

    /// The process is removed when its exit callback arrives, not here
    pub fn terminate(&self, pid: ProcessId, exit_code: i32) -> EngineResult<()> {
        if self.process(pid)?.terminate(exit_code) {
            Ok(())
        } else {
            Err(EngineError::native("Terminate", E_FAIL))
        }
    }

    fn on_process_created(&mut self, native: Arc<dyn NativeProcess>) {
        let process = Process::new(native);
        let pid = process.pid();

        // Compiler flags can only be set while this callback is being handled
        if let Some(flags) = self.config.desired_compiler_flags {
            process.set_desired_compiler_flags(flags);
        }
        if let Some(policy) = self.config.ngen_policy {
            process.enable_ngen_policy(policy);
        }
        if let Some(mode) = self.config.metadata_update_mode {
            process.set_metadata_update_mode(mode);
        }
        if let Some(enabled) = self.config.log_messages {
            process.enable_log_messages(enabled);
        }
        if let Some(enabled) = self.config.exception_callbacks_outside_user_code {
            process.enable_exception_callbacks_outside_user_code(enabled);
        }

        let version = process.clr_version();
        info!("Process created: {}", process);

        if let Err(e) = process.continue_process(false) {
            warn!("Failed to continue new process {}: {}", pid, e);
        }

        let runtime = RuntimeFacade::new(self.affinity.clone(), pid, version, self.config.object_ids);
        self.runtimes.insert(pid, runtime);
        if self.processes.insert(pid, process).is_some() {
            warn!("Replaced stale registration for process {}", pid);
        }
        self.emit(EngineEvent::ProcessCreated { pid, version });
    }

    fn on_process_exited(&mut self, pid: ProcessId, exit_code: i32) {
        self.runtimes.remove(&pid);
        if self.processes.remove(&pid).is_none() {
            warn!("Exit callback for unknown process {}", pid);
            return;
        }
        info!("Process {} exited with code {}", pid, exit_code);
        self.emit(EngineEvent::ProcessExited { pid, exit_code });
    }

    /// Report the event and let the process run on
    fn resume_after(&self, pid: ProcessId, event: EngineEvent) {
        let Some(process) = self.processes.get(&pid) else {
            warn!("Callback for unknown process {}", pid);
            return;
        };
        self.emit(event);
        if let Err(e) = process.continue_process(false) {
            warn!("Failed to continue process {}: {}", pid, e);
        }
    }

    /// Leave the process stopped for the user
    fn pause(&self, pid: ProcessId, thread_id: ThreadId, reason: PauseReason) {
        if !self.processes.contains_key(&pid) {
            warn!("Callback for unknown process {}", pid);
            return;
        }
        info!("Process {} paused on thread {}: {:?}", pid, thread_id, reason);
        self.emit(EngineEvent::Paused { pid, thread_id, reason });
    }

    fn emit(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                error!("Event channel full! Dropping {:?}", event);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Event receiver dropped, discarding event");
            }
        }
    }
}

impl DispatchTarget for Engine {
    fn handle_callback(&mut self, callback: DebugCallback) {
        self.affinity.verify_access();
        debug!("Handling callback {:?}", callback);

        match callback {
            DebugCallback::ProcessCreated { process } => self.on_process_created(process),
            DebugCallback::ProcessExited { pid, exit_code } => self.on_process_exited(pid, exit_code),
            DebugCallback::ThreadCreated { pid, thread_id } => {
                self.resume_after(pid, EngineEvent::ThreadCreated { pid, thread_id })
            }
            DebugCallback::ThreadExited { pid, thread_id } => {
                self.resume_after(pid, EngineEvent::ThreadExited { pid, thread_id })
            }
            DebugCallback::AppDomainCreated { pid, app_domain_id } => {
                self.resume_after(pid, EngineEvent::AppDomainCreated { pid, app_domain_id })
            }
            DebugCallback::LogMessage {
                pid,
                thread_id,
                category,
                message,
            } => self.resume_after(
                pid,
                EngineEvent::LogMessage {
                    pid,
                    thread_id,
                    category,
                    message,
                },
            ),
            DebugCallback::Breakpoint { pid, thread_id } => self.pause(pid, thread_id, PauseReason::Breakpoint),
            DebugCallback::StepComplete { pid, thread_id } => {
                self.pause(pid, thread_id, PauseReason::StepComplete)
            }
            DebugCallback::Exception {
                pid,
                thread_id,
                unhandled,
            } => self.pause(pid, thread_id, PauseReason::Exception { unhandled }),
        }
    }
}
