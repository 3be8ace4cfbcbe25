// Native callbacks and engine events
//
// Callbacks arrive from the native callback thread and are queued onto the dispatcher.
// Events are what the engine reports to its embedder after handling them.

use crate::native::NativeProcess;
use crate::types::{AppDomainId, ClrVersion, ProcessId, ThreadId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub enum DebugCallback {
    ProcessCreated {
        process: Arc<dyn NativeProcess>,
    },
    ProcessExited {
        pid: ProcessId,
        exit_code: i32,
    },
    ThreadCreated {
        pid: ProcessId,
        thread_id: ThreadId,
    },
    ThreadExited {
        pid: ProcessId,
        thread_id: ThreadId,
    },
    AppDomainCreated {
        pid: ProcessId,
        app_domain_id: AppDomainId,
    },
    Breakpoint {
        pid: ProcessId,
        thread_id: ThreadId,
    },
    StepComplete {
        pid: ProcessId,
        thread_id: ThreadId,
    },
    Exception {
        pid: ProcessId,
        thread_id: ThreadId,
        unhandled: bool,
    },
    LogMessage {
        pid: ProcessId,
        thread_id: ThreadId,
        category: String,
        message: String,
    },
}

impl DebugCallback {
    pub fn kind(&self) -> &'static str {
        match self {
            DebugCallback::ProcessCreated { .. } => "ProcessCreated",
            DebugCallback::ProcessExited { .. } => "ProcessExited",
            DebugCallback::ThreadCreated { .. } => "ThreadCreated",
            DebugCallback::ThreadExited { .. } => "ThreadExited",
            DebugCallback::AppDomainCreated { .. } => "AppDomainCreated",
            DebugCallback::Breakpoint { .. } => "Breakpoint",
            DebugCallback::StepComplete { .. } => "StepComplete",
            DebugCallback::Exception { .. } => "Exception",
            DebugCallback::LogMessage { .. } => "LogMessage",
        }
    }

    /// Process the callback belongs to. Unknown for ProcessCreated until the
    /// controller has read it.
    pub fn pid(&self) -> Option<ProcessId> {
        match self {
            DebugCallback::ProcessCreated { .. } => None,
            DebugCallback::ProcessExited { pid, .. }
            | DebugCallback::ThreadCreated { pid, .. }
            | DebugCallback::ThreadExited { pid, .. }
            | DebugCallback::AppDomainCreated { pid, .. }
            | DebugCallback::Breakpoint { pid, .. }
            | DebugCallback::StepComplete { pid, .. }
            | DebugCallback::Exception { pid, .. }
            | DebugCallback::LogMessage { pid, .. } => Some(*pid),
        }
    }
}

impl fmt::Debug for DebugCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pid() {
            Some(pid) => write!(f, "{}(pid={})", self.kind(), pid),
            None => write!(f, "{}", self.kind()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason")]
pub enum PauseReason {
    Breakpoint,
    StepComplete,
    Exception { unhandled: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    ProcessCreated {
        pid: ProcessId,
        version: ClrVersion,
    },
    ProcessExited {
        pid: ProcessId,
        exit_code: i32,
    },
    ThreadCreated {
        pid: ProcessId,
        thread_id: ThreadId,
    },
    ThreadExited {
        pid: ProcessId,
        thread_id: ThreadId,
    },
    AppDomainCreated {
        pid: ProcessId,
        app_domain_id: AppDomainId,
    },
    Paused {
        pid: ProcessId,
        thread_id: ThreadId,
        reason: PauseReason,
    },
    LogMessage {
        pid: ProcessId,
        thread_id: ThreadId,
        category: String,
        message: String,
    },
    Detached {
        pid: ProcessId,
    },
}
