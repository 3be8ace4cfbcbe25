// Native debugging control interface
//
// The engine consumes these traits; a platform binding (or the test mock) implements
// them. Higher interface revisions are reached through the `as_processN` probes, which
// return None when the native object does not implement that revision.

use crate::status::{HResult, NativeResult, E_NOINTERFACE, E_NOTIMPL};
use crate::types::{
    Address, AppDomainId, ClrVersion, CompilerFlags, MetadataUpdateMode, NgenPolicy,
    ProcessId, RawProcessHandle, ThreadDebugState, ThreadId,
};
use std::sync::Arc;

/// Outcome of a native memory transfer. `count` is valid even when `status` is a
/// partial-copy failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub status: HResult,
    pub count: usize,
}

impl Transfer {
    pub fn new(status: HResult, count: usize) -> Self {
        Self { status, count }
    }
}

/// Native "next" cursor. Yields one element per call; anything other than
/// `(S_OK, Some(_))` ends the enumeration.
pub trait NativeEnum<T: ?Sized>: Send {
    fn next(&mut self) -> (HResult, Option<Arc<T>>);
}

pub type NativeEnumBox<T> = Box<dyn NativeEnum<T>>;

pub trait NativeProcess: Send + Sync {
    fn id(&self) -> NativeResult<ProcessId>;
    fn helper_thread_id(&self) -> NativeResult<ThreadId>;
    fn is_running(&self) -> NativeResult<bool>;
    fn stop(&self, timeout_ms: u32) -> HResult;
    fn continue_(&self, out_of_band: bool) -> HResult;

    fn enumerate_threads(&self) -> NativeResult<NativeEnumBox<dyn NativeThread>>;
    fn enumerate_app_domains(&self) -> NativeResult<NativeEnumBox<dyn NativeAppDomain>>;
    fn handle(&self) -> NativeResult<RawProcessHandle>;

    fn read_memory(&self, address: Address, buffer: &mut [u8]) -> Transfer;
    fn write_memory(&self, address: Address, buffer: &[u8]) -> Transfer;

    fn set_all_threads_debug_state(
        &self,
        state: ThreadDebugState,
        except: Option<&Arc<dyn NativeThread>>,
    ) -> HResult;
    fn has_queued_callbacks(&self, thread: Option<&Arc<dyn NativeThread>>) -> NativeResult<bool>;
    fn thread(&self, thread_id: ThreadId) -> NativeResult<Option<Arc<dyn NativeThread>>>;
    fn thread_for_fiber_cookie(&self, cookie: u32) -> NativeResult<Option<Arc<dyn NativeThread>>>;
    fn is_os_suspended(&self, thread_id: ThreadId) -> NativeResult<bool>;
    fn is_transition_stub(&self, address: Address) -> NativeResult<bool>;
    fn clear_current_exception(&self, thread_id: ThreadId) -> HResult;

    fn terminate(&self, exit_code: u32) -> HResult;
    fn detach(&self) -> HResult;

    fn as_process2(&self) -> Option<&dyn NativeProcess2> {
        None
    }

    fn as_process3(&self) -> Option<&dyn NativeProcess3> {
        None
    }

    fn as_process5(&self) -> Option<&dyn NativeProcess5> {
        None
    }

    fn as_process7(&self) -> Option<&dyn NativeProcess7> {
        None
    }

    fn as_process8(&self) -> Option<&dyn NativeProcess8> {
        None
    }
}

pub trait NativeProcess2: Send + Sync {
    fn version(&self) -> NativeResult<ClrVersion>;
    fn desired_ngen_compiler_flags(&self) -> NativeResult<CompilerFlags>;
    fn set_desired_ngen_compiler_flags(&self, flags: CompilerFlags) -> HResult;
}

pub trait NativeProcess3: Send + Sync {
    fn set_enable_custom_notification(&self, class: &Arc<dyn NativeClass>, enable: bool) -> HResult;
}

pub trait NativeProcess5: Send + Sync {
    fn enable_ngen_policy(&self, policy: NgenPolicy) -> HResult;
    fn object(&self, address: Address) -> NativeResult<Option<Arc<dyn NativeValue>>>;
}

pub trait NativeProcess7: Send + Sync {
    fn set_writeable_metadata_update_mode(&self, mode: MetadataUpdateMode) -> HResult;
}

pub trait NativeProcess8: Send + Sync {
    fn enable_exception_callbacks_outside_of_my_code(&self, enable: bool) -> HResult;
    fn enable_log_messages(&self, enable: bool) -> HResult;
}

pub trait NativeThread: Send + Sync {
    fn id(&self) -> NativeResult<ThreadId>;
    fn current_exception(&self) -> NativeResult<Option<Arc<dyn NativeValue>>>;
    fn active_frame(&self) -> NativeResult<Option<Arc<dyn NativeFrame>>>;
}

pub trait NativeAppDomain: Send + Sync {
    fn id(&self) -> NativeResult<AppDomainId>;
    fn name(&self) -> NativeResult<String>;
}

pub trait NativeClass: Send + Sync {
    fn token(&self) -> NativeResult<u32>;
}

pub trait NativeFrame: Send + Sync {
    fn function_token(&self) -> NativeResult<u32>;
    fn local(&self, index: u32) -> NativeResult<Option<Arc<dyn NativeValue>>>;
    fn argument(&self, index: u32) -> NativeResult<Option<Arc<dyn NativeValue>>>;

    /// Return values recorded for calls that just completed in this frame, keyed by
    /// the callee's method token
    fn return_values(&self) -> NativeResult<Vec<(u32, Arc<dyn NativeValue>)>> {
        Err(E_NOTIMPL)
    }
}

pub trait NativeValue: Send + Sync {
    /// Address of the object this value denotes (the target for reference values)
    fn address(&self) -> NativeResult<Address>;

    fn is_reference(&self) -> bool {
        false
    }

    fn is_null(&self) -> NativeResult<bool> {
        Ok(false)
    }

    /// Resolves a handle or reference to the value it currently points at
    fn dereference(&self) -> NativeResult<Arc<dyn NativeValue>> {
        Err(E_NOINTERFACE)
    }

    fn as_heap_value(&self) -> Option<&dyn NativeHeapValue> {
        None
    }
}

pub trait NativeHeapValue: Send + Sync {
    /// Creates a strong GC handle that keeps tracking the object across continues
    fn create_strong_handle(&self) -> NativeResult<Arc<dyn NativeValue>>;
}
