// Debuggee process controller
//
// Process-level facade over the native process interface. Optional queries degrade to
// a default value when the native side fails or lacks the required interface tier;
// only run-state control and memory writes report failures to the caller.

use crate::appdomain::AppDomain;
use crate::enumerator::NativeEnumIter;
use crate::handle::NativeHandle;
use crate::native::{NativeAppDomain, NativeClass, NativeProcess, NativeThread};
use crate::status::{EngineError, EngineResult, HResult, NativeResult, ERROR_PARTIAL_COPY};
use crate::thread::Thread;
use crate::types::{
    Address, CapabilityTier, ClrVersion, CompilerFlags, MetadataUpdateMode, NgenPolicy,
    ProcessId, RawProcessHandle, ThreadDebugState, ThreadId,
};
use crate::value::Value;
use bytes::Buf;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

pub type ThreadIter = NativeEnumIter<dyn NativeThread, Thread>;
pub type AppDomainIter = NativeEnumIter<dyn NativeAppDomain, AppDomain>;

#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Process {
    handle: NativeHandle<dyn NativeProcess>,
    pid: ProcessId,
}

impl Process {
    /// Wrap a native process. The pid is read once here and never re-queried.
    pub fn new(native: Arc<dyn NativeProcess>) -> Self {
        let pid = native.id().unwrap_or_else(|hr| {
            warn!("GetID failed: {}", hr);
            0
        });
        Self {
            handle: NativeHandle::new(native),
            pid,
        }
    }

    pub fn handle(&self) -> &NativeHandle<dyn NativeProcess> {
        &self.handle
    }

    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// The debugger helper thread id. It can change, so this always asks the runtime.
    pub fn helper_thread_id(&self) -> Option<ThreadId> {
        match self.handle.raw().helper_thread_id() {
            Ok(0) => None,
            Ok(id) => Some(id),
            Err(hr) => {
                debug!("GetHelperThreadID failed: {}", hr);
                None
            }
        }
    }

    /// true if the threads are running freely
    pub fn is_running(&self) -> bool {
        self.handle.raw().is_running().unwrap_or(false)
    }

    pub fn stop(&self, timeout_ms: u32) -> EngineResult<()> {
        self.handle
            .raw()
            .stop(timeout_ms)
            .check()
            .map_err(|hr| EngineError::native("Stop", hr))
    }

    /// Resume the process. Thread and AppDomain views obtained before this call must
    /// not be used afterwards.
    pub fn continue_process(&self, out_of_band: bool) -> EngineResult<()> {
        self.handle
            .raw()
            .continue_(out_of_band)
            .check()
            .map_err(|hr| EngineError::native("Continue", hr))
    }

    /// All managed threads. A failed enumeration yields nothing.
    pub fn threads(&self) -> ThreadIter {
        match self.handle.raw().enumerate_threads() {
            Ok(cursor) => NativeEnumIter::new(cursor, Thread::new),
            Err(hr) => {
                debug!("EnumerateThreads failed: {}", hr);
                NativeEnumIter::empty(Thread::new)
            }
        }
    }

    /// All AppDomains. A failed enumeration yields nothing.
    pub fn app_domains(&self) -> AppDomainIter {
        match self.handle.raw().enumerate_app_domains() {
            Ok(cursor) => NativeEnumIter::new(cursor, AppDomain::new),
            Err(hr) => {
                debug!("EnumerateAppDomains failed: {}", hr);
                NativeEnumIter::empty(AppDomain::new)
            }
        }
    }

    /// OS process handle, owned by the native debugging layer
    pub fn process_handle(&self) -> Option<RawProcessHandle> {
        self.handle
            .raw()
            .handle()
            .ok()
            .filter(|h| h.0 != 0)
    }

    /// Runtime version, or the zero version if unavailable
    pub fn clr_version(&self) -> ClrVersion {
        let Some(p2) = self.probe_tier2("GetVersion") else {
            return ClrVersion::ZERO;
        };
        p2.version().unwrap_or_else(|hr| {
            debug!("GetVersion failed: {}", hr);
            ClrVersion::ZERO
        })
    }

    pub fn desired_compiler_flags(&self) -> CompilerFlags {
        let Some(p2) = self.probe_tier2("GetDesiredNGENCompilerFlags") else {
            return CompilerFlags::DEFAULT;
        };
        p2.desired_ngen_compiler_flags()
            .unwrap_or(CompilerFlags::DEFAULT)
    }

    /// Only valid while handling the process-created callback. Not checked here.
    pub fn set_desired_compiler_flags(&self, flags: CompilerFlags) {
        if let Some(p2) = self.probe_tier2("SetDesiredNGENCompilerFlags") {
            ignore_status("SetDesiredNGENCompilerFlags", p2.set_desired_ngen_compiler_flags(flags));
        }
    }

    /// Read exactly `size` bytes, retrying partial reads. Returns None if the whole
    /// range can't be read or `address` is null; never a short buffer.
    pub fn read_memory(&self, address: Address, size: usize) -> Option<Vec<u8>> {
        if address == 0 {
            return None;
        }
        let mut buffer: Vec<u8> = Vec::new();
        if let Err(e) = buffer.try_reserve_exact(size) {
            debug!("ReadMemory of {} bytes at {:#x} not attempted: {}", size, address, e);
            return None;
        }
        buffer.resize(size, 0);
        let mut index = 0;
        let mut address = address;
        while index < size {
            let read = match self.read_memory_chunk(address, &mut buffer[index..]) {
                Ok(0) | Err(_) => {
                    trace!("ReadMemory stopped at {:#x} after {} of {} bytes", address, index, size);
                    return None;
                }
                Ok(read) => read.min(size - index),
            };
            index += read;
            address = address.wrapping_add(read as Address);
        }
        Some(buffer)
    }

    /// One native read. A partial-copy status counts as success for the bytes that
    /// were copied.
    pub fn read_memory_chunk(&self, address: Address, buffer: &mut [u8]) -> NativeResult<usize> {
        let transfer = self.handle.raw().read_memory(address, buffer);
        if transfer.status.is_failure() && transfer.status != ERROR_PARTIAL_COPY {
            return Err(transfer.status);
        }
        Ok(transfer.count)
    }

    /// Write `bytes` with a single native call and return how many were written
    pub fn write_memory(&self, address: Address, bytes: &[u8]) -> EngineResult<usize> {
        if bytes.is_empty() {
            return Ok(0);
        }
        let transfer = self.handle.raw().write_memory(address, bytes);
        if transfer.status.is_failure() && transfer.status != ERROR_PARTIAL_COPY {
            return Err(EngineError::native("WriteMemory", transfer.status));
        }
        Ok(transfer.count)
    }

    pub fn read_u8(&self, address: Address) -> Option<u8> {
        self.read_memory(address, 1).map(|b| b[0])
    }

    pub fn read_u16(&self, address: Address) -> Option<u16> {
        self.read_memory(address, 2).map(|b| (&b[..]).get_u16_le())
    }

    pub fn read_u32(&self, address: Address) -> Option<u32> {
        self.read_memory(address, 4).map(|b| (&b[..]).get_u32_le())
    }

    pub fn read_u64(&self, address: Address) -> Option<u64> {
        self.read_memory(address, 8).map(|b| (&b[..]).get_u64_le())
    }

    /// Read a target pointer of `pointer_size` bytes (4 or 8)
    pub fn read_pointer(&self, address: Address, pointer_size: usize) -> Option<Address> {
        match pointer_size {
            4 => self.read_u32(address).map(Address::from),
            8 => self.read_u64(address),
            _ => None,
        }
    }

    /// Set the debug state of all managed threads, optionally exempting one
    pub fn set_all_threads_debug_state(&self, state: ThreadDebugState, except: Option<&Thread>) {
        let except = except.map(|t| t.handle().raw());
        ignore_status(
            "SetAllThreadsDebugState",
            self.handle.raw().set_all_threads_debug_state(state, except),
        );
    }

    /// true if managed callbacks are queued for `thread` (or any thread if None)
    pub fn has_queued_callbacks(&self, thread: Option<&Thread>) -> bool {
        let thread = thread.map(|t| t.handle().raw());
        self.handle.raw().has_queued_callbacks(thread).unwrap_or(false)
    }

    pub fn thread(&self, thread_id: ThreadId) -> Option<Thread> {
        match self.handle.raw().thread(thread_id) {
            Ok(thread) => thread.map(|t| Thread::new(NativeHandle::new(t))),
            Err(hr) => {
                debug!("GetThread({}) failed: {}", thread_id, hr);
                None
            }
        }
    }

    pub fn thread_for_fiber_cookie(&self, cookie: u32) -> Option<Thread> {
        match self.handle.raw().thread_for_fiber_cookie(cookie) {
            Ok(thread) => thread.map(|t| Thread::new(NativeHandle::new(t))),
            Err(hr) => {
                debug!("ThreadForFiberCookie({:#x}) failed: {}", cookie, hr);
                None
            }
        }
    }

    /// true if the thread was suspended by the OS because the debugger stopped the process
    pub fn is_os_suspended(&self, thread_id: ThreadId) -> bool {
        self.handle.raw().is_os_suspended(thread_id).unwrap_or(false)
    }

    pub fn set_custom_notification_enabled(&self, class: &NativeHandle<dyn NativeClass>, enabled: bool) {
        match self.handle.probe(|p| p.as_process3()) {
            Some(p3) => ignore_status(
                "SetEnableCustomNotification",
                p3.set_enable_custom_notification(class.raw(), enabled),
            ),
            None => unsupported("SetEnableCustomNotification", CapabilityTier::Tier3),
        }
    }

    pub fn set_metadata_update_mode(&self, mode: MetadataUpdateMode) {
        match self.handle.probe(|p| p.as_process7()) {
            // Rejected with CORDBG_E_UNSUPPORTED by shim-based debuggers
            Some(p7) => ignore_status(
                "SetWriteableMetadataUpdateMode",
                p7.set_writeable_metadata_update_mode(mode),
            ),
            None => unsupported("SetWriteableMetadataUpdateMode", CapabilityTier::Tier7),
        }
    }

    pub fn enable_log_messages(&self, enabled: bool) {
        match self.handle.probe(|p| p.as_process8()) {
            Some(p8) => ignore_status("EnableLogMessages", p8.enable_log_messages(enabled)),
            None => unsupported("EnableLogMessages", CapabilityTier::Tier8),
        }
    }

    pub fn enable_exception_callbacks_outside_user_code(&self, enabled: bool) {
        match self.handle.probe(|p| p.as_process8()) {
            Some(p8) => ignore_status(
                "EnableExceptionCallbacksOutsideOfMyCode",
                p8.enable_exception_callbacks_outside_of_my_code(enabled),
            ),
            None => unsupported("EnableExceptionCallbacksOutsideOfMyCode", CapabilityTier::Tier8),
        }
    }

    pub fn enable_ngen_policy(&self, policy: NgenPolicy) {
        match self.handle.probe(|p| p.as_process5()) {
            Some(p5) => ignore_status("EnableNGENPolicy", p5.enable_ngen_policy(policy)),
            None => unsupported("EnableNGENPolicy", CapabilityTier::Tier5),
        }
    }

    pub fn terminate(&self, exit_code: i32) -> bool {
        self.handle.raw().terminate(exit_code as u32).is_success()
    }

    pub fn detach(&self) -> bool {
        self.handle.raw().detach().is_success()
    }

    pub fn is_transition_stub(&self, address: Address) -> bool {
        self.handle.raw().is_transition_stub(address).unwrap_or(false)
    }

    pub fn clear_current_exception(&self, thread_id: ThreadId) {
        ignore_status(
            "ClearCurrentException",
            self.handle.raw().clear_current_exception(thread_id),
        );
    }

    /// Convert an object address into a value. Needs interface tier 5.
    pub fn object_by_address(&self, address: Address) -> Option<Value> {
        let Some(p5) = self.handle.probe(|p| p.as_process5()) else {
            unsupported("GetObject", CapabilityTier::Tier5);
            return None;
        };
        match p5.object(address) {
            Ok(value) => value.map(|v| Value::new(NativeHandle::new(v))),
            Err(hr) => {
                debug!("GetObject({:#x}) failed: {}", address, hr);
                None
            }
        }
    }

    fn probe_tier2(&self, operation: &str) -> Option<&dyn crate::native::NativeProcess2> {
        let p2 = self.handle.probe(|p| p.as_process2());
        if p2.is_none() {
            unsupported(operation, CapabilityTier::Tier2);
        }
        p2
    }
}

impl fmt::Display for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Process] {} CLR v{} Flags={}",
            self.pid,
            self.clr_version(),
            self.desired_compiler_flags()
        )
    }
}

fn ignore_status(operation: &str, hr: HResult) {
    if hr.is_failure() {
        debug!("{} failed: {}", operation, hr);
    }
}

fn unsupported(operation: &str, tier: CapabilityTier) {
    trace!("{} needs interface tier {}; skipped", operation, tier as u8);
}
