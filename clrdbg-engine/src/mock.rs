// Scripted in-memory implementation of the native interface for tests

use crate::native::*;
use crate::status::*;
use crate::types::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("clrdbg_engine=trace")
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
pub struct MockProcessBuilder {
    pid: u32,
    tiers: HashSet<CapabilityTier>,
    version: ClrVersion,
    threads: Vec<Arc<MockThread>>,
    app_domains: Vec<Arc<MockAppDomain>>,
    objects: Vec<Arc<MockValue>>,
    memory_base: Address,
    memory: Vec<u8>,
    max_chunk: Option<usize>,
    partial_chunks: bool,
    fail_enumeration: bool,
    fail_everything: bool,
}

impl MockProcessBuilder {
    pub fn pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn tier(mut self, tier: CapabilityTier) -> Self {
        self.tiers.insert(tier);
        self
    }

    pub fn all_tiers(mut self) -> Self {
        self.tiers.extend([
            CapabilityTier::Tier2,
            CapabilityTier::Tier3,
            CapabilityTier::Tier5,
            CapabilityTier::Tier7,
            CapabilityTier::Tier8,
        ]);
        self
    }

    pub fn version(mut self, version: ClrVersion) -> Self {
        self.version = version;
        self
    }

    pub fn thread(mut self, thread: Arc<MockThread>) -> Self {
        self.threads.push(thread);
        self
    }

    pub fn app_domain(mut self, app_domain: Arc<MockAppDomain>) -> Self {
        self.app_domains.push(app_domain);
        self
    }

    pub fn object(mut self, object: Arc<MockValue>) -> Self {
        self.objects.push(object);
        self
    }

    pub fn memory(mut self, base: Address, bytes: &[u8]) -> Self {
        self.memory_base = base;
        self.memory = bytes.to_vec();
        self
    }

    /// Cap the number of bytes a single native read or write transfers
    pub fn max_chunk(mut self, max: usize) -> Self {
        self.max_chunk = Some(max);
        self
    }

    /// Reads cut short by `max_chunk` report ERROR_PARTIAL_COPY instead of S_OK
    pub fn partial_chunks(mut self) -> Self {
        self.partial_chunks = true;
        self
    }

    pub fn fail_enumeration(mut self) -> Self {
        self.fail_enumeration = true;
        self
    }

    /// Every base-tier query fails with E_FAIL
    pub fn fail_everything(mut self) -> Self {
        self.fail_everything = true;
        self
    }

    pub fn build(self) -> Arc<MockProcess> {
        Arc::new(MockProcess {
            pid: self.pid,
            tiers: self.tiers,
            version: self.version,
            threads: self.threads,
            app_domains: self.app_domains,
            objects: self.objects,
            memory_base: self.memory_base,
            memory: Mutex::new(self.memory),
            max_chunk: self.max_chunk,
            partial_chunks: self.partial_chunks,
            fail_enumeration: self.fail_enumeration,
            fail_everything: self.fail_everything,
            helper_thread_id: AtomicU32::new(0),
            running: AtomicBool::new(false),
            compiler_flags: Mutex::new(CompilerFlags::DEFAULT),
            calls: Mutex::new(Vec::new()),
            live_enumerators: Arc::new(AtomicU32::new(0)),
        })
    }
}

pub struct MockProcess {
    pid: u32,
    tiers: HashSet<CapabilityTier>,
    version: ClrVersion,
    threads: Vec<Arc<MockThread>>,
    app_domains: Vec<Arc<MockAppDomain>>,
    objects: Vec<Arc<MockValue>>,
    memory_base: Address,
    memory: Mutex<Vec<u8>>,
    max_chunk: Option<usize>,
    partial_chunks: bool,
    fail_enumeration: bool,
    fail_everything: bool,
    pub helper_thread_id: AtomicU32,
    pub running: AtomicBool,
    pub compiler_flags: Mutex<CompilerFlags>,
    calls: Mutex<Vec<String>>,
    live_enumerators: Arc<AtomicU32>,
}

impl MockProcess {
    pub fn builder() -> MockProcessBuilder {
        MockProcessBuilder::default()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    pub fn live_enumerators(&self) -> u32 {
        self.live_enumerators.load(Ordering::SeqCst)
    }

    pub fn memory_snapshot(&self) -> Vec<u8> {
        self.memory.lock().unwrap().clone()
    }

    fn base_status(&self) -> NativeResult<()> {
        if self.fail_everything {
            Err(E_FAIL)
        } else {
            Ok(())
        }
    }

    fn has(&self, tier: CapabilityTier) -> bool {
        self.tiers.contains(&tier)
    }

    fn find_thread(&self, thread_id: ThreadId) -> Option<Arc<dyn NativeThread>> {
        self.threads
            .iter()
            .find(|t| t.thread_id == thread_id)
            .map(|t| Arc::clone(t) as Arc<dyn NativeThread>)
    }

    // Offset and length of the backing store reachable from `address`
    fn region(&self, address: Address, len: usize) -> Option<(usize, usize)> {
        let offset = address.checked_sub(self.memory_base)? as usize;
        let size = self.memory.lock().unwrap().len();
        if offset >= size {
            return None;
        }
        let mut count = len.min(size - offset);
        if let Some(max) = self.max_chunk {
            count = count.min(max);
        }
        Some((offset, count))
    }
}

impl NativeProcess for MockProcess {
    fn id(&self) -> NativeResult<ProcessId> {
        self.base_status()?;
        Ok(self.pid)
    }

    fn helper_thread_id(&self) -> NativeResult<ThreadId> {
        self.record("helper_thread_id");
        self.base_status()?;
        Ok(self.helper_thread_id.load(Ordering::SeqCst))
    }

    fn is_running(&self) -> NativeResult<bool> {
        self.base_status()?;
        Ok(self.running.load(Ordering::SeqCst))
    }

    fn stop(&self, _timeout_ms: u32) -> HResult {
        self.record("stop");
        self.running.store(false, Ordering::SeqCst);
        S_OK
    }

    fn continue_(&self, _out_of_band: bool) -> HResult {
        self.record("continue");
        if self.fail_everything {
            return CORDBG_E_PROCESS_TERMINATED;
        }
        self.running.store(true, Ordering::SeqCst);
        S_OK
    }

    fn enumerate_threads(&self) -> NativeResult<NativeEnumBox<dyn NativeThread>> {
        if self.fail_enumeration || self.fail_everything {
            return Err(E_FAIL);
        }
        let items = self
            .threads
            .iter()
            .map(|t| Arc::clone(t) as Arc<dyn NativeThread>)
            .collect();
        Ok(Box::new(MockEnum::new(items, Arc::clone(&self.live_enumerators))))
    }

    fn enumerate_app_domains(&self) -> NativeResult<NativeEnumBox<dyn NativeAppDomain>> {
        if self.fail_enumeration || self.fail_everything {
            return Err(E_FAIL);
        }
        let items = self
            .app_domains
            .iter()
            .map(|a| Arc::clone(a) as Arc<dyn NativeAppDomain>)
            .collect();
        Ok(Box::new(MockEnum::new(items, Arc::clone(&self.live_enumerators))))
    }

    fn handle(&self) -> NativeResult<RawProcessHandle> {
        self.base_status()?;
        Ok(RawProcessHandle(0x1c4))
    }

    fn read_memory(&self, address: Address, buffer: &mut [u8]) -> Transfer {
        self.record("read_memory");
        if self.fail_everything {
            return Transfer::new(E_FAIL, 0);
        }
        match self.region(address, buffer.len()) {
            Some((offset, count)) => {
                let memory = self.memory.lock().unwrap();
                buffer[..count].copy_from_slice(&memory[offset..offset + count]);
                let end_of_region = offset + count == memory.len() && count < buffer.len();
                let short = self.partial_chunks && count < buffer.len();
                let status = if end_of_region || short { ERROR_PARTIAL_COPY } else { S_OK };
                Transfer::new(status, count)
            }
            None => Transfer::new(ERROR_PARTIAL_COPY, 0),
        }
    }

    fn write_memory(&self, address: Address, buffer: &[u8]) -> Transfer {
        self.record("write_memory");
        if self.fail_everything {
            return Transfer::new(E_FAIL, 0);
        }
        match self.region(address, buffer.len()) {
            Some((offset, count)) => {
                let mut memory = self.memory.lock().unwrap();
                memory[offset..offset + count].copy_from_slice(&buffer[..count]);
                let status = if count < buffer.len() { ERROR_PARTIAL_COPY } else { S_OK };
                Transfer::new(status, count)
            }
            None => Transfer::new(E_INVALIDARG, 0),
        }
    }

    fn set_all_threads_debug_state(
        &self,
        state: ThreadDebugState,
        except: Option<&Arc<dyn NativeThread>>,
    ) -> HResult {
        let except = except.and_then(|t| t.id().ok());
        self.record(&format!("set_all_threads_debug_state({:?}, {:?})", state, except));
        S_OK
    }

    fn has_queued_callbacks(&self, thread: Option<&Arc<dyn NativeThread>>) -> NativeResult<bool> {
        self.base_status()?;
        Ok(thread.is_none())
    }

    fn thread(&self, thread_id: ThreadId) -> NativeResult<Option<Arc<dyn NativeThread>>> {
        self.base_status()?;
        Ok(self.find_thread(thread_id))
    }

    fn thread_for_fiber_cookie(&self, cookie: u32) -> NativeResult<Option<Arc<dyn NativeThread>>> {
        self.base_status()?;
        // Fiber cookies map onto thread ids plus 0x1000 in the mock
        Ok(cookie.checked_sub(0x1000).and_then(|id| self.find_thread(id)))
    }

    fn is_os_suspended(&self, thread_id: ThreadId) -> NativeResult<bool> {
        self.base_status()?;
        Ok(self.find_thread(thread_id).is_some() && !self.running.load(Ordering::SeqCst))
    }

    fn is_transition_stub(&self, address: Address) -> NativeResult<bool> {
        self.base_status()?;
        Ok(address & 0xFFFF_0000 == 0x7FFE_0000)
    }

    fn clear_current_exception(&self, thread_id: ThreadId) -> HResult {
        self.record(&format!("clear_current_exception({})", thread_id));
        S_OK
    }

    fn terminate(&self, exit_code: u32) -> HResult {
        self.record(&format!("terminate({})", exit_code));
        if self.fail_everything {
            CORDBG_E_PROCESS_TERMINATED
        } else {
            S_OK
        }
    }

    fn detach(&self) -> HResult {
        self.record("detach");
        if self.fail_everything {
            CORDBG_E_PROCESS_NOT_SYNCHRONIZED
        } else {
            S_OK
        }
    }

    fn as_process2(&self) -> Option<&dyn NativeProcess2> {
        self.has(CapabilityTier::Tier2).then_some(self as &dyn NativeProcess2)
    }

    fn as_process3(&self) -> Option<&dyn NativeProcess3> {
        self.has(CapabilityTier::Tier3).then_some(self as &dyn NativeProcess3)
    }

    fn as_process5(&self) -> Option<&dyn NativeProcess5> {
        self.has(CapabilityTier::Tier5).then_some(self as &dyn NativeProcess5)
    }

    fn as_process7(&self) -> Option<&dyn NativeProcess7> {
        self.has(CapabilityTier::Tier7).then_some(self as &dyn NativeProcess7)
    }

    fn as_process8(&self) -> Option<&dyn NativeProcess8> {
        self.has(CapabilityTier::Tier8).then_some(self as &dyn NativeProcess8)
    }
}

impl NativeProcess2 for MockProcess {
    fn version(&self) -> NativeResult<ClrVersion> {
        Ok(self.version)
    }

    fn desired_ngen_compiler_flags(&self) -> NativeResult<CompilerFlags> {
        Ok(*self.compiler_flags.lock().unwrap())
    }

    fn set_desired_ngen_compiler_flags(&self, flags: CompilerFlags) -> HResult {
        self.record(&format!("set_desired_ngen_compiler_flags({})", flags));
        *self.compiler_flags.lock().unwrap() = flags;
        S_OK
    }
}

impl NativeProcess3 for MockProcess {
    fn set_enable_custom_notification(&self, class: &Arc<dyn NativeClass>, enable: bool) -> HResult {
        let token = class.token().unwrap_or(0);
        self.record(&format!("set_enable_custom_notification({:#x}, {})", token, enable));
        S_OK
    }
}

impl NativeProcess5 for MockProcess {
    fn enable_ngen_policy(&self, policy: NgenPolicy) -> HResult {
        self.record(&format!("enable_ngen_policy({:?})", policy));
        S_OK
    }

    fn object(&self, address: Address) -> NativeResult<Option<Arc<dyn NativeValue>>> {
        Ok(self
            .objects
            .iter()
            .find(|o| o.address().ok() == Some(address))
            .map(|o| Arc::clone(o) as Arc<dyn NativeValue>))
    }
}

impl NativeProcess7 for MockProcess {
    fn set_writeable_metadata_update_mode(&self, mode: MetadataUpdateMode) -> HResult {
        self.record(&format!("set_writeable_metadata_update_mode({:?})", mode));
        // Shim-based debuggers reject this; the controller must not care
        CORDBG_E_UNSUPPORTED
    }
}

impl NativeProcess8 for MockProcess {
    fn enable_exception_callbacks_outside_of_my_code(&self, enable: bool) -> HResult {
        self.record(&format!("enable_exception_callbacks_outside_of_my_code({})", enable));
        S_OK
    }

    fn enable_log_messages(&self, enable: bool) -> HResult {
        self.record(&format!("enable_log_messages({})", enable));
        S_OK
    }
}

pub struct MockEnum<T: ?Sized> {
    items: std::vec::IntoIter<Arc<T>>,
    live: Arc<AtomicU32>,
}

impl<T: ?Sized> MockEnum<T> {
    fn new(items: Vec<Arc<T>>, live: Arc<AtomicU32>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self {
            items: items.into_iter(),
            live,
        }
    }
}

impl<T: ?Sized + Send + Sync> NativeEnum<T> for MockEnum<T> {
    fn next(&mut self) -> (HResult, Option<Arc<T>>) {
        match self.items.next() {
            Some(item) => (S_OK, Some(item)),
            None => (S_FALSE, None),
        }
    }
}

impl<T: ?Sized> Drop for MockEnum<T> {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MockThread {
    pub thread_id: ThreadId,
    pub neutered: AtomicBool,
    pub exception: Mutex<Option<Arc<MockValue>>>,
    pub frame: Mutex<Option<Arc<MockFrame>>>,
}

impl MockThread {
    pub fn new(thread_id: ThreadId) -> Arc<Self> {
        Arc::new(Self {
            thread_id,
            neutered: AtomicBool::new(false),
            exception: Mutex::new(None),
            frame: Mutex::new(None),
        })
    }

    pub fn with_frame(thread_id: ThreadId, frame: Arc<MockFrame>) -> Arc<Self> {
        let thread = Self::new(thread_id);
        *thread.frame.lock().unwrap() = Some(frame);
        thread
    }

    pub fn set_exception(&self, exception: Option<Arc<MockValue>>) {
        *self.exception.lock().unwrap() = exception;
    }

    fn check(&self) -> NativeResult<()> {
        if self.neutered.load(Ordering::SeqCst) {
            Err(CORDBG_E_OBJECT_NEUTERED)
        } else {
            Ok(())
        }
    }
}

impl NativeThread for MockThread {
    fn id(&self) -> NativeResult<ThreadId> {
        self.check()?;
        Ok(self.thread_id)
    }

    fn current_exception(&self) -> NativeResult<Option<Arc<dyn NativeValue>>> {
        self.check()?;
        Ok(self
            .exception
            .lock()
            .unwrap()
            .clone()
            .map(|v| v as Arc<dyn NativeValue>))
    }

    fn active_frame(&self) -> NativeResult<Option<Arc<dyn NativeFrame>>> {
        self.check()?;
        Ok(self
            .frame
            .lock()
            .unwrap()
            .clone()
            .map(|f| f as Arc<dyn NativeFrame>))
    }
}

pub struct MockAppDomain {
    pub id: AppDomainId,
    pub name: String,
}

impl MockAppDomain {
    pub fn new(id: AppDomainId, name: &str) -> Arc<Self> {
        Arc::new(Self {
            id,
            name: name.to_string(),
        })
    }
}

impl NativeAppDomain for MockAppDomain {
    fn id(&self) -> NativeResult<AppDomainId> {
        Ok(self.id)
    }

    fn name(&self) -> NativeResult<String> {
        Ok(self.name.clone())
    }
}

pub struct MockClass(pub u32);

impl NativeClass for MockClass {
    fn token(&self) -> NativeResult<u32> {
        Ok(self.0)
    }
}

#[derive(Default)]
pub struct MockFrame {
    pub token: u32,
    pub locals: Vec<Arc<MockValue>>,
    pub arguments: Vec<Arc<MockValue>>,
    pub return_values: Option<Vec<(u32, Arc<MockValue>)>>,
}

impl NativeFrame for MockFrame {
    fn function_token(&self) -> NativeResult<u32> {
        Ok(self.token)
    }

    fn local(&self, index: u32) -> NativeResult<Option<Arc<dyn NativeValue>>> {
        Ok(self
            .locals
            .get(index as usize)
            .map(|v| Arc::clone(v) as Arc<dyn NativeValue>))
    }

    fn argument(&self, index: u32) -> NativeResult<Option<Arc<dyn NativeValue>>> {
        Ok(self
            .arguments
            .get(index as usize)
            .map(|v| Arc::clone(v) as Arc<dyn NativeValue>))
    }

    fn return_values(&self) -> NativeResult<Vec<(u32, Arc<dyn NativeValue>)>> {
        match &self.return_values {
            Some(values) => Ok(values
                .iter()
                .map(|(token, v)| (*token, Arc::clone(v) as Arc<dyn NativeValue>))
                .collect()),
            None => Err(E_NOTIMPL),
        }
    }
}

/// A value living at a (movable) address. Reference values may hand out strong handles.
pub struct MockValue {
    pub address: Arc<AtomicU64>,
    pub reference: bool,
    pub handles: bool,
}

impl MockValue {
    pub fn primitive(address: Address) -> Arc<Self> {
        Arc::new(Self {
            address: Arc::new(AtomicU64::new(address)),
            reference: false,
            handles: false,
        })
    }

    pub fn object(address: Address) -> Arc<Self> {
        Arc::new(Self {
            address: Arc::new(AtomicU64::new(address)),
            reference: true,
            handles: true,
        })
    }

    /// Simulates the GC relocating the object
    pub fn relocate(&self, address: Address) {
        self.address.store(address, Ordering::SeqCst);
    }
}

impl NativeValue for MockValue {
    fn address(&self) -> NativeResult<Address> {
        Ok(self.address.load(Ordering::SeqCst))
    }

    fn is_reference(&self) -> bool {
        self.reference
    }

    fn is_null(&self) -> NativeResult<bool> {
        Ok(self.reference && self.address.load(Ordering::SeqCst) == 0)
    }

    fn as_heap_value(&self) -> Option<&dyn NativeHeapValue> {
        self.handles.then_some(self as &dyn NativeHeapValue)
    }
}

impl NativeHeapValue for MockValue {
    fn create_strong_handle(&self) -> NativeResult<Arc<dyn NativeValue>> {
        // The handle shares the object's address cell so it follows relocations
        let target = Arc::new(MockValue {
            address: Arc::clone(&self.address),
            reference: true,
            handles: true,
        });
        Ok(Arc::new(MockStrongHandle { target }))
    }
}

pub struct MockStrongHandle {
    target: Arc<MockValue>,
}

impl NativeValue for MockStrongHandle {
    fn address(&self) -> NativeResult<Address> {
        self.target.address()
    }

    fn is_reference(&self) -> bool {
        true
    }

    fn dereference(&self) -> NativeResult<Arc<dyn NativeValue>> {
        Ok(Arc::clone(&self.target) as Arc<dyn NativeValue>)
    }
}
