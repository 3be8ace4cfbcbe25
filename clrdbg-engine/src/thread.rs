// Thread views
//
// The native side owns threads. A view may stop working after the process is
// continued; callers must not keep one across a continue.

use crate::handle::NativeHandle;
use crate::native::NativeThread;
use crate::stackframe::StackFrame;
use crate::types::ThreadId;
use crate::value::Value;
use std::fmt;
use tracing::debug;

#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Thread {
    handle: NativeHandle<dyn NativeThread>,
}

impl Thread {
    pub fn new(handle: NativeHandle<dyn NativeThread>) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &NativeHandle<dyn NativeThread> {
        &self.handle
    }

    /// Native thread id, 0 if the thread is gone
    pub fn thread_id(&self) -> ThreadId {
        self.handle.raw().id().unwrap_or(0)
    }

    /// Exception currently in flight on this thread
    pub fn current_exception(&self) -> Option<Value> {
        match self.handle.raw().current_exception() {
            Ok(value) => value.map(|v| Value::new(NativeHandle::new(v))),
            Err(hr) => {
                debug!("GetCurrentException failed: {}", hr);
                None
            }
        }
    }

    pub fn active_frame(&self) -> Option<StackFrame> {
        match self.handle.raw().active_frame() {
            Ok(frame) => frame.map(|f| StackFrame::new(Thread::new(self.handle.add_ref()), NativeHandle::new(f))),
            Err(hr) => {
                debug!("GetActiveFrame failed: {}", hr);
                None
            }
        }
    }
}

impl fmt::Display for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Thread] TID={}", self.thread_id())
    }
}
