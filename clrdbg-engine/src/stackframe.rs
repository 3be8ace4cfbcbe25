// Stack frame views
//
// Locals, arguments and return values of one frame of a stopped thread

use crate::handle::NativeHandle;
use crate::native::{NativeFrame, NativeValue};
use crate::status::NativeResult;
use crate::thread::Thread;
use crate::types::ThreadId;
use crate::value::Value;
use std::sync::Arc;
use tracing::debug;

/// Return value of a call that just completed in a frame
#[derive(Debug)]
pub struct ReturnValue {
    pub method_token: u32,
    pub value: Value,
}

#[derive(Debug)]
pub struct StackFrame {
    thread: Thread,
    handle: NativeHandle<dyn NativeFrame>,
}

impl StackFrame {
    pub fn new(thread: Thread, handle: NativeHandle<dyn NativeFrame>) -> Self {
        Self { thread, handle }
    }

    /// Thread the frame belongs to
    pub fn thread(&self) -> &Thread {
        &self.thread
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread.thread_id()
    }

    pub fn function_token(&self) -> Option<u32> {
        self.handle.raw().function_token().ok()
    }

    pub fn local(&self, index: u32) -> Option<Value> {
        wrap_slot("GetLocalVariable", index, self.handle.raw().local(index))
    }

    pub fn argument(&self, index: u32) -> Option<Value> {
        wrap_slot("GetArgument", index, self.handle.raw().argument(index))
    }

    /// Empty when the runtime can't report return values
    pub fn return_values(&self) -> Vec<ReturnValue> {
        self.try_return_values().unwrap_or_else(|hr| {
            debug!("Return values unavailable: {}", hr);
            Vec::new()
        })
    }

    pub(crate) fn try_return_values(&self) -> NativeResult<Vec<ReturnValue>> {
        let values = self.handle.raw().return_values()?;
        Ok(values
            .into_iter()
            .map(|(method_token, value)| ReturnValue {
                method_token,
                value: Value::new(NativeHandle::new(value)),
            })
            .collect())
    }
}

fn wrap_slot(
    operation: &str,
    index: u32,
    result: NativeResult<Option<Arc<dyn NativeValue>>>,
) -> Option<Value> {
    match result {
        Ok(value) => value.map(|v| Value::new(NativeHandle::new(v))),
        Err(hr) => {
            debug!("{}({}) failed: {}", operation, index, hr);
            None
        }
    }
}
