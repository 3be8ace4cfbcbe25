// Runtime facade
//
// What the expression evaluator sees of one debuggee runtime: pseudo-variable aliases,
// frame slots and object ids. Every entry point asserts it runs on the dispatcher thread.

use crate::dispatcher::ThreadAffinity;
use crate::stackframe::StackFrame;
use crate::status::{EngineError, EngineResult, E_NOINTERFACE, E_NOTIMPL};
use crate::types::{Address, ClrVersion, ProcessId, ThreadId};
use crate::value::{EngineObjectId, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Which pseudo-variables an evaluation wants to see
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationOptions {
    pub exceptions: bool,
    pub return_values: bool,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            exceptions: true,
            return_values: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationContext {
    pub options: EvaluationOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AliasKind {
    Exception,
    ReturnValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasInfo {
    pub kind: AliasKind,
    pub name: String,
    pub id: Option<u32>,
}

impl AliasInfo {
    fn exception() -> Self {
        Self {
            kind: AliasKind::Exception,
            name: "$exception".to_string(),
            id: None,
        }
    }

    fn return_value(name: String, id: u32) -> Self {
        Self {
            kind: AliasKind::ReturnValue,
            name,
            id: Some(id),
        }
    }
}

#[derive(Debug)]
pub struct ExceptionInfo {
    pub thread_id: ThreadId,
    pub value: Value,
}

#[derive(Debug)]
pub struct ReturnValueInfo {
    /// 1-based, matching the `$ReturnValueN` alias
    pub id: u32,
    pub method_token: u32,
    pub value: Value,
}

/// Per-process runtime surface, registered by the engine when the process is created
#[derive(Debug)]
pub struct RuntimeFacade {
    affinity: ThreadAffinity,
    pid: ProcessId,
    version: ClrVersion,
    supports_object_ids: bool,
}

impl RuntimeFacade {
    pub fn new(affinity: ThreadAffinity, pid: ProcessId, version: ClrVersion, supports_object_ids: bool) -> Self {
        Self {
            affinity,
            pid,
            version,
            supports_object_ids,
        }
    }

    pub fn pid(&self) -> ProcessId {
        self.affinity.verify_access();
        self.pid
    }

    pub fn clr_version(&self) -> ClrVersion {
        self.affinity.verify_access();
        self.version
    }

    /// `$exception` when the frame's thread has an exception in flight, then one
    /// `$ReturnValueN` per return value and `$ReturnValue` for the most recent one
    pub fn get_aliases(
        &self,
        ctx: &EvaluationContext,
        frame: &StackFrame,
        cancel: &CancellationToken,
    ) -> EngineResult<Vec<AliasInfo>> {
        self.enter(cancel)?;
        let mut aliases = Vec::new();

        if ctx.options.exceptions && frame.thread().current_exception().is_some() {
            aliases.push(AliasInfo::exception());
        }
        checkpoint(cancel)?;

        if ctx.options.return_values {
            let count = frame.return_values().len() as u32;
            for id in 1..=count {
                aliases.push(AliasInfo::return_value(format!("$ReturnValue{}", id), id));
            }
            if count > 0 {
                aliases.push(AliasInfo::return_value("$ReturnValue".to_string(), count));
            }
        }
        Ok(aliases)
    }

    pub fn get_exceptions(
        &self,
        ctx: &EvaluationContext,
        frame: &StackFrame,
        cancel: &CancellationToken,
    ) -> EngineResult<Vec<ExceptionInfo>> {
        self.enter(cancel)?;
        if !ctx.options.exceptions {
            return Ok(Vec::new());
        }
        let thread = frame.thread();
        Ok(thread
            .current_exception()
            .map(|value| ExceptionInfo {
                thread_id: thread.thread_id(),
                value,
            })
            .into_iter()
            .collect())
    }

    /// Fails with NotImplemented when the runtime can't report return values at all,
    /// so callers can tell that apart from a call that returned nothing
    pub fn get_return_values(
        &self,
        ctx: &EvaluationContext,
        frame: &StackFrame,
        cancel: &CancellationToken,
    ) -> EngineResult<Vec<ReturnValueInfo>> {
        self.enter(cancel)?;
        if !ctx.options.return_values {
            return Ok(Vec::new());
        }
        let values = match frame.try_return_values() {
            Ok(values) => values,
            Err(hr) if hr == E_NOTIMPL || hr == E_NOINTERFACE => {
                return Err(EngineError::NotImplemented("GetReturnValues"))
            }
            Err(hr) => {
                debug!("Return values unavailable: {}", hr);
                return Ok(Vec::new());
            }
        };

        let mut infos = Vec::with_capacity(values.len());
        for (index, rv) in values.into_iter().enumerate() {
            checkpoint(cancel)?;
            infos.push(ReturnValueInfo {
                id: index as u32 + 1,
                method_token: rv.method_token,
                value: rv.value,
            });
        }
        Ok(infos)
    }

    pub fn get_local_value(
        &self,
        _ctx: &EvaluationContext,
        frame: &StackFrame,
        index: u32,
        cancel: &CancellationToken,
    ) -> EngineResult<Option<Value>> {
        self.enter(cancel)?;
        Ok(frame.local(index))
    }

    pub fn get_parameter_value(
        &self,
        _ctx: &EvaluationContext,
        frame: &StackFrame,
        index: u32,
        cancel: &CancellationToken,
    ) -> EngineResult<Option<Value>> {
        self.enter(cancel)?;
        Ok(frame.argument(index))
    }

    /// Gates every object-id operation below
    pub fn supports_object_ids(&self) -> bool {
        self.affinity.verify_access();
        self.supports_object_ids
    }

    /// A non-null reference to an object the runtime can pin with a strong handle
    pub fn can_create_object_id(&self, value: &Value) -> EngineResult<bool> {
        self.enter_object_ids()?;
        Ok(value.is_reference() && !value.is_null() && value.supports_strong_handles())
    }

    /// Mint an id for `value`. None if the value can't carry one.
    pub fn create_object_id(&self, value: &Value, id: u32) -> EngineResult<Option<EngineObjectId>> {
        if !self.can_create_object_id(value)? {
            return Ok(None);
        }
        Ok(value
            .create_strong_handle()
            .map(|handle| EngineObjectId::new(id, handle)))
    }

    /// true if `value` currently refers to the object tracked by `object_id`
    pub fn equals(&self, object_id: &EngineObjectId, value: &Value) -> EngineResult<bool> {
        self.enter_object_ids()?;
        if !value.is_reference() || value.is_null() {
            return Ok(false);
        }
        Ok(match (object_id.address(), value.address()) {
            (Some(tracked), Some(current)) => tracked == current,
            _ => false,
        })
    }

    pub fn object_id_hash(&self, object_id: &EngineObjectId) -> EngineResult<i32> {
        self.enter_object_ids()?;
        Ok(fold_address(object_id.address()))
    }

    /// Equal to `object_id_hash` of any id the value `equals`
    pub fn value_hash(&self, value: &Value) -> EngineResult<i32> {
        self.enter_object_ids()?;
        Ok(fold_address(value.address()))
    }

    /// Resolve an id back to a live value
    pub fn get_value(&self, object_id: &EngineObjectId, cancel: &CancellationToken) -> EngineResult<Option<Value>> {
        self.enter(cancel)?;
        if !self.supports_object_ids {
            return Err(EngineError::ObjectIdsUnsupported);
        }
        let value = Value::new(object_id.handle().add_ref());
        if value.is_null() {
            debug!("Object id {} no longer refers to an object", object_id.alias());
            return Ok(None);
        }
        Ok(Some(value))
    }

    #[track_caller]
    fn enter(&self, cancel: &CancellationToken) -> EngineResult<()> {
        self.affinity.verify_access();
        checkpoint(cancel)
    }

    #[track_caller]
    fn enter_object_ids(&self) -> EngineResult<()> {
        self.affinity.verify_access();
        if self.supports_object_ids {
            Ok(())
        } else {
            Err(EngineError::ObjectIdsUnsupported)
        }
    }
}

impl fmt::Display for RuntimeFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Runtime] {} CLR v{}", self.pid, self.version)
    }
}

fn checkpoint(cancel: &CancellationToken) -> EngineResult<()> {
    if cancel.is_cancelled() {
        Err(EngineError::Cancelled)
    } else {
        Ok(())
    }
}

fn fold_address(address: Option<Address>) -> i32 {
    let address = address.unwrap_or(0);
    ((address as u32) ^ ((address >> 32) as u32)) as i32
}
