// Runtime value views and object ids

use crate::handle::NativeHandle;
use crate::native::NativeValue;
use crate::types::Address;
use serde::Serialize;
use std::fmt;
use tracing::debug;

#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Value {
    handle: NativeHandle<dyn NativeValue>,
}

impl Value {
    pub fn new(handle: NativeHandle<dyn NativeValue>) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &NativeHandle<dyn NativeValue> {
        &self.handle
    }

    /// Address of the denoted object
    pub fn address(&self) -> Option<Address> {
        self.handle.raw().address().ok()
    }

    pub fn is_reference(&self) -> bool {
        self.handle.raw().is_reference()
    }

    /// A value whose nullness can't be determined is treated as null
    pub fn is_null(&self) -> bool {
        self.handle.raw().is_null().unwrap_or(true)
    }

    pub fn dereference(&self) -> Option<Value> {
        match self.handle.raw().dereference() {
            Ok(v) => Some(Value::new(NativeHandle::new(v))),
            Err(hr) => {
                debug!("Dereference failed: {}", hr);
                None
            }
        }
    }

    pub(crate) fn supports_strong_handles(&self) -> bool {
        self.handle.probe(|v| v.as_heap_value()).is_some()
    }

    pub(crate) fn create_strong_handle(&self) -> Option<NativeHandle<dyn NativeValue>> {
        let heap = self.handle.probe(|v| v.as_heap_value())?;
        match heap.create_strong_handle() {
            Ok(handle) => Some(NativeHandle::new(handle)),
            Err(hr) => {
                debug!("CreateHandle failed: {}", hr);
                None
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address() {
            Some(_) if self.is_reference() && self.is_null() => write!(f, "null"),
            Some(address) => write!(f, "@{:x}", address),
            None => write!(f, "<unavailable>"),
        }
    }
}

/// Identifier minted for a runtime object. Holds a strong handle so the object can
/// still be found after the process is continued.
#[derive(Debug)]
pub struct EngineObjectId {
    id: u32,
    handle: NativeHandle<dyn NativeValue>,
}

impl EngineObjectId {
    pub(crate) fn new(id: u32, handle: NativeHandle<dyn NativeValue>) -> Self {
        Self { id, handle }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn handle(&self) -> &NativeHandle<dyn NativeValue> {
        &self.handle
    }

    /// Current address of the tracked object
    pub fn address(&self) -> Option<Address> {
        self.handle.raw().address().ok()
    }

    pub fn alias(&self) -> String {
        format!("${}", self.id)
    }
}

/// Serializable snapshot of an object id, for handing to the evaluator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectIdInfo {
    pub id: u32,
    pub alias: String,
    pub address: Option<Address>,
}

impl From<&EngineObjectId> for ObjectIdInfo {
    fn from(object_id: &EngineObjectId) -> Self {
        Self {
            id: object_id.id(),
            alias: object_id.alias(),
            address: object_id.address(),
        }
    }
}
