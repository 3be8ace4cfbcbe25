// Native status codes and engine errors
//
// Every native call reports an HRESULT-style status. Failures of optional calls are
// swallowed at the call site; only control operations surface an EngineError.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Result of a native call that produces a value
pub type NativeResult<T> = Result<T, HResult>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{operation} failed: {hr}")]
    Native { operation: &'static str, hr: HResult },

    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("No process with pid {0}")]
    ProcessNotFound(u32),

    #[error("Dispatcher shut down")]
    DispatcherClosed,

    #[error("Object ids are not supported by this runtime")]
    ObjectIdsUnsupported,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub(crate) fn native(operation: &'static str, hr: HResult) -> Self {
        EngineError::Native { operation, hr }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HResult(pub i32);

// Codes above 0x7FFFFFFF are written as their unsigned hex and reinterpreted.
const fn hr(code: u32) -> HResult {
    HResult(code as i32)
}

pub const S_OK: HResult = hr(0);
pub const S_FALSE: HResult = hr(1);
pub const E_NOTIMPL: HResult = hr(0x8000_4001);
pub const E_NOINTERFACE: HResult = hr(0x8000_4002);
pub const E_FAIL: HResult = hr(0x8000_4005);
pub const E_INVALIDARG: HResult = hr(0x8007_0057);
pub const ERROR_PARTIAL_COPY: HResult = hr(0x8007_012B);
pub const CORDBG_E_PROCESS_TERMINATED: HResult = hr(0x8013_1301);
pub const CORDBG_E_PROCESS_NOT_SYNCHRONIZED: HResult = hr(0x8013_1302);
pub const CORDBG_E_OBJECT_NEUTERED: HResult = hr(0x8013_134F);
pub const CORDBG_E_UNSUPPORTED: HResult = hr(0x8013_1C4E);

impl HResult {
    /// Non-negative codes are successes (including S_FALSE)
    pub fn is_success(self) -> bool {
        self.0 >= 0
    }

    pub fn is_failure(self) -> bool {
        self.0 < 0
    }

    /// Converts a bare status into a `NativeResult`
    pub fn check(self) -> NativeResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            S_OK => "S_OK",
            S_FALSE => "S_FALSE",
            E_NOTIMPL => "E_NOTIMPL",
            E_NOINTERFACE => "E_NOINTERFACE",
            E_FAIL => "E_FAIL",
            E_INVALIDARG => "E_INVALIDARG",
            ERROR_PARTIAL_COPY => "ERROR_PARTIAL_COPY",
            CORDBG_E_PROCESS_TERMINATED => "CORDBG_E_PROCESS_TERMINATED",
            CORDBG_E_PROCESS_NOT_SYNCHRONIZED => "CORDBG_E_PROCESS_NOT_SYNCHRONIZED",
            CORDBG_E_OBJECT_NEUTERED => "CORDBG_E_OBJECT_NEUTERED",
            CORDBG_E_UNSUPPORTED => "CORDBG_E_UNSUPPORTED",
            _ => "UNKNOWN",
        }
    }
}

impl fmt::Display for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X} ({})", self.0 as u32, self.name())
    }
}
