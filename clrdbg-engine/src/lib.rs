// Process control engine for managed-runtime debugging
//
// Sits on top of a versioned native debugging interface and provides:
// - Ownership of native references
// - Process control with capability-tiered degradation
// - A single-threaded dispatcher for callbacks and commands
// - The runtime surface used by expression evaluation

pub mod status;
pub mod types;
pub mod native;
pub mod handle;
pub mod enumerator;
pub mod process;
pub mod thread;
pub mod appdomain;
pub mod stackframe;
pub mod value;
pub mod callbacks;
pub mod dispatcher;
pub mod runtime;
pub mod engine;
pub mod config;

#[cfg(test)]
mod mock;

pub use callbacks::{DebugCallback, EngineEvent, PauseReason};
pub use config::EngineConfig;
pub use dispatcher::{Dispatcher, DispatcherHandle, DispatcherState, ThreadAffinity};
pub use engine::{start_engine, Engine};
pub use handle::NativeHandle;
pub use process::Process;
pub use runtime::RuntimeFacade;
pub use status::{EngineError, EngineResult, HResult};
