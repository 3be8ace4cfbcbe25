// Engine configuration
//
// Loaded from JSON. Every field has a default, so an empty object is a valid config.

use crate::status::{EngineError, EngineResult};
use crate::types::{CompilerFlags, MetadataUpdateMode, NgenPolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name of the dispatcher thread
    pub thread_name: String,
    /// Capacity of the dispatcher queue shared by commands and callbacks
    pub queue_capacity: usize,
    /// Capacity of the event channel to the embedder
    pub event_capacity: usize,
    pub stop_timeout_ms: u32,
    /// Applied to every new process while its creation callback is handled
    pub desired_compiler_flags: Option<CompilerFlags>,
    pub ngen_policy: Option<NgenPolicy>,
    pub metadata_update_mode: Option<MetadataUpdateMode>,
    pub exception_callbacks_outside_user_code: Option<bool>,
    pub log_messages: Option<bool>,
    pub object_ids: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thread_name: "clrdbg-engine".to_string(),
            queue_capacity: 32,
            event_capacity: 256,
            stop_timeout_ms: 5000,
            desired_compiler_flags: None,
            ngen_policy: None,
            metadata_update_mode: None,
            exception_callbacks_outside_user_code: None,
            log_messages: None,
            object_ids: true,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(content: &str) -> EngineResult<Self> {
        let config: EngineConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.thread_name.trim().is_empty() {
            return Err(EngineError::Config("thread_name cannot be empty".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(EngineError::Config("queue_capacity must be at least 1".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(EngineError::Config("event_capacity must be at least 1".to_string()));
        }
        if self.stop_timeout_ms == 0 {
            return Err(EngineError::Config("stop_timeout_ms must be positive".to_string()));
        }
        Ok(())
    }
}
