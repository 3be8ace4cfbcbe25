// Engine type definitions
//
// Plain data shared between the native interface and the controller

use serde::{Deserialize, Serialize};
use std::fmt;

pub type ProcessId = u32;
pub type ThreadId = u32;
pub type AppDomainId = u32;
pub type Address = u64;

/// Version of the targeted managed runtime. All-zero when unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClrVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub sub_build: u32,
}

impl ClrVersion {
    pub const ZERO: ClrVersion = ClrVersion::new(0, 0, 0, 0);

    pub const fn new(major: u32, minor: u32, build: u32, sub_build: u32) -> Self {
        Self {
            major,
            minor,
            build,
            sub_build,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for ClrVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.build, self.sub_build)
    }
}

// Revisions of the native process interface. Each adds operations to the ones below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CapabilityTier {
    Base = 1,
    Tier2 = 2,
    Tier3 = 3,
    Tier5 = 5,
    Tier7 = 7,
    Tier8 = 8,
}

// JIT compiler flags requested for a process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompilerFlags(pub u32);

impl CompilerFlags {
    pub const DEFAULT: CompilerFlags = CompilerFlags(0);
    pub const TRACK_JIT_INFO: CompilerFlags = CompilerFlags(0x1);
    pub const IGNORE_PDBS: CompilerFlags = CompilerFlags(0x2);
    pub const DISABLE_OPTIMIZATIONS: CompilerFlags = CompilerFlags(0x3);
    pub const ENABLE_REMAP: CompilerFlags = CompilerFlags(0x4);

    pub fn contains(self, other: CompilerFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl fmt::Display for CompilerFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum ThreadDebugState {
    Run = 0,
    Suspend = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum NgenPolicy {
    DisableLocalNic = 1,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum MetadataUpdateMode {
    #[default]
    LegacyCompatPolicy = 0,
    AlwaysShowUpdates = 1,
}

/// OS handle of the debuggee. Owned by the native debugging layer, never closed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawProcessHandle(pub usize);
