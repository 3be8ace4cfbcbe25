// AppDomain views

use crate::handle::NativeHandle;
use crate::native::NativeAppDomain;
use crate::types::AppDomainId;
use std::fmt;

#[derive(Debug, PartialEq, Eq, Hash)]
pub struct AppDomain {
    handle: NativeHandle<dyn NativeAppDomain>,
}

impl AppDomain {
    pub fn new(handle: NativeHandle<dyn NativeAppDomain>) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &NativeHandle<dyn NativeAppDomain> {
        &self.handle
    }

    pub fn id(&self) -> AppDomainId {
        self.handle.raw().id().unwrap_or(0)
    }

    pub fn name(&self) -> String {
        self.handle.raw().name().unwrap_or_default()
    }
}

impl fmt::Display for AppDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[AppDomain] {} {}", self.id(), self.name())
    }
}
