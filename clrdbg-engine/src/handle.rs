// Ownership wrapper for native interface references

use crate::native::NativeProcess;
use crate::types::CapabilityTier;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::trace;

/// Owns exactly one reference to a native object.
///
/// Equality and hashing use the identity of the native object, not of the wrapper,
/// so two handles adopted from the same native object are interchangeable as map
/// keys. The reference is released once, when the handle is dropped.
pub struct NativeHandle<T: ?Sized> {
    raw: Arc<T>,
}

impl<T: ?Sized> NativeHandle<T> {
    /// Adopt a native reference
    pub fn new(raw: Arc<T>) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> &Arc<T> {
        &self.raw
    }

    /// Address of the native object
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.raw) as *const () as usize
    }

    /// Look for a higher capability facet. Never fails; None means unsupported.
    pub fn probe<'a, U: ?Sized>(&'a self, query: impl FnOnce(&'a T) -> Option<&'a U>) -> Option<&'a U> {
        query(&*self.raw)
    }

    /// Take an additional reference to the same native object
    pub(crate) fn add_ref(&self) -> Self {
        Self::new(Arc::clone(&self.raw))
    }
}

impl NativeHandle<dyn NativeProcess> {
    pub fn supports(&self, tier: CapabilityTier) -> bool {
        let raw = &self.raw;
        match tier {
            CapabilityTier::Base => true,
            CapabilityTier::Tier2 => raw.as_process2().is_some(),
            CapabilityTier::Tier3 => raw.as_process3().is_some(),
            CapabilityTier::Tier5 => raw.as_process5().is_some(),
            CapabilityTier::Tier7 => raw.as_process7().is_some(),
            CapabilityTier::Tier8 => raw.as_process8().is_some(),
        }
    }
}

impl<T: ?Sized> PartialEq for NativeHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl<T: ?Sized> Eq for NativeHandle<T> {}

impl<T: ?Sized> Hash for NativeHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl<T: ?Sized> fmt::Debug for NativeHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeHandle({:#x})", self.identity())
    }
}

impl<T: ?Sized> Drop for NativeHandle<T> {
    fn drop(&mut self) {
        trace!("Releasing native reference {:#x}", self.identity());
    }
}
