// Lazy iteration over native enumeration cursors

use crate::handle::NativeHandle;
use crate::native::NativeEnumBox;
use crate::status::S_OK;
use std::iter::FusedIterator;
use tracing::trace;

/// Finite, non-restartable iterator over a native cursor.
///
/// Materializes one view per step. The cursor is released as soon as it reports the
/// end, or when the iterator is dropped early.
pub struct NativeEnumIter<T: ?Sized, V> {
    cursor: Option<NativeEnumBox<T>>,
    wrap: fn(NativeHandle<T>) -> V,
}

impl<T: ?Sized, V> NativeEnumIter<T, V> {
    pub(crate) fn new(cursor: NativeEnumBox<T>, wrap: fn(NativeHandle<T>) -> V) -> Self {
        Self {
            cursor: Some(cursor),
            wrap,
        }
    }

    /// An iterator that yields nothing (used when the native enumeration fails)
    pub(crate) fn empty(wrap: fn(NativeHandle<T>) -> V) -> Self {
        Self { cursor: None, wrap }
    }
}

impl<T: ?Sized, V> Iterator for NativeEnumIter<T, V> {
    type Item = V;

    fn next(&mut self) -> Option<V> {
        let cursor = self.cursor.as_mut()?;
        match cursor.next() {
            (S_OK, Some(item)) => Some((self.wrap)(NativeHandle::new(item))),
            (hr, _) => {
                trace!("Native enumeration finished with {}", hr);
                self.cursor = None;
                None
            }
        }
    }
}

impl<T: ?Sized, V> FusedIterator for NativeEnumIter<T, V> {}
