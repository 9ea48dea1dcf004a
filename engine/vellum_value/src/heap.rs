//! Shared-ownership wrapper for heap-allocated value payloads.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Thread-safe, reference-counted payload of a heap [`Value`] variant.
///
/// Compiled node trees are shared read-only across concurrent renders, so
/// every heap payload reachable from a `Value` uses `Arc` internally.
/// `#[repr(transparent)]` keeps the wrapper layout-identical to `Arc<T>`.
///
/// [`Value`]: crate::Value
#[repr(transparent)]
pub struct Heap<T: ?Sized>(Arc<T>);

impl<T> Heap<T> {
    #[inline]
    pub fn new(value: T) -> Self {
        Heap(Arc::new(value))
    }
}

impl<T: ?Sized> Heap<T> {
    /// Identity comparison of the underlying allocations.
    #[inline]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl<T: ?Sized> Clone for Heap<T> {
    #[inline]
    fn clone(&self) -> Self {
        Heap(Arc::clone(&self.0))
    }
}

impl<T: ?Sized> Deref for Heap<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Heap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<T: ?Sized + PartialEq> PartialEq for Heap<T> {
    fn eq(&self, other: &Self) -> bool {
        *self.0 == *other.0
    }
}

impl<T> From<T> for Heap<T> {
    fn from(value: T) -> Self {
        Heap::new(value)
    }
}
