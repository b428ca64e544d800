//! Versioned pointers over immutable heap objects.
//!
//! A `VPtr` cell holds the current version of an object. Objects are
//! deep-immutable from publication; mutation means publishing a new version.
//! Superseded versions stay readable until the GC gate has passed every
//! closure that may have observed them, which is why readers never lock.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::gc;

#[repr(transparent)]
pub struct VPtr<T> {
    ptr: AtomicPtr<T>,
}

impl<T> VPtr<T> {
    /// An initially empty cell, embedded in an owning structure.
    pub const fn new_null() -> Self {
        Self {
            ptr: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Heap cell seeded with a published payload. The cell is owned raw; it
    /// is reclaimed through [`VPtr::destroy`] or the owner's teardown.
    pub fn create(val: T) -> *const VPtr<T> {
        let obj = Box::into_raw(Box::new(val));
        Self::create_with(obj as *const T)
    }

    pub(crate) fn create_with(obj: *const T) -> *const VPtr<T> {
        Box::into_raw(Box::new(Self {
            ptr: AtomicPtr::new(obj as *mut T),
        }))
    }

    /// One-shot variant: the pointer is written once at construction and read
    /// thereafter without atomics.
    pub fn create_fixed(val: T) -> FixedPtr<T> {
        FixedPtr::new(Box::into_raw(Box::new(val)) as *const T)
    }

    /// Currently published version, or null before the first publication.
    pub fn load(&self) -> *const T {
        self.ptr.load(Ordering::Acquire)
    }

    /// Publish a new version and return the superseded pointer. The caller
    /// decides whether the old object is retired or stays reachable.
    pub fn reref(&self, obj: *const T) -> *const T {
        self.ptr.swap(obj as *mut T, Ordering::AcqRel)
    }

    /// Retire the cell itself through the calling worker's free-log.
    ///
    /// # Safety
    ///
    /// `cell` must have come from [`VPtr::create`] / [`VPtr::create_with`]
    /// and must not be reachable from any structure published after this
    /// call. The payload's retirement is the caller's responsibility.
    pub unsafe fn destroy(cell: *const VPtr<T>) {
        gc::defer_drop::<VPtr<T>>(cell);
    }
}

/// Write-once pointer: set at construction, read thereafter without atomics.
/// Null encodes the absent link at the end of a chain.
#[repr(transparent)]
pub struct FixedPtr<T> {
    ptr: *const T,
}

impl<T> Clone for FixedPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for FixedPtr<T> {}

impl<T> FixedPtr<T> {
    pub const fn null() -> Self {
        Self { ptr: ptr::null() }
    }

    pub fn new(ptr: *const T) -> Self {
        Self { ptr }
    }

    pub fn from_ref(r: Option<&T>) -> Self {
        Self {
            ptr: r.map_or(ptr::null(), |r| r as *const T),
        }
    }

    pub fn as_ptr(&self) -> *const T {
        self.ptr
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// The pointee outlives the borrow as long as the surrounding versioned
    /// structure's GC discipline is honored.
    pub fn get<'a>(&self) -> Option<&'a T> {
        unsafe { self.ptr.as_ref() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_sees_the_latest_publication() {
        let cell = unsafe { &*VPtr::create(3u64) };
        assert_eq!(unsafe { *cell.load() }, 3);

        let next = Box::into_raw(Box::new(4u64)) as *const u64;
        let prev = cell.reref(next);
        assert_eq!(unsafe { *prev }, 3);
        assert_eq!(unsafe { *cell.load() }, 4);

        unsafe {
            drop(Box::from_raw(prev as *mut u64));
        }
    }

    #[test]
    fn null_cells_read_as_absent() {
        let cell = VPtr::<u64>::new_null();
        assert!(cell.load().is_null());
    }

    #[test]
    fn fixed_pointers_read_without_cas() {
        let fixed = VPtr::create_fixed(9u32);
        assert!(!fixed.is_null());
        assert_eq!(fixed.get(), Some(&9));
        assert_eq!(FixedPtr::<u32>::null().get(), None);
    }
}
