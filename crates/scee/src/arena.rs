//! Thread-local bump arena for short-lived per-closure allocations.
//!
//! The region is reset at the start of every closure (log open on the
//! application side, record open on the validator side). Nothing allocated
//! from it may outlive the closure that allocated it. Requests that do not
//! fit the remaining region spill to the global allocator and are freed at
//! the next reset, so exhaustion degrades to malloc traffic instead of
//! failing the closure.

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;

pub const BULK_BUFFER_SIZE: usize = 64 * 1024;
const BULK_BUFFER_ALIGN: usize = 64;

struct BulkBuffer {
    base: *mut u8,
    cursor: usize,
    overflow: Vec<(*mut u8, Layout)>,
}

impl BulkBuffer {
    fn ensure(&mut self) {
        if !self.base.is_null() {
            return;
        }
        let layout = unsafe { Layout::from_size_align_unchecked(BULK_BUFFER_SIZE, BULK_BUFFER_ALIGN) };
        let base = unsafe { alloc(layout) };
        if base.is_null() {
            handle_alloc_error(layout);
        }
        self.base = base;
    }

    fn bump(&mut self, size: usize, align: usize) -> *mut u8 {
        self.ensure();
        let at = (self.cursor + align - 1) & !(align - 1);
        if at + size > BULK_BUFFER_SIZE {
            return self.spill(size, align);
        }
        self.cursor = at + size;
        unsafe { self.base.add(at) }
    }

    fn spill(&mut self, size: usize, align: usize) -> *mut u8 {
        let layout = unsafe { Layout::from_size_align_unchecked(size, align) };
        let ptr = unsafe { alloc(layout) };
        if ptr.is_null() {
            handle_alloc_error(layout);
        }
        tracing::trace!(size, "bulk buffer spill");
        self.overflow.push((ptr, layout));
        ptr
    }

    fn reset(&mut self) {
        self.cursor = 0;
        for (ptr, layout) in self.overflow.drain(..) {
            unsafe { dealloc(ptr, layout) };
        }
    }
}

impl Drop for BulkBuffer {
    fn drop(&mut self) {
        self.reset();
        if !self.base.is_null() {
            let layout = unsafe { Layout::from_size_align_unchecked(BULK_BUFFER_SIZE, BULK_BUFFER_ALIGN) };
            unsafe { dealloc(self.base, layout) };
        }
    }
}

thread_local! {
    static BULK: UnsafeCell<BulkBuffer> = UnsafeCell::new(BulkBuffer {
        base: ptr::null_mut(),
        cursor: 0,
        overflow: Vec::new(),
    });
}

/// Discard everything allocated since the last reset.
pub fn reset_bulk_buffer() {
    BULK.with(|b| unsafe { &mut *b.get() }.reset());
}

/// Carve an uninitialized slice out of the current closure's bump region.
///
/// The slice is invalidated by the next [`reset_bulk_buffer`]; callers must
/// not let it escape the closure.
pub fn bulk_alloc_slice<'a, T>(len: usize) -> &'a mut [MaybeUninit<T>] {
    const { assert!(std::mem::align_of::<T>() <= BULK_BUFFER_ALIGN) };
    BULK.with(|b| {
        let buf = unsafe { &mut *b.get() };
        let ptr = buf.bump(len * std::mem::size_of::<T>(), std::mem::align_of::<T>());
        unsafe { std::slice::from_raw_parts_mut(ptr as *mut MaybeUninit<T>, len) }
    })
}
