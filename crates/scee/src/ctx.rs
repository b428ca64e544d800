//! Execution contexts: the application side records, the validator replays.
//!
//! Checked closures are written once, generically over [`Ctx`], and
//! instantiated twice. Under [`AppCtx`] every non-deterministic primitive
//! (an atomic load, a fresh allocation's address, an external read) is
//! appended to the invocation log. Under [`ValCtx`] the same call sites fetch
//! the recorded value instead, and everything the application published is
//! byte-compared against the validator's recomputation.

use parking_lot::{Mutex, MutexGuard};

use crate::error::fatal;
use crate::gc;
use crate::log::LogReader;
use crate::plain::Plain;
use crate::thread::append_raw;
use crate::vptr::{FixedPtr, VPtr};

pub trait Ctx {
    /// Read a versioned cell. The observed pointer crosses the log.
    fn load<'a, T>(&mut self, cell: &'a VPtr<T>) -> Option<&'a T>;

    /// Allocate an immutable object. The validator re-derives the contents
    /// and byte-compares them against what the application published.
    fn new_obj<T: Plain>(&mut self, val: T) -> FixedPtr<T>;

    /// Allocate a fresh versioned cell seeded with `val`.
    fn new_cell<T: Plain>(&mut self, val: T) -> FixedPtr<VPtr<T>>;

    /// Publish `head` into `cell` without retiring the previous object
    /// (the previous object stays reachable, as in a list prepend).
    fn publish<T>(&mut self, cell: &VPtr<T>, head: FixedPtr<T>);

    /// Copy-on-write update: publish a new version and retire the previous
    /// one through the free-log.
    fn replace<T: Plain>(&mut self, cell: &VPtr<T>, val: T);

    /// Retire an object that a publication just made unreachable.
    fn retire_obj<T: Plain>(&mut self, obj: FixedPtr<T>);

    /// Retire a value cell together with its current payload.
    fn retire_cell<T: Plain>(&mut self, cell: FixedPtr<VPtr<T>>);

    /// Cross-check a value the closure derived from engine-external state
    /// that the validator can recompute.
    fn observe<T: Plain>(&mut self, val: T) -> T;

    /// Pull a value from outside the closure boundary. `read` runs only on
    /// the application side; the validator replays the recorded bytes.
    fn input<T: Plain>(&mut self, read: impl FnOnce() -> T) -> T;

    /// Writer serialization. Real on the application side, a no-op for the
    /// validator, which replays a serialized history.
    fn lock<'a>(&mut self, lock: &'a Mutex<()>) -> Option<MutexGuard<'a, ()>>;
}

/// Application-side context; appends to the calling worker's current log.
pub struct AppCtx {
    _priv: (),
}

impl AppCtx {
    pub(crate) fn new() -> Self {
        Self { _priv: () }
    }
}

impl Ctx for AppCtx {
    fn load<'a, T>(&mut self, cell: &'a VPtr<T>) -> Option<&'a T> {
        let ptr = cell.load();
        append_raw(ptr);
        // Kept alive by the free-log gate until this record retires.
        unsafe { ptr.as_ref() }
    }

    fn new_obj<T: Plain>(&mut self, val: T) -> FixedPtr<T> {
        let ptr = Box::into_raw(Box::new(val)) as *const T;
        append_raw(ptr);
        FixedPtr::new(ptr)
    }

    fn new_cell<T: Plain>(&mut self, val: T) -> FixedPtr<VPtr<T>> {
        let payload = Box::into_raw(Box::new(val)) as *const T;
        let cell = VPtr::create_with(payload);
        append_raw(cell);
        append_raw(payload);
        FixedPtr::new(cell)
    }

    fn publish<T>(&mut self, cell: &VPtr<T>, head: FixedPtr<T>) {
        cell.reref(head.as_ptr());
    }

    fn replace<T: Plain>(&mut self, cell: &VPtr<T>, val: T) {
        let next = Box::into_raw(Box::new(val)) as *const T;
        append_raw(next);
        let prev = cell.reref(next);
        if !prev.is_null() {
            gc::defer_drop(prev);
        }
    }

    fn retire_obj<T: Plain>(&mut self, obj: FixedPtr<T>) {
        if !obj.is_null() {
            gc::defer_drop(obj.as_ptr());
        }
    }

    fn retire_cell<T: Plain>(&mut self, cell: FixedPtr<VPtr<T>>) {
        let cell_ptr = cell.as_ptr();
        if cell_ptr.is_null() {
            return;
        }
        let payload = unsafe { (*cell_ptr).load() };
        if !payload.is_null() {
            gc::defer_drop(payload);
        }
        gc::defer_drop(cell_ptr);
    }

    fn observe<T: Plain>(&mut self, val: T) -> T {
        append_raw(val);
        val
    }

    fn input<T: Plain>(&mut self, read: impl FnOnce() -> T) -> T {
        let val = read();
        append_raw(val);
        val
    }

    fn lock<'a>(&mut self, lock: &'a Mutex<()>) -> Option<MutexGuard<'a, ()>> {
        Some(lock.lock())
    }
}

/// Validator-side context; replays the record positionally.
pub struct ValCtx<'r> {
    reader: &'r mut LogReader,
}

impl<'r> ValCtx<'r> {
    pub(crate) fn new(reader: &'r mut LogReader) -> Self {
        Self { reader }
    }
}

fn check_published<T: Plain>(ptr: *const T, expected: &T) {
    if ptr.is_null() {
        fatal!("validation mismatch: application published a null object");
    }
    let size = std::mem::size_of::<T>();
    let same = unsafe {
        std::slice::from_raw_parts(ptr as *const u8, size)
            == std::slice::from_raw_parts(expected as *const T as *const u8, size)
    };
    if !same {
        fatal!("validation mismatch: published object differs from recomputation");
    }
}

impl Ctx for ValCtx<'_> {
    fn load<'a, T>(&mut self, _cell: &'a VPtr<T>) -> Option<&'a T> {
        let ptr: *const T = self.reader.fetch();
        unsafe { ptr.as_ref() }
    }

    fn new_obj<T: Plain>(&mut self, val: T) -> FixedPtr<T> {
        let ptr: *const T = self.reader.fetch();
        check_published(ptr, &val);
        FixedPtr::new(ptr)
    }

    fn new_cell<T: Plain>(&mut self, val: T) -> FixedPtr<VPtr<T>> {
        let cell: *const VPtr<T> = self.reader.fetch();
        let payload: *const T = self.reader.fetch();
        check_published(payload, &val);
        FixedPtr::new(cell)
    }

    fn publish<T>(&mut self, _cell: &VPtr<T>, _head: FixedPtr<T>) {}

    fn replace<T: Plain>(&mut self, _cell: &VPtr<T>, val: T) {
        let next: *const T = self.reader.fetch();
        check_published(next, &val);
    }

    fn retire_obj<T: Plain>(&mut self, _obj: FixedPtr<T>) {}

    fn retire_cell<T: Plain>(&mut self, _cell: FixedPtr<VPtr<T>>) {}

    fn observe<T: Plain>(&mut self, val: T) -> T {
        self.reader.cmp(&val);
        val
    }

    fn input<T: Plain>(&mut self, _read: impl FnOnce() -> T) -> T {
        self.reader.fetch()
    }

    fn lock<'a>(&mut self, _lock: &'a Mutex<()>) -> Option<MutexGuard<'a, ()>> {
        None
    }
}
