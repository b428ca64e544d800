//! GC epochs and deferred reclamation of versioned objects.
//!
//! Every closure is stamped with a fresh epoch at log open. A superseded
//! object is tagged with the latest assigned epoch at the moment it is
//! retired: any closure that could have observed the old version must have
//! started at or before that point. The object is freed once the gate (the
//! contiguous prefix of fully retired epochs) passes its tag.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::LazyLock;

use parking_lot::Mutex;

use crate::thread::with_worker;

/// Bound on closures that are started but not yet retired, across all
/// workers. Sized well above the per-worker queue capacity.
const START_LOG_SLOTS: usize = 1 << 16;

/// Process-wide closure start log.
pub(crate) struct ClosureStartLog {
    next: AtomicU64,
    gate: AtomicU64,
    retired: Box<[AtomicBool]>,
    advance: Mutex<()>,
}

pub(crate) static START_LOG: LazyLock<ClosureStartLog> = LazyLock::new(|| ClosureStartLog {
    next: AtomicU64::new(0),
    gate: AtomicU64::new(0),
    retired: (0..START_LOG_SLOTS).map(|_| AtomicBool::new(false)).collect(),
    advance: Mutex::new(()),
});

impl ClosureStartLog {
    /// Assign the epoch for a closure that is about to run.
    pub fn new_closure(&self) -> u64 {
        let epoch = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        // The ring slot must have been vacated by epoch - SLOTS.
        while epoch - self.gate.load(Ordering::Acquire) >= START_LOG_SLOTS as u64 {
            std::hint::spin_loop();
        }
        epoch
    }

    /// Latest assigned epoch; tags retired objects.
    pub fn current(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }

    /// Every epoch at or below the gate has been retired.
    pub fn gate(&self) -> u64 {
        self.gate.load(Ordering::Acquire)
    }

    /// Mark `epoch` retired and advance the gate over the contiguous retired
    /// prefix.
    pub fn validated_closure(&self, epoch: u64) {
        self.retired[(epoch % START_LOG_SLOTS as u64) as usize].store(true, Ordering::Release);
        let _guard = self.advance.lock();
        let mut gate = self.gate.load(Ordering::Relaxed);
        loop {
            let slot = &self.retired[((gate + 1) % START_LOG_SLOTS as u64) as usize];
            if !slot.load(Ordering::Acquire) {
                break;
            }
            slot.store(false, Ordering::Relaxed);
            gate += 1;
        }
        self.gate.store(gate, Ordering::Release);
    }
}

type DropFn = unsafe fn(*mut u8);

struct Retired {
    ptr: *mut u8,
    drop_fn: DropFn,
    epoch: u64,
}

// Safety: the pointee is owned by the free log from `defer` until `collect`.
unsafe impl Send for Retired {}

/// Per-worker deferred free list. The worker appends; its paired validator
/// drains entries whose epoch the gate has passed.
pub(crate) struct ThreadGc {
    free_log: Mutex<VecDeque<Retired>>,
}

impl ThreadGc {
    pub fn new() -> Self {
        Self {
            free_log: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue `ptr` for freeing once every closure that may have observed it
    /// has been retired. Epochs are tagged in assignment order, so the deque
    /// stays sorted.
    pub fn defer(&self, ptr: *mut u8, drop_fn: DropFn) {
        let epoch = START_LOG.current();
        self.free_log.lock().push_back(Retired { ptr, drop_fn, epoch });
    }

    /// Free every entry whose epoch is at or below `gate`.
    pub fn collect(&self, gate: u64) {
        let mut log = self.free_log.lock();
        while log.front().is_some_and(|r| r.epoch <= gate) {
            if let Some(r) = log.pop_front() {
                unsafe { (r.drop_fn)(r.ptr) };
            }
        }
    }

    pub fn is_drained(&self) -> bool {
        self.free_log.lock().is_empty()
    }
}

/// Retire a heap object owned by the calling worker's versioned state.
pub(crate) fn defer_drop<T>(ptr: *const T) {
    unsafe fn drop_box<T>(ptr: *mut u8) {
        drop(unsafe { Box::from_raw(ptr as *mut T) });
    }
    with_worker(|w| w.shared.gc.defer(ptr as *mut u8, drop_box::<T>));
}
