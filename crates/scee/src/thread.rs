//! Application worker threads, their paired validators, and the per-thread
//! log writer state.
//!
//! One worker equals one OS thread: the allocator, free-log, SPSC queue, and
//! current-log cursor all live in thread-local storage, and each worker owns
//! exactly one validator thread for its lifetime.

use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::arena;
use crate::config;
use crate::error::fatal;
use crate::gc::{ThreadGc, START_LOG};
use crate::log::{
    align_record, now_micros, LogHead, LogTail, ThreadLogAllocator, LOG_RECORD_ALIGN,
    MIN_LOG_BUFFER_SIZE,
};
use crate::queue::LogQueue;
use crate::ticket::SyncTicket;
use crate::validator;

/// State shared between a worker and its paired validator.
pub(crate) struct WorkerShared {
    pub queue: LogQueue,
    pub gc: ThreadGc,
    pub stop: AtomicBool,
}

pub(crate) struct CurrentLog {
    pub head: *mut LogHead,
    pub cursor: *mut u8,
}

pub(crate) struct Worker {
    pub shared: Arc<WorkerShared>,
    pub allocator: ThreadLogAllocator,
    pub current: CurrentLog,
    validator: Option<JoinHandle<()>>,
}

thread_local! {
    static WORKER: UnsafeCell<Option<Worker>> = const { UnsafeCell::new(None) };
}

#[inline]
pub(crate) fn with_worker<R>(f: impl FnOnce(&mut Worker) -> R) -> R {
    WORKER.with(|slot| {
        let worker = unsafe { &mut *slot.get() };
        match worker.as_mut() {
            Some(w) => f(w),
            None => fatal!("scee closures must run on a main_thread or AppThread worker"),
        }
    })
}

fn register_worker() {
    config::init_from_env();
    config::pin_worker_thread();

    let shared = Arc::new(WorkerShared {
        queue: LogQueue::new(),
        gc: ThreadGc::new(),
        stop: AtomicBool::new(false),
    });
    let validator = {
        let shared = Arc::clone(&shared);
        match std::thread::Builder::new()
            .name("scee-validator".into())
            .spawn(move || validator::validator_main(shared))
        {
            Ok(handle) => handle,
            Err(err) => fatal!("failed to spawn validator thread: {}", err),
        }
    };

    WORKER.with(|slot| {
        let worker = unsafe { &mut *slot.get() };
        if worker.is_some() {
            fatal!("worker already registered on this thread");
        }
        *worker = Some(Worker {
            shared,
            allocator: ThreadLogAllocator::new(),
            current: CurrentLog {
                head: ptr::null_mut(),
                cursor: ptr::null_mut(),
            },
            validator: Some(validator),
        });
    });
    tracing::debug!("application worker registered");
}

fn unregister_worker() {
    let worker = WORKER.with(|slot| unsafe { (*slot.get()).take() });
    let Some(mut worker) = worker else {
        return;
    };
    worker.shared.stop.store(true, Ordering::Release);
    if let Some(handle) = worker.validator.take() {
        if handle.join().is_err() {
            fatal!("validator thread terminated abnormally");
        }
    }
    // Remaining free-log entries may be gated on closures still in flight on
    // other workers; those retire in bounded time.
    while !worker.shared.gc.is_drained() {
        worker.shared.gc.collect(START_LOG.gate());
        std::hint::spin_loop();
    }
    worker.allocator.release_all();
    tracing::debug!("application worker unregistered");
}

struct RegisterGuard;

impl Drop for RegisterGuard {
    fn drop(&mut self) {
        unregister_worker();
    }
}

/// Wrap the calling thread as an application worker for the duration of `f`.
pub fn main_thread<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    register_worker();
    let _guard = RegisterGuard;
    f()
}

/// An application worker on its own OS thread, paired with a validator for
/// its entire lifetime.
pub struct AppThread<R = ()> {
    handle: JoinHandle<R>,
}

impl<R> AppThread<R>
where
    R: Send + 'static,
{
    pub fn spawn<F>(f: F) -> Self
    where
        F: FnOnce() -> R + Send + 'static,
    {
        let handle = match std::thread::Builder::new()
            .name("scee-worker".into())
            .spawn(move || main_thread(f))
        {
            Ok(handle) => handle,
            Err(err) => fatal!("failed to spawn application worker: {}", err),
        };
        Self { handle }
    }

    pub fn join(self) -> R {
        match self.handle.join() {
            Ok(ret) => ret,
            Err(_) => fatal!("application worker terminated abnormally"),
        }
    }
}

/// Open a fresh log for the closure about to run on this worker.
pub(crate) fn new_log() {
    arena::reset_bulk_buffer();
    with_worker(|w| {
        let log = w.allocator.allocate();
        unsafe {
            (*log).length = 0;
            (*log).reclaimed = 0;
            (*log).gc_tsc = START_LOG.new_closure();
            (*log).start_us = now_micros();
            (*log).ticket = ptr::null();
        }
        w.current.head = log;
        w.current.cursor = unsafe { (log as *mut u8).add(std::mem::size_of::<LogHead>()) };
    });
}

/// Append one trivially-copyable record to the current log.
pub(crate) fn append_raw<T: Copy>(value: T) -> *const T {
    const { assert!(std::mem::align_of::<T>() <= LOG_RECORD_ALIGN) };
    with_worker(|w| {
        debug_assert!(!w.current.head.is_null());
        unsafe {
            let dst = w.current.cursor as *mut T;
            dst.write(value);
            w.current.cursor = w
                .current
                .cursor
                .add(align_record(std::mem::size_of::<T>()));
            debug_assert!(
                (w.current.cursor as usize - w.current.head as usize) < MIN_LOG_BUFFER_SIZE
            );
            dst as *const T
        }
    })
}

pub type LogCursor = *mut u8;

/// Snapshot the current log's append position.
pub fn log_cursor() -> LogCursor {
    with_worker(|w| w.current.cursor)
}

/// Rewind an aborted append sequence; the bytes never reach the validator.
pub fn unroll_log(cursor: LogCursor) {
    with_worker(|w| w.current.cursor = cursor);
}

/// Seal the current log with its tail sentinel and hand it to the paired
/// validator.
pub(crate) fn commit_log(ticket: *const SyncTicket) {
    with_worker(|w| unsafe {
        let head = w.current.head;
        debug_assert!(!head.is_null());
        let tail_at = w.current.cursor as *mut LogTail;
        let length = (w.current.cursor as usize + std::mem::size_of::<LogTail>()) - head as usize;
        (*head).length = length as u32;
        (*head).ticket = ticket;
        tail_at.write(LogTail {
            length: length as u32,
            magic: LogTail::MAGIC,
        });
        w.allocator.commit(head);
        while !w.shared.queue.push(head) {
            std::hint::spin_loop();
        }
        w.current.head = ptr::null_mut();
        w.current.cursor = ptr::null_mut();
    });
}
