//! The paired validator worker.
//!
//! One validator is spawned per application worker. It drains that worker's
//! SPSC queue in FIFO order, which the positional log format assumes, and
//! re-executes each record under the admission and sampling policies.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::admission;
use crate::arena;
use crate::closure::ReplayHeader;
use crate::config;
use crate::gc::ThreadGc;
use crate::log::{reclaim_log, LogHead, LogReader};
use crate::thread::WorkerShared;

pub(crate) fn validator_main(shared: Arc<WorkerShared>) {
    config::pin_validator_thread();
    tracing::debug!("validator started");
    while !shared.stop.load(Ordering::Acquire) {
        while shared.queue.is_empty() && !shared.stop.load(Ordering::Acquire) {
            std::hint::spin_loop();
        }
        drain(&shared);
    }
    // Records committed before the stop flag was raised.
    drain(&shared);
    tracing::debug!("validator stopped");
}

fn drain(shared: &WorkerShared) {
    while let Some(log) = shared.queue.pop() {
        validate_one(log, &shared.gc);
    }
}

pub(crate) fn validate_one(log: *mut LogHead, gc: &ThreadGc) {
    #[cfg(not(feature = "sync-validate"))]
    {
        let rate = config::sampling_rate();
        if rate < 100 && !crate::sampling::sample_hit(rate) {
            reclaim_log(log, gc);
            return;
        }
    }
    admission::admit(|| run_validation(log, gc), || reclaim_log(log, gc));
}

fn run_validation(log: *mut LogHead, gc: &ThreadGc) {
    arena::reset_bulk_buffer();
    let mut reader = LogReader::open(log);
    let header: ReplayHeader = reader.peek();
    unsafe { (header.replay)(&mut reader) };
    reader.close(gc);
}
