//! Bounds the number of concurrently executing validator bodies.
//!
//! Asynchronous mode sheds load: a record arriving while the ceiling is hit
//! is reclaimed unvalidated, degrading validation to sampling instead of
//! queueing work and memory. Synchronous mode blocks the validator below the
//! ceiling so the app-side sync ticket back-pressures the client.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config;

pub(crate) static N_VALIDATION_CORE: AtomicUsize = AtomicUsize::new(0);

#[cfg(not(feature = "sync-validate"))]
pub(crate) fn admit(validate: impl FnOnce(), reclaim: impl FnOnce()) {
    let max = config::max_validation_core();
    if max == 0 {
        validate();
        return;
    }
    let prev = N_VALIDATION_CORE.fetch_add(1, Ordering::Relaxed);
    if prev < max {
        validate();
    } else {
        reclaim();
    }
    N_VALIDATION_CORE.fetch_sub(1, Ordering::Relaxed);
}

#[cfg(feature = "sync-validate")]
pub(crate) fn admit(validate: impl FnOnce(), _reclaim: impl FnOnce()) {
    use parking_lot::{Condvar, Mutex};

    struct Gate {
        lock: Mutex<()>,
        cond: Condvar,
    }
    static GATE: Gate = Gate {
        lock: Mutex::new(()),
        cond: Condvar::new(),
    };

    let max = config::max_validation_core();
    if max == 0 {
        validate();
        return;
    }
    {
        let mut guard = GATE.lock.lock();
        while N_VALIDATION_CORE.load(Ordering::Relaxed) >= max {
            GATE.cond.wait(&mut guard);
        }
        N_VALIDATION_CORE.fetch_add(1, Ordering::Relaxed);
    }
    validate();
    {
        let _guard = GATE.lock.lock();
        N_VALIDATION_CORE.fetch_sub(1, Ordering::Relaxed);
        GATE.cond.notify_one();
    }
}
