//! Per-closure handshake used by synchronous validation.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Condvar, Mutex};

/// One-shot wake-on-store-1 cell pinned on the application worker's stack.
///
/// The validator stores 1 when the record is retired; the worker blocks on
/// the cell after committing. The condvar keyed on the ticket stands in for
/// a futex wait on platforms without native atomic wait.
pub struct SyncTicket {
    state: AtomicU32,
    lock: Mutex<()>,
    cond: Condvar,
}

impl SyncTicket {
    pub fn new() -> Self {
        Self {
            state: AtomicU32::new(0),
            lock: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    /// Block until the paired validator retires the record.
    pub fn wait(&self) {
        let mut guard = self.lock.lock();
        while self.state.load(Ordering::Acquire) == 0 {
            self.cond.wait(&mut guard);
        }
    }

    /// Called by the validator on reclaim. The worker may free the stack slot
    /// the moment the guard here drops, so the ticket is untouched afterward.
    pub(crate) fn complete(&self) {
        let _guard = self.lock.lock();
        self.state.store(1, Ordering::Release);
        self.cond.notify_one();
    }
}

impl Default for SyncTicket {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn wait_returns_after_complete() {
        let ticket = Arc::new(SyncTicket::new());
        let waker = {
            let ticket = Arc::clone(&ticket);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                ticket.complete();
            })
        };
        ticket.wait();
        assert_eq!(ticket.state.load(Ordering::Acquire), 1);
        waker.join().unwrap();
    }

    #[test]
    fn wait_after_complete_is_immediate() {
        let ticket = SyncTicket::new();
        ticket.complete();
        ticket.wait();
    }
}
