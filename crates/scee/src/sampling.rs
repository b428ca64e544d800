//! Per-validator sampling draw.
//!
//! The draw sits on the validator hot path, so it must not contend on shared
//! state the way libc `rand` does. Each validator thread owns a splitmix64
//! stream; seeds mix the clock with a process-wide stream sequence so paired
//! validators started in the same instant do not sample in lockstep.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// splitmix64 increment.
const SEQ_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

static STREAM_SEQ: AtomicU64 = AtomicU64::new(0);

struct SampleStream {
    state: u64,
}

impl SampleStream {
    fn seeded() -> Self {
        let clock = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos() as u64);
        let stream = STREAM_SEQ.fetch_add(1, Ordering::Relaxed) + 1;
        Self {
            state: clock ^ stream.wrapping_mul(SEQ_GAMMA),
        }
    }

    fn next(&mut self) -> u64 {
        self.state = self.state.wrapping_add(SEQ_GAMMA);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

thread_local! {
    static SAMPLE_STREAM: UnsafeCell<SampleStream> = UnsafeCell::new(SampleStream::seeded());
}

/// Decide whether the next dequeued record is validated under a
/// `rate`-percent sampling policy.
#[cfg_attr(feature = "sync-validate", allow(dead_code))]
pub(crate) fn sample_hit(rate: u32) -> bool {
    let draw = SAMPLE_STREAM.with(|s| unsafe { &mut *s.get() }.next());
    draw % 100 < rate as u64
}
