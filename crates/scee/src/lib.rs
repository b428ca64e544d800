//! Self-checking execution engine.
//!
//! Every stateful request executes twice. The application closure runs first
//! and produces the externally observable result while recording each
//! non-deterministic input (atomic loads of versioned state, fresh
//! allocation addresses, externally read bytes) in a per-invocation log.
//! A validator thread paired with the worker then re-executes the validator
//! closure against the same log, byte-comparing every recorded value, every
//! published object, and the return value. Divergence is treated as silent
//! data corruption and aborts the process.
//!
//! ```
//! use scee::{main_thread, run2, AppCtx, Ctx, ValCtx};
//!
//! fn double_app(ctx: &mut AppCtx, n: u64) -> u64 {
//!     ctx.observe(n * 2)
//! }
//!
//! fn double_val(ctx: &mut ValCtx<'_>, n: u64) -> u64 {
//!     ctx.observe(n * 2)
//! }
//!
//! let answer = main_thread(|| run2(double_app, double_val, 21));
//! assert_eq!(answer, 42);
//! ```

mod admission;
pub mod arena;
mod closure;
mod config;
mod ctx;
mod error;
mod gc;
mod log;
mod plain;
mod queue;
mod sampling;
mod thread;
mod ticket;
mod validator;
mod vptr;

pub use closure::{run, run2};
pub use config::{
    max_validation_core, sampling_rate, set_max_validation_core, set_sampling_rate,
    MAX_VALIDATION_CORE_ENV, SAMPLING_RATE_ENV, VALIDATION_CPUSET_ENV, WORK_CPUSET_ENV,
};
pub use ctx::{AppCtx, Ctx, ValCtx};
pub use error::ConfigError;
pub use log::{LogReader, MAX_LOG_BUFFER_SIZE, MIN_LOG_BUFFER_SIZE};
pub use plain::Plain;
pub use queue::{SpscQueue, LOG_QUEUE_CAPACITY};
pub use thread::{log_cursor, main_thread, unroll_log, AppThread, LogCursor};
pub use ticket::SyncTicket;
pub use vptr::{FixedPtr, VPtr};

#[cfg(test)]
pub(crate) mod testutil {
    use parking_lot::Mutex;

    /// Unit tests that register workers or assign GC epochs take this lock:
    /// they share process-global state (the buffer pool, the start log).
    pub static SERIAL: Mutex<()> = Mutex::new(());
}
