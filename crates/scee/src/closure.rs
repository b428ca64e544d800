//! The dual-execution closure runtime.
//!
//! `run2` is the entry point for every stateful request: the application
//! closure produces the externally observable result while the validator
//! closure's identity and arguments are captured in the log for later
//! re-execution. The log's positional byte stream is the only channel
//! between the two sides.

use crate::ctx::{AppCtx, ValCtx};
use crate::log::LogReader;
use crate::plain::Plain;
use crate::thread::{append_raw, commit_log, new_log};

/// First body record of every log: how to replay the rest of it.
#[derive(Clone, Copy)]
pub(crate) struct ReplayHeader {
    pub replay: unsafe fn(&mut LogReader),
}

#[derive(Clone, Copy)]
struct DualFrame<A, R> {
    val_fn: for<'a, 'r> fn(&'a mut ValCtx<'r>, A) -> R,
    args: A,
}

#[derive(Clone, Copy)]
struct PureFrame<A, R> {
    func: fn(A) -> R,
    args: A,
}

/// Execute `app_fn` now and schedule `val_fn` for re-execution against the
/// same logical state. The return value is held in the log by value, hence
/// the [`Plain`] bound.
pub fn run2<A, R>(
    app_fn: fn(&mut AppCtx, A) -> R,
    val_fn: for<'a, 'r> fn(&'a mut ValCtx<'r>, A) -> R,
    args: A,
) -> R
where
    A: Copy + Send + 'static,
    R: Plain,
{
    new_log();
    append_raw(ReplayHeader {
        replay: replay_dual::<A, R>,
    });
    append_raw(DualFrame { val_fn, args });
    let mut ctx = AppCtx::new();
    let ret = app_fn(&mut ctx, args);
    if std::mem::size_of::<R>() > 0 {
        append_raw(ret);
    }
    finish();
    ret
}

/// Single-function variant for deterministic computations: the validator
/// re-runs the same function and checks only the result.
pub fn run<A, R>(func: fn(A) -> R, args: A) -> R
where
    A: Copy + Send + 'static,
    R: Plain,
{
    new_log();
    append_raw(ReplayHeader {
        replay: replay_pure::<A, R>,
    });
    append_raw(PureFrame { func, args });
    let ret = func(args);
    if std::mem::size_of::<R>() > 0 {
        append_raw(ret);
    }
    finish();
    ret
}

#[cfg(feature = "sync-validate")]
fn finish() {
    use crate::ticket::SyncTicket;

    let ticket = SyncTicket::new();
    commit_log(&ticket as *const SyncTicket);
    ticket.wait();
}

#[cfg(not(feature = "sync-validate"))]
fn finish() {
    commit_log(std::ptr::null());
}

unsafe fn replay_dual<A, R>(reader: &mut LogReader)
where
    A: Copy + Send + 'static,
    R: Plain,
{
    reader.skip::<ReplayHeader>();
    let frame: DualFrame<A, R> = reader.fetch();
    let mut ctx = ValCtx::new(reader);
    let ret = (frame.val_fn)(&mut ctx, frame.args);
    if std::mem::size_of::<R>() > 0 {
        reader.cmp(&ret);
    }
}

unsafe fn replay_pure<A, R>(reader: &mut LogReader)
where
    A: Copy + Send + 'static,
    R: Plain,
{
    reader.skip::<ReplayHeader>();
    let frame: PureFrame<A, R> = reader.fetch();
    let ret = (frame.func)(frame.args);
    if std::mem::size_of::<R>() > 0 {
        reader.cmp(&ret);
    }
}
