//! Superseded versions must stay readable while any unretired record can
//! still reference them. A deliberately slow validator builds a deep backlog
//! of records whose loads point at long-superseded objects; replaying them
//! still sees the original bytes (a use-after-free would abort on the
//! return-value comparison, or trip a sanitizer).

use std::time::{Duration, Instant};

use scee::{main_thread, run2, AppCtx, Ctx, ValCtx, VPtr};

#[derive(Clone, Copy)]
struct CellArgs {
    cell: &'static VPtr<u64>,
}

fn churn_app(ctx: &mut AppCtx, args: CellArgs) -> u64 {
    let cur = ctx.load(args.cell).copied().unwrap_or(0);
    ctx.replace(args.cell, cur + 1);
    cur + 1
}

fn churn_val(ctx: &mut ValCtx<'_>, args: CellArgs) -> u64 {
    let start = Instant::now();
    while start.elapsed() < Duration::from_micros(50) {
        std::hint::spin_loop();
    }
    let cur = ctx.load(args.cell).copied().unwrap_or(0);
    ctx.replace(args.cell, cur + 1);
    cur + 1
}

#[test]
fn slow_validator_never_sees_freed_versions() {
    let cell = unsafe { &*VPtr::create(0u64) };
    main_thread(|| {
        for expect in 1..=2000u64 {
            assert_eq!(run2(churn_app, churn_val, CellArgs { cell }), expect);
        }
    });
}
