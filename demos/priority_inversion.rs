//! Priority Inversion Demo - mutex priority inheritance
//!
//! Three SCHED_FIFO tasks pinned to CPU 0: High(3), Med(2), Low(1).
//! Low holds the mutex, High waits for it, Med burns the CPU. With the
//! inherit protocol Low is boosted and High gets the mutex after Low's own
//! work; without it High also waits for Med.
//!
//! Needs CAP_SYS_NICE. Pass `--no-inherit` to see the inversion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use osal::prio::CpuSet;
use osal::task::{self, TaskAttr};
use osal::time;
use osal::types::{MutexProtocol, SchedPolicy, SyncAttr};
use osal::{Mutex, OsalResult, Timer};

const LOW_WORK_NS: u64 = 1_000_000_000;
const MED_WORK_NS: u64 = 5_000_000_000;

/// Busy loop for `ns` nanoseconds of wall time
fn spin_for(ns: u64) {
    let end = Timer::with_timeout(ns);
    while end.expired().is_ok() {
        std::hint::spin_loop();
    }
}

fn attr(name: &str, priority: i32) -> TaskAttr {
    TaskAttr::new(name)
        .with_policy(SchedPolicy::Fifo)
        .with_priority(priority)
        .with_affinity([0usize].into_iter().collect::<CpuSet>())
}

fn main() -> OsalResult<()> {
    let inherit = !std::env::args().any(|a| a == "--no-inherit");
    println!(
        "Priority Inversion Demo: H(3) M(2) L(1), protocol {}",
        if inherit { "inherit" } else { "none" }
    );
    osal::init(osal::OsalConfig::new())?;

    let protocol = if inherit {
        MutexProtocol::Inherit
    } else {
        MutexProtocol::None
    };
    let mtx = Arc::new(Mutex::new(SyncAttr::new().with_protocol(protocol))?);
    let locked = Arc::new(AtomicBool::new(false));

    let low = {
        let (mtx, locked) = (Arc::clone(&mtx), Arc::clone(&locked));
        task::create(&attr("low", 1), move || -> OsalResult<()> {
            let _guard = mtx.guard()?;
            locked.store(true, Ordering::Release);
            println!("[LOW] holding");
            spin_for(LOW_WORK_NS);
            Ok(())
        })?
    };

    while !locked.load(Ordering::Acquire) {
        time::sleep(1_000_000)?;
    }

    let med = task::create(&attr("med", 2), || spin_for(MED_WORK_NS))?;

    let high = {
        let mtx = Arc::clone(&mtx);
        task::create(&attr("high", 3), move || -> OsalResult<u64> {
            let start = Timer::now();
            let _guard = mtx.guard()?;
            Ok(Timer::now().saturating_sub(&start))
        })?
    };

    let waited = high.join()?.unwrap_or(Ok(0))?;
    println!("[HIGH] acquired after {} ms", waited / 1_000_000);

    low.join()?.unwrap_or(Ok(()))?;
    med.join()?;
    osal::destroy()
}
