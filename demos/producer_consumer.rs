//! Producer-Consumer example with semaphores
//!
//! The producer fills a single-slot mailbox guarded by a mutex and posts a
//! counting semaphore; the consumer waits on it and drains the slot.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use osal::task::{self, TaskAttr};
use osal::time;
use osal::types::SyncAttr;
use osal::{Mutex, OsalError, OsalResult, Semaphore};

const ROUNDS: u32 = 10;

static PRODUCED: AtomicU32 = AtomicU32::new(0);
static CONSUMED: AtomicU32 = AtomicU32::new(0);

struct Mailbox {
    lock: Mutex,
    full: Semaphore,
    empty: Semaphore,
    slot: AtomicU32,
}

/// Wait on `sem`, retrying after signal interruptions
fn wait(sem: &Semaphore) -> OsalResult<()> {
    loop {
        match sem.wait() {
            Err(OsalError::Interrupted) => continue,
            other => return other,
        }
    }
}

fn producer_task(mb: Arc<Mailbox>) -> OsalResult<()> {
    for n in 1..=ROUNDS {
        wait(&mb.empty)?;
        {
            let _guard = mb.lock.guard()?;
            mb.slot.store(n, Ordering::Relaxed);
        }
        PRODUCED.fetch_add(1, Ordering::Relaxed);
        mb.full.post()?;
        println!("[P] produced #{}", n);
        time::sleep(20_000_000)?;
    }
    Ok(())
}

fn consumer_task(mb: Arc<Mailbox>) -> OsalResult<()> {
    for _ in 0..ROUNDS {
        wait(&mb.full)?;
        let n = {
            let _guard = mb.lock.guard()?;
            mb.slot.load(Ordering::Relaxed)
        };
        mb.empty.post()?;
        CONSUMED.fetch_add(1, Ordering::Relaxed);
        println!("[C] consumed #{}", n);
    }
    Ok(())
}

fn main() -> OsalResult<()> {
    println!("Producer-Consumer Demo");
    osal::init(osal::OsalConfig::new())?;

    let mb = Arc::new(Mailbox {
        lock: Mutex::new(SyncAttr::new())?,
        full: Semaphore::new(SyncAttr::new(), 0)?,
        empty: Semaphore::new(SyncAttr::new(), 1)?,
        slot: AtomicU32::new(0),
    });

    let p = {
        let mb = Arc::clone(&mb);
        task::create(&TaskAttr::new("producer"), move || producer_task(mb))?
    };
    let c = {
        let mb = Arc::clone(&mb);
        task::create(&TaskAttr::new("consumer"), move || consumer_task(mb))?
    };

    p.join()?.unwrap_or(Ok(()))?;
    c.join()?.unwrap_or(Ok(()))?;

    println!(
        "produced {}, consumed {}",
        PRODUCED.load(Ordering::Relaxed),
        CONSUMED.load(Ordering::Relaxed)
    );
    osal::destroy()
}
