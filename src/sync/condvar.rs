//! Condition variable
//!
//! Waits release the given mutex and reacquire it before returning.
//! Wakeups may be spurious, so waiters re-check their predicate in a loop
//! while holding the mutex:
//!
//! ```no_run
//! # use osal::sync::{condvar::Condvar, mutex::Mutex};
//! # use osal::types::SyncAttr;
//! # fn ready() -> bool { true }
//! # fn main() -> osal::OsalResult<()> {
//! let mutex = Mutex::new(SyncAttr::new())?;
//! let cond = Condvar::new(SyncAttr::new())?;
//!
//! mutex.lock()?;
//! while !ready() {
//!     cond.wait(&mutex)?;
//! }
//! mutex.unlock()?;
//! # Ok(())
//! # }
//! ```
//!
//! Deadlines are absolute on the process clock ([`crate::kernel::clock`]).
//! Creating the first condition variable pins that clock.

use crate::error::OsalResult;
use crate::kernel;
use crate::port::{self, CondvarBackend};
use crate::time::Timer;
use crate::types::CondvarAttr;

use super::mutex::Mutex;
use super::Pinned;

/// Condition variable handle
pub struct Condvar {
    raw: Pinned<port::Condvar>,
}

impl Condvar {
    /// Create a condition variable bound to the process clock
    pub fn new(attr: CondvarAttr) -> OsalResult<Self> {
        let clock = kernel::pin_clock();
        // SAFETY: `Pinned` initializes the storage in place.
        let raw = Pinned::new(|c: &port::Condvar| unsafe { c.init(attr, clock) })?;
        Ok(Condvar { raw })
    }

    /// Release `mutex`, wait for a signal and reacquire it
    ///
    /// The caller must hold `mutex`.
    #[inline]
    pub fn wait(&self, mutex: &Mutex) -> OsalResult<()> {
        self.raw.wait(mutex.raw())
    }

    /// Like [`Condvar::wait`], giving up at `deadline`
    ///
    /// `mutex` is held again on every return, including timeouts.
    ///
    /// # Returns
    /// * `Err(OsalError::Timeout)` - Deadline passed
    #[inline]
    pub fn timedwait(&self, mutex: &Mutex, deadline: &Timer) -> OsalResult<()> {
        self.raw.timedwait(mutex.raw(), deadline)
    }

    /// Wake one waiter
    #[inline]
    pub fn signal(&self) -> OsalResult<()> {
        self.raw.signal()
    }

    /// Wake all waiters
    #[inline]
    pub fn broadcast(&self) -> OsalResult<()> {
        self.raw.broadcast()
    }

    /// Destroy the condition variable
    ///
    /// # Returns
    /// * `Err(OsalError::Busy)` - Tasks still wait on it; its storage is leaked
    pub fn destroy(self) -> OsalResult<()> {
        self.raw.destroy()
    }
}

impl std::fmt::Debug for Condvar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Condvar").finish_non_exhaustive()
    }
}
