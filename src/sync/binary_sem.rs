//! Binary semaphore
//!
//! A semaphore that is either available or not; posting an available one
//! leaves it available. Built from a mutex and a condition variable, so
//! creating one pins the process clock like a [`Condvar`] does.
//!
//! [`Condvar`]: crate::sync::condvar::Condvar

use crate::error::OsalResult;
use crate::kernel;
use crate::port::{self, BinarySemaphoreBackend};
use crate::time::Timer;
use crate::types::BinarySemaphoreAttr;

use super::Pinned;

/// Binary semaphore
pub struct BinarySemaphore {
    raw: Pinned<port::BinarySemaphore>,
}

impl BinarySemaphore {
    /// Create an unavailable binary semaphore
    pub fn new(attr: BinarySemaphoreAttr) -> OsalResult<Self> {
        let clock = kernel::pin_clock();
        // SAFETY: `Pinned` initializes the storage in place.
        let raw = Pinned::new(|s: &port::BinarySemaphore| unsafe { s.init(attr, clock) })?;
        Ok(BinarySemaphore { raw })
    }

    /// Make the semaphore available and wake one waiter
    #[inline]
    pub fn post(&self) -> OsalResult<()> {
        self.raw.post()
    }

    /// Block until available, then take it
    #[inline]
    pub fn wait(&self) -> OsalResult<()> {
        self.raw.wait()
    }

    /// Take the semaphore if available
    ///
    /// # Returns
    /// * `Err(OsalError::Timeout)` - Not available
    #[inline]
    pub fn trywait(&self) -> OsalResult<()> {
        self.raw.trywait()
    }

    /// Block until available or `deadline` passes
    ///
    /// # Returns
    /// * `Err(OsalError::Timeout)` - Deadline passed while unavailable
    #[inline]
    pub fn timedwait(&self, deadline: &Timer) -> OsalResult<()> {
        self.raw.timedwait(deadline)
    }

    pub fn destroy(self) -> OsalResult<()> {
        self.raw.destroy()
    }
}

impl std::fmt::Debug for BinarySemaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinarySemaphore").finish_non_exhaustive()
    }
}
