//! Semaphore implementation
//!
//! Counting semaphores for task synchronization and resource counting.
//!
//! # Interruptions
//!
//! [`Semaphore::wait`] returns [`OsalError::Interrupted`] when a signal
//! handler runs while it blocks; callers that do not care retry. The
//! deadline variant [`Semaphore::timedwait`] keeps waiting until its
//! deadline instead.
//!
//! [`OsalError::Interrupted`]: crate::error::OsalError::Interrupted

use crate::error::OsalResult;
use crate::port::{self, SemaphoreBackend};
use crate::time::Timer;
use crate::types::SemaphoreAttr;

use super::Pinned;

/// Counting semaphore
pub struct Semaphore {
    raw: Pinned<port::Semaphore>,
}

impl Semaphore {
    /// Create a semaphore holding `value` tokens
    ///
    /// Only `process_shared` of `attr` is honored.
    pub fn new(attr: SemaphoreAttr, value: u32) -> OsalResult<Self> {
        // SAFETY: `Pinned` initializes the storage in place.
        let raw = Pinned::new(|s: &port::Semaphore| unsafe { s.init(attr, value) })?;
        Ok(Semaphore { raw })
    }

    /// Add a token, waking one waiter
    ///
    /// # Returns
    /// * `Err(OsalError::OperationFailed)` - Counter would overflow
    #[inline]
    pub fn post(&self) -> OsalResult<()> {
        self.raw.post()
    }

    /// Take a token, blocking while none is available
    ///
    /// # Returns
    /// * `Err(OsalError::Interrupted)` - A signal arrived while blocked
    #[inline]
    pub fn wait(&self) -> OsalResult<()> {
        self.raw.wait()
    }

    /// Take a token if one is available
    ///
    /// # Returns
    /// * `Err(OsalError::Busy)` - Counter is zero
    #[inline]
    pub fn trywait(&self) -> OsalResult<()> {
        self.raw.trywait()
    }

    /// Take a token, giving up at `deadline`
    ///
    /// # Returns
    /// * `Err(OsalError::Timeout)` - Deadline passed without a token
    /// * `Err(OsalError::InvalidParam)` - Deadline not normalized
    #[inline]
    pub fn timedwait(&self, deadline: &Timer) -> OsalResult<()> {
        self.raw.timedwait(deadline)
    }

    /// Current number of tokens
    #[inline]
    pub fn value(&self) -> OsalResult<u32> {
        self.raw.value()
    }

    pub fn destroy(self) -> OsalResult<()> {
        self.raw.destroy()
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Semaphore")
            .field("value", &self.value().ok())
            .finish()
    }
}
