//! Spinlock
//!
//! Busy-waiting lock for very short critical sections. Only the
//! `process_shared` bit of the attribute word applies; asking for a
//! robust, non-normal or protocol spinlock fails with `NotImplemented`.

use crate::error::OsalResult;
use crate::port::{self, SpinlockBackend};
use crate::types::SpinlockAttr;

use super::Pinned;

/// Spinlock handle
pub struct Spinlock {
    raw: Pinned<port::Spinlock>,
}

impl Spinlock {
    pub fn new(attr: SpinlockAttr) -> OsalResult<Self> {
        // SAFETY: `Pinned` initializes the storage in place.
        let raw = Pinned::new(|s: &port::Spinlock| unsafe { s.init(attr) })?;
        Ok(Spinlock { raw })
    }

    /// Spin until the lock is acquired
    ///
    /// # Returns
    /// * `Err(OsalError::DeadLock)` - Caller already holds the lock
    #[inline]
    pub fn lock(&self) -> OsalResult<()> {
        self.raw.lock()
    }

    /// # Returns
    /// * `Err(OsalError::Busy)` - Lock is held
    #[inline]
    pub fn trylock(&self) -> OsalResult<()> {
        self.raw.trylock()
    }

    #[inline]
    pub fn unlock(&self) -> OsalResult<()> {
        self.raw.unlock()
    }

    /// Destroy the spinlock
    ///
    /// # Returns
    /// * `Err(OsalError::Busy)` - Lock is held; its storage is leaked
    pub fn destroy(self) -> OsalResult<()> {
        self.raw.destroy()
    }
}

impl std::fmt::Debug for Spinlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spinlock").finish_non_exhaustive()
    }
}
