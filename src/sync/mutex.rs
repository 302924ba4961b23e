//! Mutex
//!
//! Normal, error-checking and recursive mutexes with optional robustness
//! and priority inheritance or ceiling protocol, selected by [`MutexAttr`].
//!
//! # Robust mutexes
//!
//! When the owner of a robust mutex terminates while holding it, the next
//! `lock` returns [`OsalError::OwnerDead`] *with the lock acquired*. The new
//! owner repairs the protected state and calls [`Mutex::consistent`], or
//! unlocks without doing so, after which every operation returns
//! [`OsalError::NotRecoverable`].
//!
//! [`OsalError::OwnerDead`]: crate::error::OsalError::OwnerDead
//! [`OsalError::NotRecoverable`]: crate::error::OsalError::NotRecoverable

use crate::error::OsalResult;
use crate::port::{self, MutexBackend};
use crate::types::MutexAttr;

use super::Pinned;

/// Mutex handle
pub struct Mutex {
    raw: Pinned<port::Mutex>,
    attr: MutexAttr,
}

impl Mutex {
    /// Create a mutex
    ///
    /// # Returns
    /// * `Ok(Mutex)` - Mutex ready for use
    /// * `Err(OsalError::InvalidParam)` - Undefined type or protocol encoding
    /// * `Err(OsalError::NotImplemented)` - Host lacks robustness or protocol
    pub fn new(attr: MutexAttr) -> OsalResult<Self> {
        // SAFETY: `Pinned` initializes the storage in place.
        let raw = Pinned::new(|m: &port::Mutex| unsafe { m.init(attr) })?;
        Ok(Mutex { raw, attr })
    }

    /// Acquire the mutex, blocking while another task holds it
    ///
    /// # Returns
    /// * `Ok(())` - Mutex acquired
    /// * `Err(OsalError::OwnerDead)` - Acquired; previous owner died
    /// * `Err(OsalError::NotRecoverable)` - Robust mutex left inconsistent
    /// * `Err(OsalError::DeadLock)` - Errorcheck mutex already held by caller
    /// * `Err(OsalError::SystemLimitReached)` - Recursion limit reached
    /// * `Err(OsalError::InvalidParam)` - Caller priority above the ceiling
    #[inline]
    pub fn lock(&self) -> OsalResult<()> {
        self.raw.lock()
    }

    /// Acquire the mutex if it is free
    ///
    /// A recursive mutex held by the caller nests and succeeds.
    ///
    /// # Returns
    /// * `Err(OsalError::Busy)` - Held by another task
    #[inline]
    pub fn trylock(&self) -> OsalResult<()> {
        self.raw.trylock()
    }

    /// Release the mutex
    ///
    /// # Returns
    /// * `Err(OsalError::PermissionDenied)` - Caller is not the owner
    ///   (errorcheck, recursive and robust mutexes)
    #[inline]
    pub fn unlock(&self) -> OsalResult<()> {
        self.raw.unlock()
    }

    /// Mark a robust mutex consistent after [`OsalError::OwnerDead`]
    #[inline]
    pub fn consistent(&self) -> OsalResult<()> {
        self.raw.consistent()
    }

    /// Acquire the mutex and release it when the guard drops
    ///
    /// On `OwnerDead` the mutex is held but no guard is
    /// returned; robust mutexes are better driven through [`Mutex::lock`].
    pub fn guard(&self) -> OsalResult<MutexGuard<'_>> {
        self.lock()?;
        Ok(MutexGuard { mutex: self })
    }

    /// Attribute word the mutex was created with
    #[inline]
    pub fn attr(&self) -> MutexAttr {
        self.attr
    }

    /// Destroy the mutex
    ///
    /// # Returns
    /// * `Err(OsalError::MutexIsLocked)` - Mutex is still held; its storage
    ///   is leaked
    pub fn destroy(self) -> OsalResult<()> {
        self.raw.destroy()
    }

    #[inline]
    pub(crate) fn raw(&self) -> &port::Mutex {
        &self.raw
    }
}

/// Scoped lock of a [`Mutex`]
#[must_use = "the mutex is released as soon as the guard is dropped"]
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
}

impl MutexGuard<'_> {
    /// Mutex this guard holds
    #[inline]
    pub fn mutex(&self) -> &Mutex {
        self.mutex
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.mutex.unlock() {
            crate::error!("mutex guard unlock failed: {}", e);
        }
    }
}

impl std::fmt::Debug for Mutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutex").field("attr", &self.attr).finish()
    }
}
