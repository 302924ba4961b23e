//! pthread spinlock back-end
//!
//! Only the process-shared bit of the attribute word has a meaning here.

use std::cell::UnsafeCell;

use crate::error::{OsalError, OsalResult};
use crate::port::{RawPrimitive, SpinlockBackend};
use crate::types::{MutexProtocol, MutexType, SyncAttr};

use super::unmapped;

/// Host spinlock storage
#[repr(C)]
pub struct Spinlock {
    raw: UnsafeCell<libc::pthread_spinlock_t>,
}

// SAFETY: pthread spinlocks are designed to be shared between threads.
unsafe impl Send for Spinlock {}
unsafe impl Sync for Spinlock {}

impl Spinlock {
    #[inline]
    fn as_ptr(&self) -> *mut libc::pthread_spinlock_t {
        self.raw.get()
    }
}

impl RawPrimitive for Spinlock {
    fn uninit() -> Self {
        Spinlock {
            raw: UnsafeCell::new(0),
        }
    }

    unsafe fn destroy(&self) -> OsalResult<()> {
        // SAFETY: caller guarantees a successful `init` and no users.
        match unsafe { libc::pthread_spin_destroy(self.as_ptr()) } {
            0 => Ok(()),
            libc::EBUSY => Err(OsalError::Busy),
            libc::EINVAL => Err(OsalError::InvalidParam),
            e => Err(unmapped("pthread_spin_destroy", e)),
        }
    }
}

impl SpinlockBackend for Spinlock {
    unsafe fn init(&self, attr: SyncAttr) -> OsalResult<()> {
        if !attr.is_valid() {
            return Err(OsalError::InvalidParam);
        }

        if attr.robust()
            || attr.kind() != MutexType::Normal
            || attr.protocol() != MutexProtocol::None
        {
            return Err(OsalError::NotImplemented);
        }

        let pshared = if attr.process_shared() {
            libc::PTHREAD_PROCESS_SHARED
        } else {
            libc::PTHREAD_PROCESS_PRIVATE
        };

        // SAFETY: storage is pinned by the caller.
        match unsafe { libc::pthread_spin_init(self.as_ptr(), pshared) } {
            0 => Ok(()),
            libc::EAGAIN => Err(OsalError::SystemLimitReached),
            libc::ENOMEM => Err(OsalError::OutOfMemory),
            e => Err(unmapped("pthread_spin_init", e)),
        }
    }

    fn lock(&self) -> OsalResult<()> {
        // SAFETY: initialized by the owning handle.
        match unsafe { libc::pthread_spin_lock(self.as_ptr()) } {
            0 => Ok(()),
            libc::EDEADLK => Err(OsalError::DeadLock),
            e => Err(unmapped("pthread_spin_lock", e)),
        }
    }

    fn trylock(&self) -> OsalResult<()> {
        // SAFETY: initialized by the owning handle.
        match unsafe { libc::pthread_spin_trylock(self.as_ptr()) } {
            0 => Ok(()),
            libc::EBUSY => Err(OsalError::Busy),
            e => Err(unmapped("pthread_spin_trylock", e)),
        }
    }

    fn unlock(&self) -> OsalResult<()> {
        // SAFETY: initialized by the owning handle.
        match unsafe { libc::pthread_spin_unlock(self.as_ptr()) } {
            0 => Ok(()),
            libc::EPERM => Err(OsalError::PermissionDenied),
            e => Err(unmapped("pthread_spin_unlock", e)),
        }
    }
}
