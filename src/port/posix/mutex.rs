//! pthread mutex back-end

use std::cell::UnsafeCell;

use crate::error::{OsalError, OsalResult};
use crate::port::{MutexBackend, RawPrimitive};
use crate::types::{MutexProtocol, MutexType, SyncAttr};

use super::{attr_check, ffi, unmapped, AttrGuard};

/// Host mutex storage
#[repr(C)]
pub struct Mutex {
    raw: UnsafeCell<libc::pthread_mutex_t>,
}

// SAFETY: pthread mutexes are designed to be shared between threads.
unsafe impl Send for Mutex {}
unsafe impl Sync for Mutex {}

impl Mutex {
    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut libc::pthread_mutex_t {
        self.raw.get()
    }
}

/// Errors shared by lock, trylock and condition waits
pub(crate) fn map_lock_error(call: &str, rc: libc::c_int) -> OsalError {
    match rc {
        libc::EOWNERDEAD => OsalError::OwnerDead,
        libc::ENOTRECOVERABLE => OsalError::NotRecoverable,
        libc::EDEADLK => OsalError::DeadLock,
        libc::EAGAIN => OsalError::SystemLimitReached,
        libc::EINVAL => OsalError::InvalidParam,
        libc::EPERM => OsalError::PermissionDenied,
        e => unmapped(call, e),
    }
}

impl RawPrimitive for Mutex {
    fn uninit() -> Self {
        Mutex {
            raw: UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER),
        }
    }

    unsafe fn destroy(&self) -> OsalResult<()> {
        // SAFETY: caller guarantees a successful `init` and no other users.
        match unsafe { libc::pthread_mutex_destroy(self.as_ptr()) } {
            0 => Ok(()),
            libc::EBUSY => Err(OsalError::MutexIsLocked),
            libc::EINVAL => Err(OsalError::InvalidParam),
            e => Err(unmapped("pthread_mutex_destroy", e)),
        }
    }
}

impl MutexBackend for Mutex {
    unsafe fn init(&self, attr: SyncAttr) -> OsalResult<()> {
        if !attr.is_valid() {
            return Err(OsalError::InvalidParam);
        }

        let mut ma = AttrGuard::new(
            libc::pthread_mutexattr_init,
            libc::pthread_mutexattr_destroy,
        )?;

        let kind = match attr.kind() {
            MutexType::ErrorCheck => libc::PTHREAD_MUTEX_ERRORCHECK,
            MutexType::Recursive => libc::PTHREAD_MUTEX_RECURSIVE,
            _ => libc::PTHREAD_MUTEX_NORMAL,
        };

        // SAFETY: `ma` holds an initialized attribute object.
        unsafe {
            attr_check(
                "pthread_mutexattr_settype",
                libc::pthread_mutexattr_settype(ma.as_mut_ptr(), kind),
            )?;

            if attr.robust() {
                attr_check(
                    "pthread_mutexattr_setrobust",
                    ffi::pthread_mutexattr_setrobust(ma.as_mut_ptr(), ffi::PTHREAD_MUTEX_ROBUST),
                )?;
            }

            if attr.process_shared() {
                attr_check(
                    "pthread_mutexattr_setpshared",
                    libc::pthread_mutexattr_setpshared(
                        ma.as_mut_ptr(),
                        libc::PTHREAD_PROCESS_SHARED,
                    ),
                )?;
            }

            match attr.protocol() {
                MutexProtocol::Inherit => attr_check(
                    "pthread_mutexattr_setprotocol",
                    ffi::pthread_mutexattr_setprotocol(ma.as_mut_ptr(), ffi::PTHREAD_PRIO_INHERIT),
                )?,
                MutexProtocol::Protect => {
                    attr_check(
                        "pthread_mutexattr_setprotocol",
                        ffi::pthread_mutexattr_setprotocol(
                            ma.as_mut_ptr(),
                            ffi::PTHREAD_PRIO_PROTECT,
                        ),
                    )?;
                    attr_check(
                        "pthread_mutexattr_setprioceiling",
                        ffi::pthread_mutexattr_setprioceiling(
                            ma.as_mut_ptr(),
                            libc::c_int::from(attr.prio_ceiling()),
                        ),
                    )?;
                }
                _ => attr_check(
                    "pthread_mutexattr_setprotocol",
                    ffi::pthread_mutexattr_setprotocol(ma.as_mut_ptr(), ffi::PTHREAD_PRIO_NONE),
                )?,
            }
        }

        // SAFETY: storage is pinned by the caller and `ma` is initialized.
        match unsafe { libc::pthread_mutex_init(self.as_ptr(), ma.as_ptr()) } {
            0 => Ok(()),
            libc::EAGAIN => Err(OsalError::SystemLimitReached),
            libc::ENOMEM => Err(OsalError::OutOfMemory),
            libc::EPERM => Err(OsalError::PermissionDenied),
            libc::EINVAL => Err(OsalError::InvalidParam),
            libc::ENOTSUP => Err(OsalError::NotImplemented),
            e => Err(unmapped("pthread_mutex_init", e)),
        }
    }

    fn lock(&self) -> OsalResult<()> {
        // SAFETY: `self` was initialized by the owning handle.
        match unsafe { libc::pthread_mutex_lock(self.as_ptr()) } {
            0 => Ok(()),
            e => Err(map_lock_error("pthread_mutex_lock", e)),
        }
    }

    fn trylock(&self) -> OsalResult<()> {
        // SAFETY: as above.
        match unsafe { libc::pthread_mutex_trylock(self.as_ptr()) } {
            0 => Ok(()),
            libc::EBUSY => Err(OsalError::Busy),
            e => Err(map_lock_error("pthread_mutex_trylock", e)),
        }
    }

    fn unlock(&self) -> OsalResult<()> {
        // SAFETY: as above.
        match unsafe { libc::pthread_mutex_unlock(self.as_ptr()) } {
            0 => Ok(()),
            libc::EPERM => Err(OsalError::PermissionDenied),
            libc::EINVAL => Err(OsalError::InvalidParam),
            e => Err(unmapped("pthread_mutex_unlock", e)),
        }
    }

    fn consistent(&self) -> OsalResult<()> {
        // SAFETY: as above.
        match unsafe { ffi::pthread_mutex_consistent(self.as_ptr()) } {
            0 => Ok(()),
            libc::EINVAL => Err(OsalError::InvalidParam),
            e => Err(unmapped("pthread_mutex_consistent", e)),
        }
    }
}
