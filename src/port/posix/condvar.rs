//! pthread condition variable back-end

use std::cell::UnsafeCell;

use crate::config::ClockSource;
use crate::error::{OsalError, OsalResult};
use crate::port::{CondvarBackend, RawPrimitive};
use crate::time::Timer;
use crate::types::SyncAttr;

use super::mutex::{map_lock_error, Mutex};
use super::{attr_check, clock_id, to_timespec, unmapped, AttrGuard};

/// Host condition variable storage
#[repr(C)]
pub struct Condvar {
    raw: UnsafeCell<libc::pthread_cond_t>,
}

// SAFETY: pthread condition variables are designed to be shared.
unsafe impl Send for Condvar {}
unsafe impl Sync for Condvar {}

impl Condvar {
    #[inline]
    fn as_ptr(&self) -> *mut libc::pthread_cond_t {
        self.raw.get()
    }
}

impl RawPrimitive for Condvar {
    fn uninit() -> Self {
        Condvar {
            raw: UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER),
        }
    }

    unsafe fn destroy(&self) -> OsalResult<()> {
        // SAFETY: caller guarantees a successful `init` and no waiters.
        match unsafe { libc::pthread_cond_destroy(self.as_ptr()) } {
            0 => Ok(()),
            libc::EBUSY => Err(OsalError::Busy),
            libc::EINVAL => Err(OsalError::InvalidParam),
            e => Err(unmapped("pthread_cond_destroy", e)),
        }
    }
}

impl CondvarBackend for Condvar {
    type Mutex = Mutex;

    unsafe fn init(&self, attr: SyncAttr, clock: ClockSource) -> OsalResult<()> {
        let mut ca = AttrGuard::new(
            libc::pthread_condattr_init,
            libc::pthread_condattr_destroy,
        )?;

        // SAFETY: `ca` holds an initialized attribute object.
        unsafe {
            if attr.process_shared() {
                attr_check(
                    "pthread_condattr_setpshared",
                    libc::pthread_condattr_setpshared(ca.as_mut_ptr(), libc::PTHREAD_PROCESS_SHARED),
                )?;
            }

            attr_check(
                "pthread_condattr_setclock",
                libc::pthread_condattr_setclock(ca.as_mut_ptr(), clock_id(clock)),
            )?;
        }

        // SAFETY: storage is pinned by the caller and `ca` is initialized.
        match unsafe { libc::pthread_cond_init(self.as_ptr(), ca.as_ptr()) } {
            0 => Ok(()),
            libc::EAGAIN => Err(OsalError::SystemLimitReached),
            libc::ENOMEM => Err(OsalError::OutOfMemory),
            libc::EINVAL => Err(OsalError::InvalidParam),
            e => Err(unmapped("pthread_cond_init", e)),
        }
    }

    fn wait(&self, mutex: &Mutex) -> OsalResult<()> {
        // SAFETY: both objects were initialized by their owning handles.
        match unsafe { libc::pthread_cond_wait(self.as_ptr(), mutex.as_ptr()) } {
            0 => Ok(()),
            e => Err(map_lock_error("pthread_cond_wait", e)),
        }
    }

    fn timedwait(&self, mutex: &Mutex, deadline: &Timer) -> OsalResult<()> {
        if !deadline.is_normalized() {
            return Err(OsalError::InvalidParam);
        }

        // The condvar was created on the pinned clock, so the deadline is
        // passed through unchanged.
        let ts = to_timespec(deadline);

        // SAFETY: as above; `ts` is a valid timespec.
        match unsafe { libc::pthread_cond_timedwait(self.as_ptr(), mutex.as_ptr(), &ts) } {
            0 => Ok(()),
            libc::ETIMEDOUT => Err(OsalError::Timeout),
            e => Err(map_lock_error("pthread_cond_timedwait", e)),
        }
    }

    fn signal(&self) -> OsalResult<()> {
        // SAFETY: initialized by the owning handle.
        match unsafe { libc::pthread_cond_signal(self.as_ptr()) } {
            0 => Ok(()),
            libc::EINVAL => Err(OsalError::InvalidParam),
            e => Err(unmapped("pthread_cond_signal", e)),
        }
    }

    fn broadcast(&self) -> OsalResult<()> {
        // SAFETY: initialized by the owning handle.
        match unsafe { libc::pthread_cond_broadcast(self.as_ptr()) } {
            0 => Ok(()),
            libc::EINVAL => Err(OsalError::InvalidParam),
            e => Err(unmapped("pthread_cond_broadcast", e)),
        }
    }
}
