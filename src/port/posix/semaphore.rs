//! POSIX unnamed semaphore back-end
//!
//! `wait` reports signal interruption as [`OsalError::Interrupted`] while
//! `timedwait` keeps waiting until its deadline.

use std::cell::UnsafeCell;

use crate::error::{OsalError, OsalResult};
use crate::port::{RawPrimitive, SemaphoreBackend};
use crate::time::Timer;
use crate::types::SyncAttr;

use super::{errno, realtime_deadline, unmapped};

/// Host counting semaphore storage
#[repr(C)]
pub struct Semaphore {
    raw: UnsafeCell<libc::sem_t>,
}

// SAFETY: POSIX semaphores are designed to be shared between threads.
unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

impl Semaphore {
    #[inline]
    fn as_ptr(&self) -> *mut libc::sem_t {
        self.raw.get()
    }
}

impl RawPrimitive for Semaphore {
    fn uninit() -> Self {
        Semaphore {
            // SAFETY: all-zero is a valid bit pattern for the plain C struct.
            raw: UnsafeCell::new(unsafe { std::mem::zeroed() }),
        }
    }

    unsafe fn destroy(&self) -> OsalResult<()> {
        // SAFETY: caller guarantees a successful `init` and no waiters.
        if unsafe { libc::sem_destroy(self.as_ptr()) } == 0 {
            return Ok(());
        }

        match errno() {
            libc::EINVAL => Err(OsalError::InvalidParam),
            e => Err(unmapped("sem_destroy", e)),
        }
    }
}

impl SemaphoreBackend for Semaphore {
    unsafe fn init(&self, attr: SyncAttr, value: u32) -> OsalResult<()> {
        let pshared = libc::c_int::from(attr.process_shared());

        // SAFETY: storage is pinned by the caller.
        if unsafe { libc::sem_init(self.as_ptr(), pshared, value) } == 0 {
            return Ok(());
        }

        match errno() {
            libc::EINVAL => Err(OsalError::InvalidParam),
            libc::ENOSYS => Err(OsalError::NotImplemented),
            e => Err(unmapped("sem_init", e)),
        }
    }

    fn post(&self) -> OsalResult<()> {
        // SAFETY: initialized by the owning handle.
        if unsafe { libc::sem_post(self.as_ptr()) } == 0 {
            return Ok(());
        }

        match errno() {
            libc::EOVERFLOW => Err(OsalError::OperationFailed),
            libc::EINVAL => Err(OsalError::InvalidParam),
            e => Err(unmapped("sem_post", e)),
        }
    }

    fn wait(&self) -> OsalResult<()> {
        // SAFETY: initialized by the owning handle.
        if unsafe { libc::sem_wait(self.as_ptr()) } == 0 {
            return Ok(());
        }

        match errno() {
            libc::EINTR => Err(OsalError::Interrupted),
            libc::EINVAL => Err(OsalError::InvalidParam),
            e => Err(unmapped("sem_wait", e)),
        }
    }

    fn trywait(&self) -> OsalResult<()> {
        // SAFETY: initialized by the owning handle.
        if unsafe { libc::sem_trywait(self.as_ptr()) } == 0 {
            return Ok(());
        }

        match errno() {
            libc::EAGAIN => Err(OsalError::Busy),
            libc::EINTR => Err(OsalError::Interrupted),
            libc::EINVAL => Err(OsalError::InvalidParam),
            e => Err(unmapped("sem_trywait", e)),
        }
    }

    fn timedwait(&self, deadline: &Timer) -> OsalResult<()> {
        loop {
            let ts = realtime_deadline(deadline)?;

            // SAFETY: initialized by the owning handle; `ts` is valid.
            if unsafe { libc::sem_timedwait(self.as_ptr(), &ts) } == 0 {
                return Ok(());
            }

            match errno() {
                libc::EINTR => continue,
                libc::ETIMEDOUT => return Err(OsalError::Timeout),
                libc::EINVAL => return Err(OsalError::InvalidParam),
                e => return Err(unmapped("sem_timedwait", e)),
            }
        }
    }

    fn value(&self) -> OsalResult<u32> {
        let mut value: libc::c_int = 0;

        // SAFETY: initialized by the owning handle.
        if unsafe { libc::sem_getvalue(self.as_ptr(), &mut value) } == 0 {
            return Ok(value.max(0) as u32);
        }

        match errno() {
            libc::EINVAL => Err(OsalError::InvalidParam),
            e => Err(unmapped("sem_getvalue", e)),
        }
    }
}
