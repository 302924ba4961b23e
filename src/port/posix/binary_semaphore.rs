//! Binary semaphore built from a mutex, a condition variable and a flag
//!
//! POSIX has no native single-slot semaphore. The flag is only touched with
//! the embedded mutex held, so `post` stays idempotent and a `timedwait`
//! that races with a `post` still consumes it.

use std::cell::UnsafeCell;

use crate::config::ClockSource;
use crate::error::{OsalError, OsalResult};
use crate::port::{BinarySemaphoreBackend, CondvarBackend, MutexBackend, RawPrimitive};
use crate::time::Timer;
use crate::types::SyncAttr;

use super::{Condvar, Mutex};

/// Host binary semaphore storage
#[repr(C)]
pub struct BinarySemaphore {
    mutex: Mutex,
    cond: Condvar,
    value: UnsafeCell<bool>,
}

// SAFETY: `value` is only accessed with `mutex` held.
unsafe impl Send for BinarySemaphore {}
unsafe impl Sync for BinarySemaphore {}

impl BinarySemaphore {
    /// Run `f` with the mutex held
    fn locked<R>(&self, f: impl FnOnce() -> OsalResult<R>) -> OsalResult<R> {
        self.mutex.lock()?;
        let result = f();
        self.mutex.unlock()?;
        result
    }

    /// Read the flag; the mutex must be held
    #[inline]
    fn value(&self) -> bool {
        // SAFETY: writers hold the same mutex as the caller.
        unsafe { *self.value.get() }
    }

    /// Write the flag; the mutex must be held
    #[inline]
    fn set_value(&self, value: bool) {
        // SAFETY: see `value`.
        unsafe { *self.value.get() = value }
    }
}

impl RawPrimitive for BinarySemaphore {
    fn uninit() -> Self {
        BinarySemaphore {
            mutex: Mutex::uninit(),
            cond: Condvar::uninit(),
            value: UnsafeCell::new(false),
        }
    }

    unsafe fn destroy(&self) -> OsalResult<()> {
        // SAFETY: forwarded caller guarantee.
        let cond = unsafe { self.cond.destroy() };
        let mutex = unsafe { self.mutex.destroy() };
        cond.and(mutex)
    }
}

impl BinarySemaphoreBackend for BinarySemaphore {
    unsafe fn init(&self, attr: SyncAttr, clock: ClockSource) -> OsalResult<()> {
        let inner = SyncAttr::new().with_process_shared(attr.process_shared());

        // SAFETY: storage is pinned by the caller.
        unsafe {
            self.mutex.init(inner)?;
            if let Err(e) = self.cond.init(inner, clock) {
                let _ = self.mutex.destroy();
                return Err(e);
            }
            *self.value.get() = false;
        }
        Ok(())
    }

    fn post(&self) -> OsalResult<()> {
        self.locked(|| {
            self.set_value(true);
            self.cond.signal()
        })
    }

    fn wait(&self) -> OsalResult<()> {
        self.locked(|| {
            while !self.value() {
                self.cond.wait(&self.mutex)?;
            }
            self.set_value(false);
            Ok(())
        })
    }

    fn trywait(&self) -> OsalResult<()> {
        self.locked(|| {
            if self.value() {
                self.set_value(false);
                Ok(())
            } else {
                Err(OsalError::Timeout)
            }
        })
    }

    fn timedwait(&self, deadline: &Timer) -> OsalResult<()> {
        self.locked(|| {
            while !self.value() {
                match self.cond.timedwait(&self.mutex, deadline) {
                    Ok(()) => {}
                    Err(OsalError::Timeout) => break,
                    Err(e) => return Err(e),
                }
            }

            if self.value() {
                self.set_value(false);
                Ok(())
            } else {
                Err(OsalError::Timeout)
            }
        })
    }
}
