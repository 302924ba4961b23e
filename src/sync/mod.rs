//! Synchronization primitives
//!
//! Contains mutexes, spinlocks, condition variables and semaphores. Each
//! handle owns heap storage for its port primitive, so the primitive never
//! moves after initialization. For process-shared use, place the `port`
//! types directly in shared memory instead.

use std::mem::ManuallyDrop;
use std::ops::Deref;

use crate::error::OsalResult;
use crate::port::RawPrimitive;

#[cfg(feature = "sem")]
pub mod sem;
#[cfg(feature = "sem")]
pub mod binary_sem;

#[cfg(feature = "mutex")]
pub mod mutex;
#[cfg(feature = "mutex")]
pub mod spinlock;
#[cfg(feature = "mutex")]
pub mod condvar;

/// Heap-pinned, initialized port primitive
///
/// Destroys the primitive on drop. If the host refuses (e.g. a mutex that is
/// still locked), the storage is leaked rather than freed under a live
/// kernel object.
pub(crate) struct Pinned<P: RawPrimitive> {
    inner: ManuallyDrop<Box<P>>,
}

impl<P: RawPrimitive> Pinned<P> {
    /// Allocate storage and run `init` on its final address
    pub(crate) fn new(init: impl FnOnce(&P) -> OsalResult<()>) -> OsalResult<Self> {
        let inner = Box::new(P::uninit());
        init(&*inner)?;
        Ok(Pinned {
            inner: ManuallyDrop::new(inner),
        })
    }

    /// Destroy now and report the host's answer
    pub(crate) fn destroy(self) -> OsalResult<()> {
        let mut this = ManuallyDrop::new(self);
        this.release()
    }

    fn release(&mut self) -> OsalResult<()> {
        // SAFETY: initialized in `new`; called once from `destroy` or `drop`.
        let result = unsafe { self.inner.destroy() };
        // SAFETY: `inner` is not used after this point.
        let inner = unsafe { ManuallyDrop::take(&mut self.inner) };
        if result.is_err() {
            let _ = Box::leak(inner);
        }
        result
    }
}

impl<P: RawPrimitive> Deref for Pinned<P> {
    type Target = P;

    #[inline]
    fn deref(&self) -> &P {
        &self.inner
    }
}

impl<P: RawPrimitive> Drop for Pinned<P> {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
