//! POSIX port for Linux
//!
//! pthread, POSIX semaphore, `mq_*` and `shm_*` based back-end. Host error
//! numbers are translated per call; unknown values end up as
//! [`OsalError::OperationFailed`] and are logged.

mod binary_semaphore;
mod clock;
mod condvar;
mod mq;
mod mutex;
mod semaphore;
mod shm;
mod spinlock;
mod thread;

pub use binary_semaphore::BinarySemaphore;
pub use condvar::Condvar;
pub use mq::MessageQueue;
pub use mutex::Mutex;
pub use semaphore::Semaphore;
pub use shm::SharedMemory;
pub use spinlock::Spinlock;

use crate::config::ClockSource;
use crate::error::{OsalError, OsalResult};
use crate::kernel;
use crate::port::ClockBackend;
use crate::time::Timer;

/// POSIX host
#[derive(Debug, Clone, Copy)]
pub struct Posix;

// glibc entry points and constants not covered by the `libc` crate.
mod ffi {
    use libc::{c_int, c_void, pthread_attr_t, pthread_mutex_t, pthread_mutexattr_t, pthread_t};

    /// Thread entry that lets cancellation unwind through it
    pub type StartRoutine = extern "C-unwind" fn(*mut c_void) -> *mut c_void;

    pub const PTHREAD_MUTEX_ROBUST: c_int = 1;
    pub const PTHREAD_PRIO_NONE: c_int = 0;
    pub const PTHREAD_PRIO_INHERIT: c_int = 1;
    pub const PTHREAD_PRIO_PROTECT: c_int = 2;
    pub const PTHREAD_CANCELED: *mut c_void = -1isize as *mut c_void;

    extern "C" {
        pub fn pthread_mutexattr_setrobust(attr: *mut pthread_mutexattr_t, robust: c_int) -> c_int;
        pub fn pthread_mutexattr_setprotocol(attr: *mut pthread_mutexattr_t, protocol: c_int) -> c_int;
        pub fn pthread_mutexattr_setprioceiling(attr: *mut pthread_mutexattr_t, ceiling: c_int) -> c_int;
        pub fn pthread_mutex_consistent(mutex: *mut pthread_mutex_t) -> c_int;
        pub fn pthread_cancel(thread: pthread_t) -> c_int;
        pub fn pthread_getname_np(thread: pthread_t, name: *mut libc::c_char, len: libc::size_t) -> c_int;
        pub fn pthread_create(
            native: *mut pthread_t,
            attr: *const pthread_attr_t,
            f: StartRoutine,
            value: *mut c_void,
        ) -> c_int;
    }

    extern "C-unwind" {
        pub fn pthread_exit(value: *mut c_void) -> !;
    }
}

/// `errno` of the last failed call on this thread
#[inline]
pub(crate) fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Fallback for host errors without a dedicated mapping
#[cold]
pub(crate) fn unmapped(call: &str, err: i32) -> OsalError {
    crate::warn!("{} failed with unmapped errno {}", call, err);
    OsalError::OperationFailed
}

#[inline]
pub(crate) fn clock_id(clock: ClockSource) -> libc::clockid_t {
    match clock {
        ClockSource::Monotonic => libc::CLOCK_MONOTONIC,
        ClockSource::Realtime => libc::CLOCK_REALTIME,
    }
}

#[inline]
pub(crate) fn to_timespec(t: &Timer) -> libc::timespec {
    libc::timespec {
        tv_sec: t.sec as libc::time_t,
        tv_nsec: t.nsec as libc::c_long,
    }
}

/// Deadline for calls that only accept `CLOCK_REALTIME`
///
/// Monotonic deadlines are shifted by the current distance between the two
/// clocks. Call again after every interruption so the shift stays fresh.
pub(crate) fn realtime_deadline(deadline: &Timer) -> OsalResult<libc::timespec> {
    if !deadline.is_normalized() {
        return Err(OsalError::InvalidParam);
    }

    match kernel::clock() {
        ClockSource::Realtime => Ok(to_timespec(deadline)),
        ClockSource::Monotonic => {
            let now_mono = Posix::now(ClockSource::Monotonic);
            let now_rt = Posix::now(ClockSource::Realtime);
            let remaining = deadline.saturating_sub(&now_mono);
            Ok(to_timespec(&(now_rt + remaining)))
        }
    }
}

/// RAII owner of an initialized pthread attribute object
pub(crate) struct AttrGuard<T> {
    attr: std::mem::MaybeUninit<T>,
    destroy: unsafe extern "C" fn(*mut T) -> libc::c_int,
}

impl<T> AttrGuard<T> {
    pub(crate) fn new(
        init: unsafe extern "C" fn(*mut T) -> libc::c_int,
        destroy: unsafe extern "C" fn(*mut T) -> libc::c_int,
    ) -> OsalResult<Self> {
        let mut attr = std::mem::MaybeUninit::<T>::uninit();
        // SAFETY: `init` fully initializes the attribute object on success.
        match unsafe { init(attr.as_mut_ptr()) } {
            0 => Ok(AttrGuard { attr, destroy }),
            libc::ENOMEM => Err(OsalError::OutOfMemory),
            e => Err(unmapped("attr_init", e)),
        }
    }

    #[inline]
    pub(crate) fn as_mut_ptr(&mut self) -> *mut T {
        self.attr.as_mut_ptr()
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *const T {
        self.attr.as_ptr()
    }
}

impl<T> Drop for AttrGuard<T> {
    fn drop(&mut self) {
        // SAFETY: the object was initialized in `new`.
        unsafe { (self.destroy)(self.attr.as_mut_ptr()) };
    }
}

/// Map the return value of an attribute setter
#[inline]
pub(crate) fn attr_check(call: &str, rc: libc::c_int) -> OsalResult<()> {
    match rc {
        0 => Ok(()),
        libc::EINVAL => Err(OsalError::InvalidParam),
        libc::ENOTSUP => Err(OsalError::NotImplemented),
        e => Err(unmapped(call, e)),
    }
}
