//! Time management module
//!
//! Absolute deadlines on the configured clock, deadline arithmetic and
//! sleeps. All blocking calls of the layer take a [`Timer`] deadline.

use std::ops::{Add, AddAssign};

use crate::config::NSEC_PER_SEC;
use crate::error::{OsalError, OsalResult};
use crate::kernel;
use crate::port::{ClockBackend, Host};

/// Absolute point in time on the configured clock
///
/// `nsec` is kept below one second by every operation of this module.
/// Ordering compares `sec` first, then `nsec`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timer {
    pub sec: u64,
    pub nsec: u64,
}

impl Timer {
    /// Build a timer, carrying excess nanoseconds into seconds
    pub const fn new(sec: u64, nsec: u64) -> Self {
        Timer {
            sec: sec + nsec / NSEC_PER_SEC,
            nsec: nsec % NSEC_PER_SEC,
        }
    }

    /// Timer from a nanosecond count
    #[inline]
    pub const fn from_nsec(nsec: u64) -> Self {
        Timer::new(0, nsec)
    }

    /// Nanosecond count, saturating at `u64::MAX`
    #[inline]
    pub const fn as_nsec(&self) -> u64 {
        self.sec
            .saturating_mul(NSEC_PER_SEC)
            .saturating_add(self.nsec)
    }

    /// Current time on the configured clock
    #[inline]
    pub fn now() -> Self {
        Host::now(kernel::clock())
    }

    /// Current time in nanoseconds on the configured clock
    #[inline]
    pub fn now_nsec() -> u64 {
        Timer::now().as_nsec()
    }

    /// Deadline `timeout_ns` nanoseconds from now
    #[inline]
    pub fn with_timeout(timeout_ns: u64) -> Self {
        Timer::now() + timeout_ns
    }

    /// Reset this timer to a deadline `timeout_ns` nanoseconds from now
    pub fn init_with_timeout(&mut self, timeout_ns: u64) {
        *self = Timer::with_timeout(timeout_ns);
    }

    /// Check the deadline
    ///
    /// # Returns
    /// * `Ok(())` - Deadline still lies in the future
    /// * `Err(OsalError::Timeout)` - Deadline reached or passed
    pub fn expired(&self) -> OsalResult<()> {
        if Timer::now() < *self {
            Ok(())
        } else {
            Err(OsalError::Timeout)
        }
    }

    /// Nanoseconds left until the deadline, `0` if it has passed
    pub fn remaining(&self) -> u64 {
        self.saturating_sub(&Timer::now())
    }

    /// Nanoseconds from `earlier` to `self`, `0` if `earlier` is later
    pub fn saturating_sub(&self, earlier: &Timer) -> u64 {
        self.as_nsec().saturating_sub(earlier.as_nsec())
    }

    /// Check the `nsec < 1e9` invariant on a caller-built value
    #[inline]
    pub const fn is_normalized(&self) -> bool {
        self.nsec < NSEC_PER_SEC
    }
}

impl Add for Timer {
    type Output = Timer;

    fn add(self, rhs: Timer) -> Timer {
        let nsec = self.nsec + rhs.nsec;
        Timer {
            sec: self.sec + rhs.sec + nsec / NSEC_PER_SEC,
            nsec: nsec % NSEC_PER_SEC,
        }
    }
}

impl Add<u64> for Timer {
    type Output = Timer;

    /// Add a nanosecond offset
    fn add(self, rhs: u64) -> Timer {
        self + Timer::from_nsec(rhs)
    }
}

impl AddAssign<u64> for Timer {
    fn add_assign(&mut self, rhs: u64) {
        *self = *self + rhs;
    }
}

// ============ Sleeps ============

/// Sleep for `ns` nanoseconds
///
/// The offset is turned into an absolute deadline first, so interruptions
/// do not stretch the total sleep.
pub fn sleep(ns: u64) -> OsalResult<()> {
    sleep_until(&Timer::with_timeout(ns))
}

/// Sleep until an absolute deadline on the configured clock
///
/// Signals interrupting the sleep are absorbed and the sleep resumes until
/// the deadline. A deadline in the past returns immediately.
///
/// # Returns
/// * `Ok(())` - Deadline reached
/// * `Err(OsalError::InvalidParam)` - `nsec` is not below one second
pub fn sleep_until(deadline: &Timer) -> OsalResult<()> {
    if !deadline.is_normalized() {
        return Err(OsalError::InvalidParam);
    }

    Host::sleep_until(kernel::clock(), deadline)
}

/// Sleep until an absolute deadline given in nanoseconds
#[inline]
pub fn sleep_until_nsec(ns: u64) -> OsalResult<()> {
    sleep_until(&Timer::from_nsec(ns))
}
