//! Global OSAL state and initialization
//!
//! Holds the process-wide clock selection. The clock may be chosen freely
//! until the first condition variable (or binary semaphore, which embeds one)
//! is initialized; from then on it is pinned so that every condition
//! variable and every deadline computed by [`crate::time::Timer`] agree.

use portable_atomic::{AtomicBool, AtomicU8, Ordering};

use crate::config::{ClockSource, OsalConfig};
use crate::critical::critical_section;
use crate::error::{OsalError, OsalResult};

// ============ Kernel State Structures ============

/// Atomic process flags
pub struct KernelFlags {
    initialized: AtomicBool,
    clock: AtomicU8,
    clock_pinned: AtomicBool,
}

impl KernelFlags {
    const fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            clock: AtomicU8::new(CLOCK_MONOTONIC),
            clock_pinned: AtomicBool::new(false),
        }
    }

    /// Check if [`init`] has run
    #[inline(always)]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Currently configured clock
    #[inline(always)]
    pub fn clock(&self) -> ClockSource {
        match self.clock.load(Ordering::Acquire) {
            CLOCK_REALTIME => ClockSource::Realtime,
            _ => ClockSource::Monotonic,
        }
    }

    /// Check if a condition variable has fixed the clock
    #[inline(always)]
    pub fn is_clock_pinned(&self) -> bool {
        self.clock_pinned.load(Ordering::Acquire)
    }
}

const CLOCK_MONOTONIC: u8 = 0;
const CLOCK_REALTIME: u8 = 1;

// ============ Global Instances ============

/// Global state instance
pub(crate) static KERNEL: KernelFlags = KernelFlags::new();

// ============ Public API ============

/// Initialize the OSAL for this process
///
/// May be called more than once; later calls must not change the clock
/// after it has been pinned.
///
/// # Returns
/// * `Ok(())` - Configuration applied
/// * `Err(OsalError::Busy)` - A condition variable already uses another clock
pub fn init(config: OsalConfig) -> OsalResult<()> {
    set_clock(config.clock)?;
    KERNEL.initialized.store(true, Ordering::Release);
    crate::debug!("osal initialized with {:?} clock", config.clock);
    Ok(())
}

/// Tear down process state set up by [`init`]
pub fn destroy() -> OsalResult<()> {
    KERNEL.initialized.store(false, Ordering::Release);
    Ok(())
}

/// Currently configured clock
#[inline]
pub fn clock() -> ClockSource {
    KERNEL.clock()
}

/// Select the clock for deadlines and condition variables
///
/// # Returns
/// * `Ok(())` - Clock selected (or unchanged)
/// * `Err(OsalError::Busy)` - Clock is pinned to the other source
pub fn set_clock(clock: ClockSource) -> OsalResult<()> {
    critical_section(|_cs| {
        if KERNEL.is_clock_pinned() && KERNEL.clock() != clock {
            return Err(OsalError::Busy);
        }

        let raw = match clock {
            ClockSource::Monotonic => CLOCK_MONOTONIC,
            ClockSource::Realtime => CLOCK_REALTIME,
        };
        KERNEL.clock.store(raw, Ordering::Release);
        Ok(())
    })
}

/// Pin the clock and return it; called when a condition variable is set up
pub(crate) fn pin_clock() -> ClockSource {
    critical_section(|_cs| {
        KERNEL.clock_pinned.store(true, Ordering::Release);
        KERNEL.clock()
    })
}
