//! Critical section handling for the OSAL
//!
//! Process-wide mutual exclusion for the few global control words the layer
//! keeps (clock selection, the logging sink). Host threads are serialized
//! through the `critical-section` crate's `std` implementation.

use std::cell::RefCell;

pub use critical_section::CriticalSection;

/// Global value guarded by the process-wide critical section
pub type CsMutex<T> = critical_section::Mutex<T>;

/// Execute a closure inside the process-wide critical section
///
/// The closure must not block: every other thread touching global state
/// spins on the same lock.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}

/// Clone the value out of a guarded `RefCell`
pub fn cs_load<T: Clone>(cell: &CsMutex<RefCell<T>>) -> T {
    critical_section(|cs| cell.borrow_ref(cs).clone())
}

/// Replace the value of a guarded `RefCell`, returning the previous one
pub fn cs_replace<T>(cell: &CsMutex<RefCell<T>>, value: T) -> T {
    critical_section(|cs| cell.borrow(cs).replace(value))
}
