//! Error types for the OSAL
//!
//! Every fallible operation returns an [`OsalResult`]. The discriminants are
//! the negative return codes of the C-level ABI and double as process exit
//! codes for the command-line tools.

use thiserror::Error;

/// OSAL error type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[repr(i32)]
pub enum OsalError {
    // ============ Generic errors ============
    /// Host call failed for an unclassified reason
    #[error("operation failed")]
    OperationFailed = -1,
    /// Null handle, out-of-range value or malformed name
    #[error("invalid parameter")]
    InvalidParam = -2,
    /// Access rights or ownership do not allow the operation
    #[error("permission denied")]
    PermissionDenied = -3,
    /// File descriptor, thread or object limit hit
    #[error("system limit reached")]
    SystemLimitReached = -4,
    /// Absolute deadline expired
    #[error("timeout")]
    Timeout = -5,
    /// Resource temporarily unavailable
    #[error("unavailable")]
    Unavailable = -6,
    /// Host ran out of memory
    #[error("out of memory")]
    OutOfMemory = -7,

    // ============ Mutex errors ============
    /// Robust mutex whose owner died was unlocked without being made consistent
    #[error("not recoverable")]
    NotRecoverable = -8,
    /// Previous owner died holding the mutex; caller now owns it
    #[error("owner dead")]
    OwnerDead = -9,
    /// Relock of an errorcheck mutex by its owner
    #[error("deadlock")]
    DeadLock = -10,

    // ============ Wait errors ============
    /// Non-blocking variant would have blocked
    #[error("busy")]
    Busy = -11,
    /// Named object does not exist
    #[error("not found")]
    NotFound = -12,
    /// Host cannot provide this capability
    #[error("not implemented")]
    NotImplemented = -13,
    /// Nothing to report
    #[error("no data")]
    NoData = -14,
    /// Blocking call was interrupted by a signal
    #[error("interrupted")]
    Interrupted = -15,
    /// Destroy of a mutex that is still held
    #[error("mutex is locked")]
    MutexIsLocked = -16,
}

impl OsalError {
    /// Numeric return code
    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Decode a numeric return code; `0` and unknown codes yield `None`
    pub const fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            -1 => OsalError::OperationFailed,
            -2 => OsalError::InvalidParam,
            -3 => OsalError::PermissionDenied,
            -4 => OsalError::SystemLimitReached,
            -5 => OsalError::Timeout,
            -6 => OsalError::Unavailable,
            -7 => OsalError::OutOfMemory,
            -8 => OsalError::NotRecoverable,
            -9 => OsalError::OwnerDead,
            -10 => OsalError::DeadLock,
            -11 => OsalError::Busy,
            -12 => OsalError::NotFound,
            -13 => OsalError::NotImplemented,
            -14 => OsalError::NoData,
            -15 => OsalError::Interrupted,
            -16 => OsalError::MutexIsLocked,
            _ => return None,
        })
    }
}

/// Result type for OSAL operations
pub type OsalResult<T> = Result<T, OsalError>;

/// Return code of a result: `0` on success, the negative error code otherwise
#[inline]
pub fn retval<T>(result: &OsalResult<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.code(),
    }
}
