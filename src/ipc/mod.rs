//! Inter-process communication
//!
//! Named POSIX message queues and shared memory objects. Names follow the
//! `/name` convention and stay in the system until unlinked.

use std::ffi::CString;

use crate::error::{OsalError, OsalResult};

#[cfg(feature = "mq")]
pub mod mq;
#[cfg(feature = "shm")]
pub mod shm;

/// Convert a validated name to the host representation
fn host_name(name: &str, max: usize) -> OsalResult<CString> {
    let body = name.strip_prefix('/').ok_or(OsalError::InvalidParam)?;
    if body.is_empty() || body.len() > max || body.contains('/') {
        return Err(OsalError::InvalidParam);
    }
    CString::new(name).map_err(|_| OsalError::InvalidParam)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_name() {
        assert!(host_name("/queue", 255).is_ok());
        assert_eq!(host_name("queue", 255), Err(OsalError::InvalidParam));
        assert_eq!(host_name("/", 255), Err(OsalError::InvalidParam));
        assert_eq!(host_name("/a/b", 255), Err(OsalError::InvalidParam));
        assert_eq!(host_name("/a\0b", 255), Err(OsalError::InvalidParam));
        assert_eq!(host_name("/abcd", 3), Err(OsalError::InvalidParam));
    }
}
