//! Logging macros for the OSAL
//!
//! Internal diagnostics go through the `log` facade when the `log` feature
//! is enabled and compile to nothing otherwise. The library never installs
//! a logger; applications pick one.

/// Debug message
#[cfg(feature = "log")]
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => { $crate::__log::debug!(target: "osal", $($arg)*) };
}

/// Info message
#[cfg(feature = "log")]
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { $crate::__log::info!(target: "osal", $($arg)*) };
}

/// Error message
#[cfg(feature = "log")]
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { $crate::__log::error!(target: "osal", $($arg)*) };
}

/// Trace message
#[cfg(feature = "log")]
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => { $crate::__log::trace!(target: "osal", $($arg)*) };
}

/// Warning message
#[cfg(feature = "log")]
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { $crate::__log::warn!(target: "osal", $($arg)*) };
}

// No-op versions when logging is disabled; arguments are still type-checked
#[cfg(not(feature = "log"))]
#[macro_export]
macro_rules! debug { ($($arg:tt)*) => { { let _ = format_args!($($arg)*); } }; }
#[cfg(not(feature = "log"))]
#[macro_export]
macro_rules! info { ($($arg:tt)*) => { { let _ = format_args!($($arg)*); } }; }
#[cfg(not(feature = "log"))]
#[macro_export]
macro_rules! error { ($($arg:tt)*) => { { let _ = format_args!($($arg)*); } }; }
#[cfg(not(feature = "log"))]
#[macro_export]
macro_rules! trace { ($($arg:tt)*) => { { let _ = format_args!($($arg)*); } }; }
#[cfg(not(feature = "log"))]
#[macro_export]
macro_rules! warn { ($($arg:tt)*) => { { let _ = format_args!($($arg)*); } }; }
