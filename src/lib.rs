//! Operating system abstraction layer
//!
//! A thin, uniform layer over the host kernel providing:
//! - Tasks with name, scheduling policy, priority and CPU affinity
//! - Synchronization primitives (mutexes, spinlocks, semaphores,
//!   condition variables), optionally robust and process-shared
//! - Absolute-deadline timers on a process-wide clock
//! - Named message queues and shared memory
//! - A double-buffered timing trace and a shared memory logging sink
//!
//! Every fallible operation returns [`OsalResult`]; the error codes are the
//! closed set of [`OsalError`].

#![deny(unsafe_op_in_unsafe_fn)]

// ============ Modules ============

pub mod log;

#[cfg(feature = "log")]
#[doc(hidden)]
pub use ::log as __log;

pub mod core;
pub mod port;

#[cfg(any(feature = "sem", feature = "mutex"))]
pub mod sync;

#[cfg(any(feature = "mq", feature = "shm"))]
pub mod ipc;

#[cfg(feature = "trace")]
pub mod trace;

#[cfg(feature = "io")]
pub mod io;

// ============ Re-exports ============

pub use crate::core::config;
pub use crate::core::config::{ClockSource, OsalConfig};
pub use crate::core::critical;
pub use crate::core::error;
pub use crate::core::error::{retval, OsalError, OsalResult};
pub use crate::core::kernel;
pub use crate::core::kernel::{destroy, init};
pub use crate::core::prio;
pub use crate::core::sched;
pub use crate::core::task;
pub use crate::core::time;
pub use crate::core::time::Timer;
pub use crate::core::types;

#[cfg(feature = "sem")]
pub use sync::{binary_sem::BinarySemaphore, sem::Semaphore};
#[cfg(feature = "mutex")]
pub use sync::{condvar::Condvar, mutex::Mutex, spinlock::Spinlock};

#[cfg(feature = "mq")]
pub use ipc::mq::MessageQueue;
#[cfg(feature = "shm")]
pub use ipc::shm::SharedMemory;
