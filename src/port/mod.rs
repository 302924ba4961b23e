//! Port layer
//!
//! One trait per primitive, implemented once per host family. The safe
//! handles in [`crate::sync`], [`crate::ipc`] and [`crate::task`] talk to the
//! host only through these traits; the back-end selected for the build is
//! re-exported here as `port::Mutex`, `port::Semaphore`, ...
//!
//! In-place primitives (mutex, spinlock, semaphores, condition variable) are
//! `#[repr(C)]` storage that is initialized through `&self` and must not move
//! between `init` and `destroy`. They carry no destructor of their own, which
//! lets them live inside shared memory mapped by several processes.

use std::any::Any;
use std::ffi::CStr;
use std::fmt;
use std::ptr::NonNull;

use crate::config::ClockSource;
use crate::error::OsalResult;
use crate::prio::CpuSet;
use crate::time::Timer;
use crate::types::{
    MqAttr, MsgPrio, Priority, SchedPolicy, ShmAttr, ShmMapAttr, SyncAttr, TaskState,
};

#[cfg(target_os = "linux")]
pub mod posix;

#[cfg(target_os = "linux")]
pub use posix::{
    BinarySemaphore, Condvar, MessageQueue, Mutex, Posix as Host, Semaphore, SharedMemory,
    Spinlock,
};

#[cfg(not(target_os = "linux"))]
compile_error!("no port available for this host; only Linux/POSIX is supported");

// ============ In-place primitives ============

/// Storage shared by every in-place primitive
pub trait RawPrimitive: Send + Sync {
    /// Storage that has not been initialized yet
    fn uninit() -> Self
    where
        Self: Sized;

    /// Release host resources
    ///
    /// # Safety
    /// Must follow a successful `init`, at most once, with no thread
    /// using the primitive anymore.
    unsafe fn destroy(&self) -> OsalResult<()>;
}

pub trait MutexBackend: RawPrimitive {
    /// # Safety
    /// `self` must not move until `destroy`.
    unsafe fn init(&self, attr: SyncAttr) -> OsalResult<()>;
    fn lock(&self) -> OsalResult<()>;
    fn trylock(&self) -> OsalResult<()>;
    fn unlock(&self) -> OsalResult<()>;
    /// Mark a robust mutex whose owner died as consistent again
    fn consistent(&self) -> OsalResult<()>;
}

pub trait SpinlockBackend: RawPrimitive {
    /// # Safety
    /// `self` must not move until `destroy`.
    unsafe fn init(&self, attr: SyncAttr) -> OsalResult<()>;
    fn lock(&self) -> OsalResult<()>;
    fn trylock(&self) -> OsalResult<()>;
    fn unlock(&self) -> OsalResult<()>;
}

pub trait SemaphoreBackend: RawPrimitive {
    /// # Safety
    /// `self` must not move until `destroy`.
    unsafe fn init(&self, attr: SyncAttr, value: u32) -> OsalResult<()>;
    fn post(&self) -> OsalResult<()>;
    fn wait(&self) -> OsalResult<()>;
    fn trywait(&self) -> OsalResult<()>;
    fn timedwait(&self, deadline: &Timer) -> OsalResult<()>;
    fn value(&self) -> OsalResult<u32>;
}

pub trait BinarySemaphoreBackend: RawPrimitive {
    /// # Safety
    /// `self` must not move until `destroy`.
    unsafe fn init(&self, attr: SyncAttr, clock: ClockSource) -> OsalResult<()>;
    fn post(&self) -> OsalResult<()>;
    fn wait(&self) -> OsalResult<()>;
    fn trywait(&self) -> OsalResult<()>;
    fn timedwait(&self, deadline: &Timer) -> OsalResult<()>;
}

pub trait CondvarBackend: RawPrimitive {
    type Mutex: MutexBackend;

    /// # Safety
    /// `self` must not move until `destroy`.
    unsafe fn init(&self, attr: SyncAttr, clock: ClockSource) -> OsalResult<()>;
    fn wait(&self, mutex: &Self::Mutex) -> OsalResult<()>;
    fn timedwait(&self, mutex: &Self::Mutex, deadline: &Timer) -> OsalResult<()>;
    fn signal(&self) -> OsalResult<()>;
    fn broadcast(&self) -> OsalResult<()>;
}

// ============ Clock ============

pub trait ClockBackend {
    fn now(clock: ClockSource) -> Timer;
    /// Sleep until `deadline`, resuming after interruptions
    fn sleep_until(clock: ClockSource, deadline: &Timer) -> OsalResult<()>;
}

// ============ Tasks ============

/// Value produced by a task entry, type-erased for the port
pub type TaskOutput = Box<dyn Any + Send + 'static>;

/// Work run by a new host thread
pub type TaskEntry = Box<dyn FnOnce() -> TaskOutput + Send + 'static>;

pub trait TaskBackend {
    type Id: Copy + Eq + Send + Sync + fmt::Debug;

    /// Start a host thread running `entry`
    fn spawn(entry: TaskEntry) -> OsalResult<Self::Id>;

    /// Wait for a thread; `None` when it was cancelled or exited early
    ///
    /// # Safety
    /// `id` must come from `spawn` and not have been joined yet.
    unsafe fn join(id: Self::Id) -> OsalResult<Option<TaskOutput>>;

    /// Request asynchronous cancellation
    ///
    /// # Safety
    /// `id` must come from `spawn` and not have been joined yet.
    unsafe fn cancel(id: Self::Id) -> OsalResult<()>;

    /// Let the thread release its resources on exit without a join
    ///
    /// # Safety
    /// `id` must come from `spawn` and not have been joined yet.
    unsafe fn detach(id: Self::Id) -> OsalResult<()>;

    fn current() -> Self::Id;
    /// Kernel-level id of the calling thread
    fn current_tid() -> i32;
    /// Terminate the calling thread without producing a value
    fn exit_current() -> !;

    fn set_name(id: Self::Id, name: &str) -> OsalResult<()>;
    fn name(id: Self::Id) -> OsalResult<String>;
    fn sched(id: Self::Id) -> OsalResult<(SchedPolicy, Priority)>;
    fn set_sched(id: Self::Id, policy: SchedPolicy, priority: Priority) -> OsalResult<()>;
    fn priority_range(policy: SchedPolicy) -> OsalResult<(Priority, Priority)>;
    fn affinity(id: Self::Id) -> OsalResult<CpuSet>;
    fn set_affinity(id: Self::Id, cpus: &CpuSet) -> OsalResult<()>;
    fn state(tid: i32) -> OsalResult<TaskState>;
    fn suspend(id: Self::Id) -> OsalResult<()>;
    fn resume(id: Self::Id) -> OsalResult<()>;
}

// ============ Named objects ============

/// Queue geometry and current fill level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MqStatus {
    pub max_messages: usize,
    pub max_message_size: usize,
    pub current_messages: usize,
}

pub trait MessageQueueBackend: Sized + Send + Sync {
    fn open(name: &CStr, attr: &MqAttr) -> OsalResult<Self>;
    fn send(&self, msg: &[u8], prio: MsgPrio) -> OsalResult<()>;
    fn timedsend(&self, msg: &[u8], prio: MsgPrio, deadline: &Timer) -> OsalResult<()>;
    fn receive(&self, buf: &mut [u8]) -> OsalResult<(usize, MsgPrio)>;
    fn timedreceive(&self, buf: &mut [u8], deadline: &Timer) -> OsalResult<(usize, MsgPrio)>;
    fn status(&self) -> OsalResult<MqStatus>;
    fn close(self) -> OsalResult<()>;
    fn unlink(name: &CStr) -> OsalResult<()>;
}

pub trait SharedMemoryBackend: Sized + Send + Sync {
    fn open(name: &CStr, attr: ShmAttr, size: usize) -> OsalResult<Self>;
    fn size(&self) -> usize;
    fn map(&self, attr: ShmMapAttr) -> OsalResult<NonNull<u8>>;
    /// # Safety
    /// `ptr`/`len` must describe a live mapping returned by `map`.
    unsafe fn unmap(ptr: NonNull<u8>, len: usize) -> OsalResult<()>;
    fn close(self) -> OsalResult<()>;
    fn unlink(name: &CStr) -> OsalResult<()>;
}
