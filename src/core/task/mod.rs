//! Task management module
//!
//! Provides task creation, joining, cancellation and attribute control.
//!
//! # Startup
//!
//! [`create`] hands the new thread an owned descriptor holding the entry
//! closure and the requested attributes. The thread applies name, policy,
//! priority and affinity to itself, reports the outcome through a shared
//! startup block and only then runs the entry. The creator blocks on the
//! startup semaphore instead of polling, so `create` returns once the task
//! runs with its final attributes, or with the error that prevented it.
//!
//! # Cancellation
//!
//! [`Task::destroy`] requests asynchronous cancellation. The target stops at
//! its next cancellation point (blocking waits, sleeps, message queue calls)
//! and unwinds; destructors on its stack run, so held guards release their
//! locks. Code that must not be torn down mid-way should not block while
//! holding state that has no destructor.

mod attr;

pub use attr::TaskAttr;

use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::sync::Arc;

use portable_atomic::{AtomicBool, AtomicI32, Ordering};

use crate::error::{retval, OsalError, OsalResult};
use crate::port::{self, Host, RawPrimitive, SemaphoreBackend, TaskBackend, TaskEntry, TaskOutput};
use crate::prio::CpuSet;
use crate::sched;
use crate::time::{self, Timer};
use crate::types::{Priority, SchedPolicy, SyncAttr, TaskState};

/// Host thread identity of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskId {
    raw: <Host as TaskBackend>::Id,
    tid: i32,
}

impl TaskId {
    /// Kernel-level thread id
    #[inline]
    pub fn tid(&self) -> i32 {
        self.tid
    }
}

// ============ Startup handshake ============

/// Interval at which a waiting creator re-checks the report flag
const STARTUP_POLL_NS: u64 = 10_000_000;

/// Block shared by creator and new thread until the thread is running
struct Startup {
    ready: Box<port::Semaphore>,
    status: AtomicI32,
    tid: AtomicI32,
    reported: AtomicBool,
}

impl Startup {
    fn new() -> OsalResult<Self> {
        let ready = Box::new(port::Semaphore::uninit());
        // SAFETY: boxed storage does not move.
        unsafe { ready.init(SyncAttr::new(), 0)? };

        Ok(Startup {
            ready,
            status: AtomicI32::new(0),
            tid: AtomicI32::new(0),
            reported: AtomicBool::new(false),
        })
    }

    /// Wait for the thread's report, ignoring signal interruptions
    ///
    /// The semaphore wakes the creator; the `reported` flag still ends
    /// the wait if that wakeup never arrives.
    fn wait(&self) {
        while !self.reported.load(Ordering::Acquire) {
            match self.ready.timedwait(&Timer::with_timeout(STARTUP_POLL_NS)) {
                Ok(()) => return,
                Err(OsalError::Timeout | OsalError::Interrupted) => {}
                Err(e) => {
                    crate::error!("task startup wait failed: {}", e);
                    let _ = time::sleep(STARTUP_POLL_NS);
                }
            }
        }
    }

    /// Publish the thread's startup outcome and wake the creator
    fn report(&self, status: &OsalResult<()>) {
        self.tid.store(Host::current_tid(), Ordering::Release);
        self.status.store(retval(status), Ordering::Release);
        self.reported.store(true, Ordering::Release);

        if let Err(e) = self.ready.post() {
            crate::error!("task startup wakeup failed: {}", e);
        }
    }
}

impl Drop for Startup {
    fn drop(&mut self) {
        // SAFETY: initialized in `new`; the last reference is going away.
        let _ = unsafe { self.ready.destroy() };
    }
}

/// Apply the caller-supplied attributes to the calling thread
fn apply_overrides(attr: &TaskAttr) -> OsalResult<()> {
    let id = Host::current();

    if !attr.name().is_empty() {
        Host::set_name(id, attr.name())?;
    }
    if attr.has_sched_override() {
        sched::apply(id, attr.policy, attr.priority)?;
    }
    if !attr.affinity.is_empty() {
        Host::set_affinity(id, &attr.affinity)?;
    }
    Ok(())
}

// ============ Task handles ============

/// Owning handle of a task producing a `T`
///
/// Dropping the handle without [`Task::join`] detaches the thread.
#[derive(Debug)]
pub struct Task<T = ()> {
    id: TaskId,
    _result: PhantomData<fn() -> T>,
}

/// Create a new task
///
/// # Arguments
/// * `attr` - Name, policy, priority and affinity applied by the task itself
/// * `entry` - Task body; its value is returned by [`Task::join`]
///
/// # Returns
/// * `Ok(Task)` - Task is running with the requested attributes
/// * `Err(OsalError::SystemLimitReached)` - Host thread limit hit
/// * `Err(OsalError::PermissionDenied)` - Policy or priority not allowed
/// * `Err(OsalError::InvalidParam)` - Attribute rejected by the host
pub fn create<F, T>(attr: &TaskAttr, entry: F) -> OsalResult<Task<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let startup = Arc::new(Startup::new()?);
    let worker = Arc::clone(&startup);
    let overrides = attr.clone();

    let body: TaskEntry = Box::new(move || -> TaskOutput {
        let status = apply_overrides(&overrides);
        let failed = status.is_err();

        worker.report(&status);
        drop(worker);

        if failed {
            return Box::new(());
        }
        Box::new(entry())
    });

    let raw = Host::spawn(body)?;
    startup.wait();

    if let Some(err) = OsalError::from_code(startup.status.load(Ordering::Acquire)) {
        crate::warn!("task '{}' failed to start: {}", attr.name(), err);
        // SAFETY: `raw` was just spawned and is joined only here.
        let _ = unsafe { Host::join(raw) };
        return Err(err);
    }

    let id = TaskId {
        raw,
        tid: startup.tid.load(Ordering::Acquire),
    };
    crate::debug!("task '{}' started as tid {}", attr.name(), id.tid);

    Ok(Task {
        id,
        _result: PhantomData,
    })
}

impl<T: Send + 'static> Task<T> {
    /// Wait for the task to finish
    ///
    /// # Returns
    /// * `Ok(Some(value))` - Entry returned `value`
    /// * `Ok(None)` - Task was cancelled or called [`delete_self`]
    /// * `Err(OsalError::DeadLock)` - Task tried to join itself
    pub fn join(self) -> OsalResult<Option<T>> {
        let this = ManuallyDrop::new(self);

        // SAFETY: the handle is consumed, so the id is joined exactly once.
        let output = unsafe { Host::join(this.id.raw) }?;

        match output {
            None => Ok(None),
            Some(value) => value
                .downcast::<T>()
                .map(|v| Some(*v))
                .map_err(|_| OsalError::OperationFailed),
        }
    }

    /// Request asynchronous cancellation; [`Task::join`] then completes
    pub fn destroy(&self) -> OsalResult<()> {
        // SAFETY: the handle is alive, so the thread is not joined yet.
        unsafe { Host::cancel(self.id.raw) }
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        // SAFETY: the handle is alive, so the thread is not joined yet.
        let _ = unsafe { Host::detach(self.id.raw) };
    }
}

/// Handle of the calling task
///
/// Not `Send`: it describes the thread it was obtained on.
#[derive(Debug, Clone, Copy)]
pub struct CurrentTask {
    id: TaskId,
    _not_send: PhantomData<*const ()>,
}

/// Handle of the calling task
pub fn current() -> CurrentTask {
    CurrentTask {
        id: TaskId {
            raw: Host::current(),
            tid: Host::current_tid(),
        },
        _not_send: PhantomData,
    }
}

/// Terminate the calling task; its [`Task::join`] returns `Ok(None)`
pub fn delete_self() -> ! {
    Host::exit_current()
}

// ============ Attribute control ============

/// Attribute access shared by [`Task`] and [`CurrentTask`]
pub trait TaskControl {
    fn id(&self) -> TaskId;

    /// Current scheduling policy
    fn get_policy(&self) -> OsalResult<SchedPolicy> {
        Host::sched(self.id().raw).map(|(policy, _)| policy)
    }

    /// Switch policy, keeping the priority clamped to the new range
    fn set_policy(&self, policy: SchedPolicy) -> OsalResult<()> {
        let (_, priority) = Host::sched(self.id().raw)?;
        sched::apply(self.id().raw, policy, priority)
    }

    /// Current priority
    fn get_priority(&self) -> OsalResult<Priority> {
        Host::sched(self.id().raw).map(|(_, priority)| priority)
    }

    /// Change priority within the current policy
    fn set_priority(&self, priority: Priority) -> OsalResult<()> {
        let (policy, _) = Host::sched(self.id().raw)?;
        sched::apply(self.id().raw, policy, priority)
    }

    /// CPUs the task may run on
    fn get_affinity(&self) -> OsalResult<CpuSet> {
        Host::affinity(self.id().raw)
    }

    /// Restrict the task to `cpus`; an empty set leaves it unchanged
    fn set_affinity(&self, cpus: &CpuSet) -> OsalResult<()> {
        if cpus.is_empty() {
            return Ok(());
        }
        Host::set_affinity(self.id().raw, cpus)
    }

    /// All attributes as currently seen by the host
    ///
    /// The name is the one the host kept, which may be shorter than the
    /// one requested.
    fn get_task_attr(&self) -> OsalResult<TaskAttr> {
        let raw = self.id().raw;
        let (policy, priority) = Host::sched(raw)?;

        Ok(TaskAttr::new(&Host::name(raw)?)
            .with_policy(policy)
            .with_priority(priority)
            .with_affinity(Host::affinity(raw)?))
    }

    /// Apply name, policy, priority and affinity
    fn set_task_attr(&self, attr: &TaskAttr) -> OsalResult<()> {
        let raw = self.id().raw;

        if !attr.name().is_empty() {
            Host::set_name(raw, attr.name())?;
        }
        sched::apply(raw, attr.policy, attr.priority)?;
        self.set_affinity(&attr.affinity)
    }

    /// Host view of the task's state
    fn get_state(&self) -> OsalResult<TaskState> {
        Host::state(self.id().tid)
    }

    /// Stop the task; `NotImplemented` where the host has no per-thread stop
    fn suspend(&self) -> OsalResult<()> {
        Host::suspend(self.id().raw)
    }

    /// Continue a suspended task
    fn resume(&self) -> OsalResult<()> {
        Host::resume(self.id().raw)
    }
}

impl<T> TaskControl for Task<T> {
    #[inline]
    fn id(&self) -> TaskId {
        self.id
    }
}

impl TaskControl for CurrentTask {
    #[inline]
    fn id(&self) -> TaskId {
        self.id
    }
}
