//! pthread task back-end
//!
//! A spawned thread receives its entry as an owned heap descriptor; the
//! value it returns travels back through `pthread_join` boxed the same way.
//!
//! Cancellation and `pthread_exit` unwind through the entry, running
//! destructors on the way. A panic escaping the entry aborts the process.

use std::ffi::{c_void, CString};
use std::ptr;

use crate::config::{CPU_SET_BITS, TASK_NAME_LEN};
use crate::error::{OsalError, OsalResult};
use crate::prio::CpuSet;
use crate::port::{TaskBackend, TaskEntry, TaskOutput};
use crate::types::{Priority, SchedPolicy, TaskState};

use super::{ffi, unmapped, Posix};

/// Longest name the Linux kernel keeps for a thread, without the NUL
const HOST_NAME_MAX: usize = 15;

extern "C-unwind" fn trampoline(arg: *mut c_void) -> *mut c_void {
    // SAFETY: `arg` is the descriptor leaked by `spawn`, handed over once.
    let entry = unsafe { Box::from_raw(arg.cast::<TaskEntry>()) };
    let output: TaskOutput = entry();
    Box::into_raw(Box::new(output)).cast()
}

fn policy_to_host(policy: SchedPolicy) -> libc::c_int {
    match policy {
        SchedPolicy::Fifo => libc::SCHED_FIFO,
        SchedPolicy::RoundRobin => libc::SCHED_RR,
        SchedPolicy::Other => libc::SCHED_OTHER,
    }
}

fn policy_from_host(policy: libc::c_int) -> SchedPolicy {
    match policy {
        libc::SCHED_FIFO => SchedPolicy::Fifo,
        libc::SCHED_RR => SchedPolicy::RoundRobin,
        _ => SchedPolicy::Other,
    }
}

/// Cut `name` to what the kernel stores, on a character boundary
fn host_name(name: &str) -> OsalResult<CString> {
    let mut end = name.len().min(HOST_NAME_MAX);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    CString::new(&name[..end]).map_err(|_| OsalError::InvalidParam)
}

/// Map a `/proc/<pid>/task/<tid>/stat` state letter
fn state_from_proc(letter: char) -> TaskState {
    match letter {
        'R' => TaskState::Active,
        'S' | 'D' | 'W' => TaskState::Blocked,
        _ => TaskState::Inactive,
    }
}

impl TaskBackend for Posix {
    type Id = libc::pthread_t;

    fn spawn(entry: TaskEntry) -> OsalResult<libc::pthread_t> {
        let arg = Box::into_raw(Box::new(entry)).cast::<c_void>();
        let mut native: libc::pthread_t = 0;

        // SAFETY: `trampoline` takes ownership of `arg` once the thread runs.
        let rc = unsafe { ffi::pthread_create(&mut native, ptr::null(), trampoline, arg) };
        if rc != 0 {
            // SAFETY: no thread was started, the descriptor is still ours.
            drop(unsafe { Box::from_raw(arg.cast::<TaskEntry>()) });
            return Err(match rc {
                libc::EAGAIN => OsalError::SystemLimitReached,
                libc::EPERM => OsalError::PermissionDenied,
                libc::EINVAL => OsalError::InvalidParam,
                e => unmapped("pthread_create", e),
            });
        }

        Ok(native)
    }

    unsafe fn join(id: libc::pthread_t) -> OsalResult<Option<TaskOutput>> {
        let mut ret: *mut c_void = ptr::null_mut();

        // SAFETY: caller guarantees `id` is joinable.
        match unsafe { libc::pthread_join(id, &mut ret) } {
            0 => {}
            libc::EDEADLK => return Err(OsalError::DeadLock),
            libc::EINVAL => return Err(OsalError::InvalidParam),
            libc::ESRCH => return Err(OsalError::NotFound),
            e => return Err(unmapped("pthread_join", e)),
        }

        if ret.is_null() || ret == ffi::PTHREAD_CANCELED {
            return Ok(None);
        }

        // SAFETY: non-null, non-cancel values come from `trampoline`.
        Ok(Some(*unsafe { Box::from_raw(ret.cast::<TaskOutput>()) }))
    }

    unsafe fn cancel(id: libc::pthread_t) -> OsalResult<()> {
        // SAFETY: caller guarantees `id` is not joined yet.
        match unsafe { ffi::pthread_cancel(id) } {
            0 => Ok(()),
            libc::ESRCH => Err(OsalError::NotFound),
            e => Err(unmapped("pthread_cancel", e)),
        }
    }

    unsafe fn detach(id: libc::pthread_t) -> OsalResult<()> {
        // SAFETY: caller guarantees `id` is not joined yet.
        match unsafe { libc::pthread_detach(id) } {
            0 => Ok(()),
            libc::EINVAL => Err(OsalError::InvalidParam),
            libc::ESRCH => Err(OsalError::NotFound),
            e => Err(unmapped("pthread_detach", e)),
        }
    }

    fn current() -> libc::pthread_t {
        // SAFETY: always succeeds.
        unsafe { libc::pthread_self() }
    }

    fn current_tid() -> i32 {
        // SAFETY: always succeeds.
        unsafe { libc::syscall(libc::SYS_gettid) as i32 }
    }

    fn exit_current() -> ! {
        // SAFETY: unwinds the calling thread; `join` sees a null value.
        unsafe { ffi::pthread_exit(ptr::null_mut()) }
    }

    fn set_name(id: libc::pthread_t, name: &str) -> OsalResult<()> {
        let name = host_name(name)?;

        // SAFETY: `name` is NUL-terminated and short enough.
        match unsafe { libc::pthread_setname_np(id, name.as_ptr()) } {
            0 => Ok(()),
            libc::ERANGE => Err(OsalError::InvalidParam),
            libc::ESRCH => Err(OsalError::NotFound),
            e => Err(unmapped("pthread_setname_np", e)),
        }
    }

    fn name(id: libc::pthread_t) -> OsalResult<String> {
        let mut buf = [0 as libc::c_char; TASK_NAME_LEN];

        // SAFETY: `buf` is writable for its full length.
        match unsafe { ffi::pthread_getname_np(id, buf.as_mut_ptr(), buf.len()) } {
            0 => {}
            libc::ERANGE => return Err(OsalError::InvalidParam),
            libc::ESRCH => return Err(OsalError::NotFound),
            e => return Err(unmapped("pthread_getname_np", e)),
        }

        let bytes: Vec<u8> = buf
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn sched(id: libc::pthread_t) -> OsalResult<(SchedPolicy, Priority)> {
        let mut policy: libc::c_int = 0;
        let mut param = libc::sched_param { sched_priority: 0 };

        // SAFETY: out-parameters are valid.
        match unsafe { libc::pthread_getschedparam(id, &mut policy, &mut param) } {
            0 => Ok((policy_from_host(policy), param.sched_priority)),
            libc::ESRCH => Err(OsalError::NotFound),
            e => Err(unmapped("pthread_getschedparam", e)),
        }
    }

    fn set_sched(id: libc::pthread_t, policy: SchedPolicy, priority: Priority) -> OsalResult<()> {
        let param = libc::sched_param {
            sched_priority: priority,
        };

        // SAFETY: `param` is valid for the call.
        match unsafe { libc::pthread_setschedparam(id, policy_to_host(policy), &param) } {
            0 => Ok(()),
            libc::EPERM => Err(OsalError::PermissionDenied),
            libc::EINVAL => Err(OsalError::InvalidParam),
            libc::ESRCH => Err(OsalError::NotFound),
            libc::ENOTSUP => Err(OsalError::NotImplemented),
            e => Err(unmapped("pthread_setschedparam", e)),
        }
    }

    fn priority_range(policy: SchedPolicy) -> OsalResult<(Priority, Priority)> {
        let host = policy_to_host(policy);

        // SAFETY: plain queries.
        let (min, max) = unsafe {
            (
                libc::sched_get_priority_min(host),
                libc::sched_get_priority_max(host),
            )
        };
        if min == -1 || max == -1 {
            return Err(OsalError::InvalidParam);
        }
        Ok((min, max))
    }

    fn affinity(id: libc::pthread_t) -> OsalResult<CpuSet> {
        // SAFETY: all-zero is an empty CPU set.
        let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };

        // SAFETY: `set` is writable for its full size.
        let rc = unsafe {
            libc::pthread_getaffinity_np(id, std::mem::size_of::<libc::cpu_set_t>(), &mut set)
        };
        match rc {
            0 => {}
            libc::EINVAL => return Err(OsalError::InvalidParam),
            libc::ESRCH => return Err(OsalError::NotFound),
            e => return Err(unmapped("pthread_getaffinity_np", e)),
        }

        let mut cpus = CpuSet::new();
        for cpu in 0..CPU_SET_BITS {
            // SAFETY: `cpu` is within the set.
            if unsafe { libc::CPU_ISSET(cpu, &set) } {
                cpus.insert(cpu);
            }
        }
        Ok(cpus)
    }

    fn set_affinity(id: libc::pthread_t, cpus: &CpuSet) -> OsalResult<()> {
        // SAFETY: all-zero is an empty CPU set.
        let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
        for cpu in cpus.iter() {
            // SAFETY: `cpu` is below CPU_SET_BITS, well within the set.
            unsafe { libc::CPU_SET(cpu, &mut set) };
        }

        // SAFETY: `set` is readable for its full size.
        let rc = unsafe {
            libc::pthread_setaffinity_np(id, std::mem::size_of::<libc::cpu_set_t>(), &set)
        };
        match rc {
            0 => Ok(()),
            libc::EINVAL => Err(OsalError::InvalidParam),
            libc::ESRCH => Err(OsalError::NotFound),
            libc::EPERM => Err(OsalError::PermissionDenied),
            e => Err(unmapped("pthread_setaffinity_np", e)),
        }
    }

    fn state(tid: i32) -> OsalResult<TaskState> {
        let path = format!("/proc/self/task/{}/stat", tid);
        let stat = match std::fs::read_to_string(&path) {
            Ok(stat) => stat,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(TaskState::UnknownId)
            }
            Err(e) => {
                crate::warn!("reading {} failed: {}", path, e);
                return Err(OsalError::OperationFailed);
            }
        };

        // Format is "<tid> (<comm>) <state> ...", comm may contain spaces.
        stat.rfind(')')
            .and_then(|pos| stat[pos + 1..].trim_start().chars().next())
            .map(state_from_proc)
            .ok_or(OsalError::OperationFailed)
    }

    fn suspend(_id: libc::pthread_t) -> OsalResult<()> {
        Err(OsalError::NotImplemented)
    }

    fn resume(_id: libc::pthread_t) -> OsalResult<()> {
        Err(OsalError::NotImplemented)
    }
}
