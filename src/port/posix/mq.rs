//! POSIX message queue back-end
//!
//! `send`/`receive` surface signal interruption as
//! [`OsalError::Interrupted`]; the timed variants retry until the deadline.

use std::ffi::CStr;
use std::mem::ManuallyDrop;

use crate::error::{OsalError, OsalResult};
use crate::port::{MessageQueueBackend, MqStatus};
use crate::time::Timer;
use crate::types::{MqAttr, MqFlags, MsgPrio};

use super::{errno, realtime_deadline, unmapped};

/// Open message queue descriptor
#[derive(Debug)]
pub struct MessageQueue {
    mqd: libc::mqd_t,
}

fn open_flags(flags: MqFlags) -> libc::c_int {
    let mut oflag = if flags.contains(MqFlags::RDWR) {
        libc::O_RDWR
    } else if flags.contains(MqFlags::WRONLY) {
        libc::O_WRONLY
    } else {
        libc::O_RDONLY
    };

    if flags.contains(MqFlags::CREAT) {
        oflag |= libc::O_CREAT;
    }
    if flags.contains(MqFlags::EXCL) {
        oflag |= libc::O_EXCL;
    }
    if flags.contains(MqFlags::CLOEXEC) {
        oflag |= libc::O_CLOEXEC;
    }
    if flags.contains(MqFlags::NONBLOCK) {
        oflag |= libc::O_NONBLOCK;
    }
    oflag
}

fn map_open_error(err: i32) -> OsalError {
    match err {
        libc::EACCES | libc::EEXIST => OsalError::PermissionDenied,
        libc::EINVAL | libc::ENAMETOOLONG => OsalError::InvalidParam,
        libc::EMFILE | libc::ENFILE => OsalError::SystemLimitReached,
        libc::ENOENT => OsalError::NotFound,
        libc::ENOMEM | libc::ENOSPC => OsalError::OutOfMemory,
        e => unmapped("mq_open", e),
    }
}

/// Errors shared by all send and receive variants
fn map_io_error(call: &str, err: i32) -> OsalError {
    match err {
        libc::EAGAIN => OsalError::Busy,
        libc::EINTR => OsalError::Interrupted,
        libc::ETIMEDOUT => OsalError::Timeout,
        libc::EMSGSIZE | libc::EINVAL => OsalError::InvalidParam,
        libc::EBADF => OsalError::PermissionDenied,
        e => unmapped(call, e),
    }
}

impl MessageQueueBackend for MessageQueue {
    fn open(name: &CStr, attr: &MqAttr) -> OsalResult<Self> {
        // SAFETY: all-zero is a valid mq_attr.
        let mut mq_attr: libc::mq_attr = unsafe { std::mem::zeroed() };
        mq_attr.mq_maxmsg = attr.max_messages as libc::c_long;
        mq_attr.mq_msgsize = attr.max_message_size as libc::c_long;

        let attr_ptr: *mut libc::mq_attr = if attr.oflags.contains(MqFlags::CREAT) {
            &mut mq_attr
        } else {
            std::ptr::null_mut()
        };

        // SAFETY: `name` is NUL-terminated; mode and attr match O_CREAT usage.
        let mqd = unsafe {
            libc::mq_open(
                name.as_ptr(),
                open_flags(attr.oflags),
                attr.mode as libc::mode_t,
                attr_ptr,
            )
        };

        if mqd == -1 {
            return Err(map_open_error(errno()));
        }
        Ok(MessageQueue { mqd })
    }

    fn send(&self, msg: &[u8], prio: MsgPrio) -> OsalResult<()> {
        // SAFETY: `msg` is readable for its length.
        let rc = unsafe { libc::mq_send(self.mqd, msg.as_ptr().cast(), msg.len(), prio) };
        if rc == 0 {
            Ok(())
        } else {
            Err(map_io_error("mq_send", errno()))
        }
    }

    fn timedsend(&self, msg: &[u8], prio: MsgPrio, deadline: &Timer) -> OsalResult<()> {
        loop {
            let ts = realtime_deadline(deadline)?;

            // SAFETY: `msg` is readable for its length; `ts` is valid.
            let rc = unsafe {
                libc::mq_timedsend(self.mqd, msg.as_ptr().cast(), msg.len(), prio, &ts)
            };
            if rc == 0 {
                return Ok(());
            }

            match errno() {
                libc::EINTR => continue,
                e => return Err(map_io_error("mq_timedsend", e)),
            }
        }
    }

    fn receive(&self, buf: &mut [u8]) -> OsalResult<(usize, MsgPrio)> {
        let mut prio: libc::c_uint = 0;

        // SAFETY: `buf` is writable for its length.
        let n = unsafe { libc::mq_receive(self.mqd, buf.as_mut_ptr().cast(), buf.len(), &mut prio) };
        if n < 0 {
            return Err(map_io_error("mq_receive", errno()));
        }
        Ok((n as usize, prio))
    }

    fn timedreceive(&self, buf: &mut [u8], deadline: &Timer) -> OsalResult<(usize, MsgPrio)> {
        let mut prio: libc::c_uint = 0;

        loop {
            let ts = realtime_deadline(deadline)?;

            // SAFETY: `buf` is writable for its length; `ts` is valid.
            let n = unsafe {
                libc::mq_timedreceive(self.mqd, buf.as_mut_ptr().cast(), buf.len(), &mut prio, &ts)
            };
            if n >= 0 {
                return Ok((n as usize, prio));
            }

            match errno() {
                libc::EINTR => continue,
                e => return Err(map_io_error("mq_timedreceive", e)),
            }
        }
    }

    fn status(&self) -> OsalResult<MqStatus> {
        // SAFETY: all-zero is a valid mq_attr.
        let mut mq_attr: libc::mq_attr = unsafe { std::mem::zeroed() };

        // SAFETY: `mq_attr` is writable.
        if unsafe { libc::mq_getattr(self.mqd, &mut mq_attr) } != 0 {
            return Err(match errno() {
                libc::EBADF => OsalError::InvalidParam,
                e => unmapped("mq_getattr", e),
            });
        }

        Ok(MqStatus {
            max_messages: mq_attr.mq_maxmsg as usize,
            max_message_size: mq_attr.mq_msgsize as usize,
            current_messages: mq_attr.mq_curmsgs as usize,
        })
    }

    fn close(self) -> OsalResult<()> {
        let this = ManuallyDrop::new(self);

        // SAFETY: descriptor is owned and closed exactly once.
        if unsafe { libc::mq_close(this.mqd) } == 0 {
            return Ok(());
        }

        match errno() {
            libc::EBADF => Err(OsalError::InvalidParam),
            e => Err(unmapped("mq_close", e)),
        }
    }

    fn unlink(name: &CStr) -> OsalResult<()> {
        // SAFETY: `name` is NUL-terminated.
        if unsafe { libc::mq_unlink(name.as_ptr()) } == 0 {
            return Ok(());
        }

        match errno() {
            libc::ENOENT => Err(OsalError::NotFound),
            libc::EACCES => Err(OsalError::PermissionDenied),
            libc::ENAMETOOLONG | libc::EINVAL => Err(OsalError::InvalidParam),
            e => Err(unmapped("mq_unlink", e)),
        }
    }
}

impl Drop for MessageQueue {
    fn drop(&mut self) {
        // SAFETY: descriptor is owned; `close` skips this destructor.
        unsafe { libc::mq_close(self.mqd) };
    }
}
