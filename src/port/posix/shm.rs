//! POSIX shared memory back-end

use std::ffi::CStr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr::NonNull;

use crate::error::{OsalError, OsalResult};
use crate::port::SharedMemoryBackend;
use crate::types::{ShmAttr, ShmMapAttr};

use super::{errno, unmapped};

/// Open shared memory object
#[derive(Debug)]
pub struct SharedMemory {
    fd: OwnedFd,
    size: usize,
}

impl SharedMemory {
    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

fn map_open_error(err: i32) -> OsalError {
    match err {
        libc::EACCES | libc::EEXIST => OsalError::PermissionDenied,
        libc::EINVAL | libc::ENAMETOOLONG => OsalError::InvalidParam,
        libc::EMFILE | libc::ENFILE => OsalError::SystemLimitReached,
        libc::ENOENT => OsalError::NotFound,
        libc::ENOMEM | libc::ENOSPC => OsalError::OutOfMemory,
        libc::EAGAIN => OsalError::Unavailable,
        e => unmapped("shm_open", e),
    }
}

fn shm_open(name: &CStr, oflag: libc::c_int, mode: libc::mode_t) -> Result<OwnedFd, i32> {
    // SAFETY: `name` is NUL-terminated.
    let fd = unsafe { libc::shm_open(name.as_ptr(), oflag | libc::O_CLOEXEC, mode) };
    if fd < 0 {
        return Err(errno());
    }
    // SAFETY: `fd` was just opened and is owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn truncate(fd: &OwnedFd, size: usize) -> OsalResult<()> {
    // SAFETY: `fd` is a valid descriptor.
    if unsafe { libc::ftruncate(fd.as_raw_fd(), size as libc::off_t) } == 0 {
        return Ok(());
    }

    match errno() {
        libc::EINVAL | libc::EFBIG => Err(OsalError::InvalidParam),
        libc::EPERM | libc::EACCES | libc::EBADF => Err(OsalError::PermissionDenied),
        libc::ENOMEM | libc::ENOSPC => Err(OsalError::OutOfMemory),
        e => Err(unmapped("ftruncate", e)),
    }
}

fn object_size(fd: &OwnedFd) -> OsalResult<usize> {
    // SAFETY: all-zero is a valid stat buffer.
    let mut st: libc::stat = unsafe { std::mem::zeroed() };

    // SAFETY: `fd` is valid; `st` is writable.
    if unsafe { libc::fstat(fd.as_raw_fd(), &mut st) } != 0 {
        return Err(unmapped("fstat", errno()));
    }
    Ok(st.st_size as usize)
}

impl SharedMemoryBackend for SharedMemory {
    fn open(name: &CStr, attr: ShmAttr, size: usize) -> OsalResult<Self> {
        let access = if attr.rdwr() {
            libc::O_RDWR
        } else {
            libc::O_RDONLY
        };
        let mode = libc::mode_t::from(attr.mode());

        let (fd, created) = if attr.creat() && !attr.excl() {
            // Create exclusively first so only the creator sizes the object.
            match shm_open(name, access | libc::O_CREAT | libc::O_EXCL, mode) {
                Ok(fd) => (fd, true),
                Err(libc::EEXIST) => (shm_open(name, access, mode).map_err(map_open_error)?, false),
                Err(e) => return Err(map_open_error(e)),
            }
        } else {
            let mut oflag = access;
            if attr.creat() {
                oflag |= libc::O_CREAT | libc::O_EXCL;
            }
            (shm_open(name, oflag, mode).map_err(map_open_error)?, attr.creat())
        };

        if created || attr.trunc() {
            if let Err(e) = truncate(&fd, size) {
                if created {
                    // Do not leave an empty object under the name.
                    // SAFETY: `name` is NUL-terminated.
                    unsafe { libc::shm_unlink(name.as_ptr()) };
                }
                return Err(e);
            }
        }

        let size = object_size(&fd)?;
        Ok(SharedMemory { fd, size })
    }

    fn size(&self) -> usize {
        self.size
    }

    fn map(&self, attr: ShmMapAttr) -> OsalResult<NonNull<u8>> {
        if self.size == 0 {
            return Err(OsalError::InvalidParam);
        }

        let prot = if attr.contains(ShmMapAttr::PROT_NONE) {
            libc::PROT_NONE
        } else {
            let mut prot = 0;
            if attr.contains(ShmMapAttr::PROT_READ) {
                prot |= libc::PROT_READ;
            }
            if attr.contains(ShmMapAttr::PROT_WRITE) {
                prot |= libc::PROT_WRITE;
            }
            if attr.contains(ShmMapAttr::PROT_EXEC) {
                prot |= libc::PROT_EXEC;
            }
            prot
        };

        let flags = match (
            attr.contains(ShmMapAttr::SHARED),
            attr.contains(ShmMapAttr::PRIVATE),
        ) {
            (true, false) => libc::MAP_SHARED,
            (false, true) => libc::MAP_PRIVATE,
            _ => return Err(OsalError::InvalidParam),
        };

        // SAFETY: a fresh mapping of an open descriptor; no existing memory
        // is affected.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                self.size,
                prot,
                flags,
                self.fd.as_raw_fd(),
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(match errno() {
                libc::EACCES => OsalError::PermissionDenied,
                libc::EINVAL => OsalError::InvalidParam,
                libc::ENOMEM => OsalError::OutOfMemory,
                libc::EAGAIN => OsalError::Unavailable,
                libc::EMFILE | libc::ENFILE => OsalError::SystemLimitReached,
                e => unmapped("mmap", e),
            });
        }

        NonNull::new(ptr.cast::<u8>()).ok_or(OsalError::OperationFailed)
    }

    unsafe fn unmap(ptr: NonNull<u8>, len: usize) -> OsalResult<()> {
        // SAFETY: caller guarantees a live mapping.
        if unsafe { libc::munmap(ptr.as_ptr().cast(), len) } == 0 {
            return Ok(());
        }

        match errno() {
            libc::EINVAL => Err(OsalError::InvalidParam),
            e => Err(unmapped("munmap", e)),
        }
    }

    fn close(self) -> OsalResult<()> {
        drop(self.fd);
        Ok(())
    }

    fn unlink(name: &CStr) -> OsalResult<()> {
        // SAFETY: `name` is NUL-terminated.
        if unsafe { libc::shm_unlink(name.as_ptr()) } == 0 {
            return Ok(());
        }

        match errno() {
            libc::ENOENT => Err(OsalError::NotFound),
            libc::EACCES => Err(OsalError::PermissionDenied),
            libc::ENAMETOOLONG | libc::EINVAL => Err(OsalError::InvalidParam),
            e => Err(unmapped("shm_unlink", e)),
        }
    }
}
