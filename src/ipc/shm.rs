//! Shared memory
//!
//! Named memory objects sized on creation and mapped whole into the
//! address space. A name without a leading `/` gets one.

use std::ptr::NonNull;

use crate::config::SHM_NAME_MAX;
use crate::error::OsalResult;
use crate::port::{self, SharedMemoryBackend};
use crate::types::{ShmAttr, ShmMapAttr};

use super::host_name;

fn full_name(name: &str) -> String {
    if name.starts_with('/') {
        name.to_owned()
    } else {
        format!("/{}", name)
    }
}

/// Open shared memory object
#[derive(Debug)]
pub struct SharedMemory {
    raw: port::SharedMemory,
    name: String,
}

impl SharedMemory {
    /// Open or create the object `name`
    ///
    /// A created object is sized to `size`. An existing one keeps its size
    /// unless `attr.trunc()` is set; [`SharedMemory::size`] reports the
    /// size in effect.
    ///
    /// # Returns
    /// * `Err(OsalError::InvalidParam)` - Empty, malformed or too long name
    /// * `Err(OsalError::PermissionDenied)` - Access denied or exclusive
    ///   create of an existing object
    /// * `Err(OsalError::SystemLimitReached)` - Descriptor limit reached
    /// * `Err(OsalError::NotFound)` - Object missing and `creat` not set
    pub fn open(name: &str, attr: ShmAttr, size: usize) -> OsalResult<Self> {
        let name = full_name(name);
        let host = host_name(&name, SHM_NAME_MAX)?;
        let raw = port::SharedMemory::open(&host, attr, size)?;

        crate::debug!("shm {} open, {} bytes", name, raw.size());
        Ok(SharedMemory { raw, name })
    }

    /// Size of the object in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.raw.size()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Host file descriptor
    #[inline]
    pub fn fd(&self) -> i32 {
        self.raw.fd()
    }

    /// Map the whole object
    ///
    /// `attr` must select exactly one of `SHARED` and `PRIVATE`.
    ///
    /// # Returns
    /// * `Err(OsalError::InvalidParam)` - Bad sharing selector or empty object
    /// * `Err(OsalError::PermissionDenied)` - Protection exceeds open mode
    pub fn map(&self, attr: ShmMapAttr) -> OsalResult<ShmMapping> {
        let ptr = self.raw.map(attr)?;
        Ok(ShmMapping {
            ptr,
            len: self.raw.size(),
        })
    }

    /// Close the descriptor; existing mappings stay valid
    pub fn close(self) -> OsalResult<()> {
        self.raw.close()
    }

    /// Remove the object `name`; open descriptors and mappings stay valid
    pub fn unlink(name: &str) -> OsalResult<()> {
        let name = full_name(name);
        let host = host_name(&name, SHM_NAME_MAX)?;
        port::SharedMemory::unlink(&host)
    }
}

/// Mapping of a shared memory object, unmapped on drop
#[derive(Debug)]
pub struct ShmMapping {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the mapping is plain memory; access through raw pointers is the
// caller's responsibility and the byte-slice views require `&mut` for writes.
unsafe impl Send for ShmMapping {}
// SAFETY: see above.
unsafe impl Sync for ShmMapping {}

impl ShmMapping {
    /// Start of the mapping
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the mapping as bytes
    ///
    /// # Safety
    /// The mapping must be readable and no other process or thread may
    /// write to it while the slice lives.
    pub unsafe fn as_slice(&self) -> &[u8] {
        // SAFETY: forwarded to the caller.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// View the mapping as mutable bytes
    ///
    /// # Safety
    /// The mapping must be writable and nothing else may access it while
    /// the slice lives.
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: forwarded to the caller.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Unmap now and report the host's answer
    pub fn unmap(self) -> OsalResult<()> {
        let this = std::mem::ManuallyDrop::new(self);
        // SAFETY: the mapping is live and released exactly once.
        unsafe { port::SharedMemory::unmap(this.ptr, this.len) }
    }
}

impl Drop for ShmMapping {
    fn drop(&mut self) {
        // SAFETY: the mapping is live and released exactly once.
        if let Err(e) = unsafe { port::SharedMemory::unmap(self.ptr, self.len) } {
            crate::warn!("munmap failed: {}", e);
        }
    }
}
