//! Shared memory logging sink
//!
//! Retargets [`osal_printf!`](crate::osal_printf) output into a ring of
//! fixed-size message slots inside a shared memory object, where a
//! separate process (see the `logger` demo) picks it up.
//!
//! # Ring layout
//!
//! ```text
//! +----------------------------------------------+
//! | magic: u32               = 0x00AFFE00        |
//! | max_messages: u64                            |
//! | max_message_size: u64                        |
//! | mutex (robust, process-shared)               |
//! | semaphore (process-shared)                   |
//! | new_msg: bool                                |
//! | read_index: u32, write_index: u32            |
//! +----------------------------------------------+
//! | slot 0 .. slot max_messages-1                |
//! |   max_message_size bytes each, NUL-padded    |
//! +----------------------------------------------+
//! ```
//!
//! Producers never wait for consumers: when the ring is full the oldest
//! unread message is overwritten. Consumers wait on the semaphore, which
//! is posted once per message written.

use std::cell::RefCell;
use std::fmt;
use std::io::Write as _;
use std::mem::size_of;
use std::ptr::{self, addr_of_mut};
use std::sync::Arc;

use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use crate::config::{IO_FORMAT_BUF_SIZE, IO_SHM_MAGIC};
use crate::critical::{cs_load, cs_replace, CsMutex};
use crate::error::{OsalError, OsalResult};
use crate::ipc::shm::{SharedMemory, ShmMapping};
use crate::port::{self, MutexBackend, RawPrimitive, SemaphoreBackend};
use crate::time::Timer;
use crate::types::{ShmAttr, ShmMapAttr, SyncAttr};

// ============ Ring header ============

/// Header at the start of the shared memory object
#[repr(C)]
struct RingHeader {
    magic: AtomicU32,
    max_messages: u64,
    max_message_size: u64,
    mutex: port::Mutex,
    sem: port::Semaphore,
    new_msg: AtomicBool,
    read_index: AtomicU32,
    write_index: AtomicU32,
}

const HEADER_SIZE: usize = size_of::<RingHeader>();

const RING_MAP: ShmMapAttr = ShmMapAttr::PROT_READ
    .union(ShmMapAttr::PROT_WRITE)
    .union(ShmMapAttr::SHARED);

/// Bytes needed for a ring of the given geometry
fn ring_size(max_messages: usize, max_message_size: usize) -> OsalResult<usize> {
    max_messages
        .checked_mul(max_message_size)
        .and_then(|slab| slab.checked_add(HEADER_SIZE))
        .ok_or(OsalError::InvalidParam)
}

/// Attached logging ring
pub struct ShmLog {
    mapping: ShmMapping,
    _shm: SharedMemory,
    max_messages: u32,
    max_message_size: usize,
}

impl ShmLog {
    /// Open or create the ring `name`
    ///
    /// A ring already tagged with the magic word keeps its geometry;
    /// anything else is (re)initialized with the given one.
    ///
    /// # Returns
    /// * `Err(OsalError::InvalidParam)` - Zero-sized geometry
    pub fn create(name: &str, max_messages: usize, max_message_size: usize) -> OsalResult<Self> {
        if max_messages < 2 || max_message_size == 0 || max_messages > u32::MAX as usize {
            return Err(OsalError::InvalidParam);
        }
        let size = ring_size(max_messages, max_message_size)?;

        let mut shm = SharedMemory::open(name, ShmAttr::create_rw(), size)?;
        if shm.size() >= HEADER_SIZE {
            let mapping = shm.map(RING_MAP)?;
            if let Some((msgs, msg_size)) = Self::adopt(&mapping) {
                crate::info!("log ring {} found, {} x {} bytes", name, msgs, msg_size);
                return Self::from_parts(shm, mapping, msgs, msg_size);
            }
        }

        if shm.size() < size {
            shm = SharedMemory::open(name, ShmAttr::create_rw().with_trunc(true), size)?;
        }
        let mapping = shm.map(RING_MAP)?;

        // SAFETY: the mapping is at least `size` bytes and page aligned; no
        // other user relies on it until the magic word is published.
        unsafe { init_header(mapping.as_ptr().cast(), max_messages, max_message_size)? };
        crate::info!(
            "log ring {} initialized, {} x {} bytes",
            name,
            max_messages,
            max_message_size
        );

        Self::from_parts(shm, mapping, max_messages, max_message_size)
    }

    /// Attach to the existing ring `name` without initializing it
    ///
    /// # Returns
    /// * `Err(OsalError::NotFound)` - No such object
    /// * `Err(OsalError::InvalidParam)` - Object is not an initialized ring
    pub fn attach(name: &str) -> OsalResult<Self> {
        let attr = ShmAttr::new().with_rdwr(true).with_map(true);
        let shm = SharedMemory::open(name, attr, 0)?;
        if shm.size() < HEADER_SIZE {
            return Err(OsalError::InvalidParam);
        }

        let mapping = shm.map(RING_MAP)?;
        let (max_messages, max_message_size) =
            Self::adopt(&mapping).ok_or(OsalError::InvalidParam)?;
        Self::from_parts(shm, mapping, max_messages, max_message_size)
    }

    /// Geometry of an initialized ring that fits the mapping
    fn adopt(mapping: &ShmMapping) -> Option<(usize, usize)> {
        // SAFETY: the mapping is large enough for a header and page aligned.
        let hdr = unsafe { &*mapping.as_ptr().cast::<RingHeader>() };
        if hdr.magic.load(Ordering::Acquire) != IO_SHM_MAGIC {
            return None;
        }

        let max_messages = usize::try_from(hdr.max_messages).ok()?;
        let max_message_size = usize::try_from(hdr.max_message_size).ok()?;
        if max_messages < 2 || max_messages > u32::MAX as usize || max_message_size == 0 {
            return None;
        }
        if ring_size(max_messages, max_message_size).ok()? > mapping.len() {
            return None;
        }

        let in_range = |index: &AtomicU32| (index.load(Ordering::SeqCst) as usize) < max_messages;
        if !in_range(&hdr.read_index) || !in_range(&hdr.write_index) {
            return None;
        }
        Some((max_messages, max_message_size))
    }

    fn from_parts(
        shm: SharedMemory,
        mapping: ShmMapping,
        max_messages: usize,
        max_message_size: usize,
    ) -> OsalResult<Self> {
        if max_message_size == 0 {
            return Err(OsalError::InvalidParam);
        }
        Ok(ShmLog {
            mapping,
            _shm: shm,
            max_messages: u32::try_from(max_messages).map_err(|_| OsalError::InvalidParam)?,
            max_message_size,
        })
    }

    #[inline]
    fn header(&self) -> &RingHeader {
        // SAFETY: validated or initialized on construction; the mapping
        // lives as long as `self`.
        unsafe { &*self.mapping.as_ptr().cast::<RingHeader>() }
    }

    #[inline]
    fn slot(&self, index: u32) -> *mut u8 {
        // SAFETY: callers pass indices checked by `indices`, so the slot lies
        // inside the mapping.
        unsafe {
            self.mapping
                .as_ptr()
                .add(HEADER_SIZE + index as usize * self.max_message_size)
        }
    }

    /// Read and write index, reset to an empty ring if either is out of range
    ///
    /// Must be called with the ring mutex held.
    fn indices(&self, hdr: &RingHeader) -> (u32, u32) {
        let read = hdr.read_index.load(Ordering::SeqCst);
        let write = hdr.write_index.load(Ordering::SeqCst);
        if read < self.max_messages && write < self.max_messages {
            return (read, write);
        }

        crate::error!(
            "log ring indices {}/{} outside {} slots, discarding contents",
            read,
            write,
            self.max_messages
        );
        hdr.read_index.store(0, Ordering::SeqCst);
        hdr.write_index.store(0, Ordering::SeqCst);
        hdr.new_msg.store(false, Ordering::SeqCst);
        (0, 0)
    }

    /// Run `f` holding the ring mutex, repairing it after an owner died
    fn locked<R>(&self, f: impl FnOnce(&RingHeader) -> R) -> OsalResult<R> {
        let hdr = self.header();
        match hdr.mutex.lock() {
            Ok(()) => {}
            Err(OsalError::OwnerDead) => {
                crate::warn!("log ring owner died, recovering");
                hdr.mutex.consistent()?;
            }
            Err(e) => return Err(e),
        }

        let result = f(hdr);
        hdr.mutex.unlock()?;
        Ok(result)
    }

    /// Slots in the ring
    #[inline]
    pub fn max_messages(&self) -> usize {
        self.max_messages as usize
    }

    /// Bytes per slot, including the terminating NUL
    #[inline]
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Append `msg`, dropping the oldest unread message if the ring is full
    ///
    /// Messages longer than a slot are truncated. A corrupted read or write
    /// index empties the ring before the message is stored.
    ///
    /// # Returns
    /// * `Ok(())` - Message stored. A failed consumer wakeup is only
    ///   logged; waiting readers pick the message up with their next token.
    /// * `Err(_)` - Ring mutex could not be taken or released
    pub fn write(&self, msg: &[u8]) -> OsalResult<()> {
        let len = msg.len().min(self.max_message_size.saturating_sub(1));

        self.locked(|hdr| {
            let (read, write) = self.indices(hdr);
            let next = (write + 1) % self.max_messages;

            if next == read {
                let read = (next + 1) % self.max_messages;
                hdr.read_index.store(read, Ordering::SeqCst);
                crate::trace!("log ring full, dropped oldest message");
            }

            let slot = self.slot(write);
            // SAFETY: the slot is `max_message_size` bytes and guarded by the
            // ring mutex; `len` leaves room for the NUL.
            unsafe {
                ptr::copy_nonoverlapping(msg.as_ptr(), slot, len);
                slot.add(len).write(0);
            }

            hdr.write_index.store(next, Ordering::SeqCst);
            hdr.new_msg.store(true, Ordering::SeqCst);
        })?;

        if let Err(e) = self.header().sem.post() {
            crate::error!("log ring wakeup failed: {}", e);
        }
        Ok(())
    }

    /// Take the oldest message into `buf`
    ///
    /// Blocks until a message arrives or `deadline` passes; `None` waits
    /// without limit. The copy is cut to `buf.len()`.
    ///
    /// # Returns
    /// * `Ok(len)` - Bytes copied into `buf`
    /// * `Err(OsalError::Unavailable)` - No message before the deadline
    pub fn get_message(&self, buf: &mut [u8], deadline: Option<&Timer>) -> OsalResult<usize> {
        let hdr = self.header();

        loop {
            let waited = match deadline {
                Some(deadline) => hdr.sem.timedwait(deadline),
                None => hdr.sem.wait(),
            };
            match waited {
                Ok(()) => {}
                Err(OsalError::Interrupted) => continue,
                Err(OsalError::Timeout) => return Err(OsalError::Unavailable),
                Err(e) => return Err(e),
            }

            // Dropped messages leave surplus tokens behind; keep waiting.
            if let Some(len) = self.locked(|hdr| self.take(hdr, buf))? {
                return Ok(len);
            }
        }
    }

    fn take(&self, hdr: &RingHeader, buf: &mut [u8]) -> Option<usize> {
        let (read, write) = self.indices(hdr);
        if read == write {
            hdr.new_msg.store(false, Ordering::SeqCst);
            return None;
        }

        let slot = self.slot(read);
        // SAFETY: the slot is `max_message_size` bytes and guarded by the
        // ring mutex.
        let stored = unsafe { std::slice::from_raw_parts(slot, self.max_message_size) };
        let msg_len = stored.iter().position(|&b| b == 0).unwrap_or(stored.len());
        let len = msg_len.min(buf.len());
        buf[..len].copy_from_slice(&stored[..len]);

        let next = (read + 1) % self.max_messages;
        hdr.read_index.store(next, Ordering::SeqCst);
        if next == write {
            hdr.new_msg.store(false, Ordering::SeqCst);
        }
        Some(len)
    }

    /// Check if a message is waiting
    pub fn has_message(&self) -> bool {
        self.header().new_msg.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ShmLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShmLog")
            .field("max_messages", &self.max_messages)
            .field("max_message_size", &self.max_message_size)
            .finish()
    }
}

/// Lay out a fresh header at `hdr`
///
/// # Safety
/// `hdr` must point to writable, suitably aligned memory of at least
/// `ring_size(max_messages, max_message_size)` bytes that nobody else uses.
unsafe fn init_header(
    hdr: *mut RingHeader,
    max_messages: usize,
    max_message_size: usize,
) -> OsalResult<()> {
    // SAFETY: forwarded from the caller.
    unsafe {
        addr_of_mut!((*hdr).magic).write(AtomicU32::new(0));
        addr_of_mut!((*hdr).max_messages).write(max_messages as u64);
        addr_of_mut!((*hdr).max_message_size).write(max_message_size as u64);
        addr_of_mut!((*hdr).mutex).write(port::Mutex::uninit());
        addr_of_mut!((*hdr).sem).write(port::Semaphore::uninit());
        addr_of_mut!((*hdr).new_msg).write(AtomicBool::new(false));
        addr_of_mut!((*hdr).read_index).write(AtomicU32::new(0));
        addr_of_mut!((*hdr).write_index).write(AtomicU32::new(0));
    }

    // SAFETY: every field is initialized now.
    let hdr = unsafe { &*hdr };

    let mutex_attr = SyncAttr::new().with_robust(true).with_process_shared(true);
    // SAFETY: the header stays at this address for the life of the object.
    unsafe { hdr.mutex.init(mutex_attr)? };
    // SAFETY: as above.
    unsafe { hdr.sem.init(SyncAttr::new().with_process_shared(true), 0)? };

    hdr.magic.store(IO_SHM_MAGIC, Ordering::Release);
    Ok(())
}

// ============ Process-wide sink ============

static SINK: CsMutex<RefCell<Option<Arc<ShmLog>>>> = CsMutex::new(RefCell::new(None));

/// Route [`printf`] output into the ring `name`
///
/// Creates and initializes the ring unless one is already there.
pub fn shm_setup(name: &str, max_messages: usize, max_message_size: usize) -> OsalResult<()> {
    let log = ShmLog::create(name, max_messages, max_message_size)?;
    cs_replace(&SINK, Some(Arc::new(log)));
    Ok(())
}

/// Route [`printf`] output back to standard output
pub fn shm_close() {
    cs_replace(&SINK, None);
}

/// Current sink, if any
pub fn shm_sink() -> Option<Arc<ShmLog>> {
    cs_load(&SINK)
}

/// Take the next message from the process-wide ring
///
/// # Returns
/// * `Err(OsalError::Unavailable)` - No message before `deadline`, or no
///   ring set up
pub fn shm_get_message(buf: &mut [u8], deadline: Option<&Timer>) -> OsalResult<usize> {
    match shm_sink() {
        Some(log) => log.get_message(buf, deadline),
        None => Err(OsalError::Unavailable),
    }
}

/// Fixed stack buffer that silently truncates
struct FormatBuf {
    buf: [u8; IO_FORMAT_BUF_SIZE],
    len: usize,
}

impl FormatBuf {
    const fn new() -> Self {
        FormatBuf {
            buf: [0; IO_FORMAT_BUF_SIZE],
            len: 0,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl fmt::Write for FormatBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let n = s.len().min(self.buf.len() - self.len);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        Ok(())
    }
}

fn emit(bytes: &[u8]) -> OsalResult<()> {
    match shm_sink() {
        Some(log) => log.write(bytes),
        None => std::io::stdout()
            .lock()
            .write_all(bytes)
            .map_err(|_| OsalError::OperationFailed),
    }
}

/// Format and emit one message; output past the format buffer is cut
pub fn printf(args: fmt::Arguments<'_>) -> OsalResult<()> {
    let mut buf = FormatBuf::new();
    let _ = fmt::write(&mut buf, args);
    emit(buf.as_bytes())
}

/// Emit `s` followed by a newline
pub fn puts(s: &str) -> OsalResult<()> {
    printf(format_args!("{}\n", s))
}

/// Formatted output into the shared memory ring, or standard output when
/// no ring is set up
#[macro_export]
macro_rules! osal_printf {
    ($($arg:tt)*) => {
        $crate::io::printf(format_args!($($arg)*))
    };
}
