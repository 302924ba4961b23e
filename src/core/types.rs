//! Core type definitions for the OSAL
//!
//! Attribute words and flag sets shared by all back-ends. The bit layouts
//! are part of the ABI; user code stores and exchanges them as raw `u32`.

use bitfield_struct::bitfield;
use bitflags::bitflags;

/// Task priority as understood by the host scheduler
pub type Priority = i32;

/// Message priority of a queued message
pub type MsgPrio = u32;

/// Permission bits of named objects
pub type Mode = u32;

// ============ Synchronization attribute word ============

/// Mutex type, bits 0-1 of [`SyncAttr`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum MutexType {
    /// Relocking by the owner deadlocks
    #[default]
    Normal = 0,
    /// Relocking by the owner returns `DeadLock`
    ErrorCheck = 1,
    /// Relocking by the owner nests
    Recursive = 2,
    /// Encoding `3` has no meaning; rejected at init
    Invalid = 3,
}

impl MutexType {
    const fn into_bits(self) -> u8 {
        self as u8
    }

    const fn from_bits(value: u8) -> Self {
        match value {
            0 => MutexType::Normal,
            1 => MutexType::ErrorCheck,
            2 => MutexType::Recursive,
            _ => MutexType::Invalid,
        }
    }
}

/// Mutex priority protocol, bits 8-9 of [`SyncAttr`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum MutexProtocol {
    #[default]
    None = 0,
    /// Holder inherits the priority of the highest waiter
    Inherit = 1,
    /// Holder runs at the ceiling stored in bits 16-31
    Protect = 2,
    /// Encoding `3` has no meaning; rejected at init
    Invalid = 3,
}

impl MutexProtocol {
    const fn into_bits(self) -> u8 {
        self as u8
    }

    const fn from_bits(value: u8) -> Self {
        match value {
            0 => MutexProtocol::None,
            1 => MutexProtocol::Inherit,
            2 => MutexProtocol::Protect,
            _ => MutexProtocol::Invalid,
        }
    }
}

/// Attribute word of mutexes, spinlocks, condition variables and binary
/// semaphores
///
/// ```text
///  31            16 15   10 9  8 7  6  5   4   3  2 1  0
/// +----------------+-------+----+----+---+---+----+----+
/// |  prio ceiling  |   -   |prot|  - |psh|rob|  - |type|
/// +----------------+-------+----+----+---+---+----+----+
/// ```
#[bitfield(u32)]
#[derive(PartialEq, Eq, Hash)]
pub struct SyncAttr {
    /// Mutex type
    #[bits(2)]
    pub kind: MutexType,
    #[bits(2)]
    __: u8,
    /// Owner-death recovery
    pub robust: bool,
    /// Usable from several processes when placed in shared memory
    pub process_shared: bool,
    #[bits(2)]
    __: u8,
    /// Priority protocol
    #[bits(2)]
    pub protocol: MutexProtocol,
    #[bits(6)]
    __: u8,
    /// Priority ceiling for [`MutexProtocol::Protect`]
    #[bits(16)]
    pub prio_ceiling: u16,
}

impl SyncAttr {
    /// Rejects encodings with no meaning
    pub fn is_valid(&self) -> bool {
        self.kind() != MutexType::Invalid && self.protocol() != MutexProtocol::Invalid
    }
}

/// Mutex attribute word
pub type MutexAttr = SyncAttr;
/// Spinlock attribute word
pub type SpinlockAttr = SyncAttr;
/// Condition variable attribute word
pub type CondvarAttr = SyncAttr;
/// Binary semaphore attribute word
pub type BinarySemaphoreAttr = SyncAttr;
/// Counting semaphore attribute word; only `process_shared` is honored
pub type SemaphoreAttr = SyncAttr;

// ============ Message queue attributes ============

bitflags! {
    /// Open flags of a message queue
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MqFlags: u32 {
        const RDONLY   = 0x0000_0001;
        const WRONLY   = 0x0000_0002;
        const RDWR     = 0x0000_0004;
        const CREAT    = 0x0000_0008;
        const CLOEXEC  = 0x0000_0010;
        const EXCL     = 0x0000_0020;
        /// Full/empty queues return `Busy` instead of blocking
        const NONBLOCK = 0x0000_0040;
    }
}

/// Message queue attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MqAttr {
    pub oflags: MqFlags,
    pub mode: Mode,
    pub max_messages: usize,
    pub max_message_size: usize,
}

impl MqAttr {
    /// Read-write, create-if-missing queue with mode `0o644`
    pub const fn new(max_messages: usize, max_message_size: usize) -> Self {
        MqAttr {
            oflags: MqFlags::RDWR.union(MqFlags::CREAT),
            mode: 0o644,
            max_messages,
            max_message_size,
        }
    }

    pub const fn with_flags(mut self, oflags: MqFlags) -> Self {
        self.oflags = oflags;
        self
    }

    pub const fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }
}

// ============ Shared memory attributes ============

/// Open attribute word of a shared memory object
///
/// Flags in the low bits, creation mode in bits 16-31.
#[bitfield(u32)]
#[derive(PartialEq, Eq, Hash)]
pub struct ShmAttr {
    pub rdonly: bool,
    pub rdwr: bool,
    pub creat: bool,
    pub excl: bool,
    pub trunc: bool,
    /// Object is intended to be mapped
    pub map: bool,
    #[bits(10)]
    __: u16,
    /// Permission bits used on creation
    #[bits(16)]
    pub mode: u16,
}

impl ShmAttr {
    /// Read-write, create-if-missing, mappable, mode `0o666`
    pub fn create_rw() -> Self {
        ShmAttr::new()
            .with_rdwr(true)
            .with_creat(true)
            .with_map(true)
            .with_mode(0o666)
    }
}

bitflags! {
    /// Protection and sharing of a shared memory mapping
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShmMapAttr: u32 {
        const PROT_EXEC  = 0x0000_0001;
        const PROT_READ  = 0x0000_0002;
        const PROT_WRITE = 0x0000_0004;
        const PROT_NONE  = 0x0000_0008;
        const SHARED     = 0x0000_0100;
        const PRIVATE    = 0x0000_0200;
    }
}

// ============ Task types ============

/// Scheduling policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum SchedPolicy {
    /// Time-sharing default policy
    #[default]
    Other = 0,
    /// Real-time first-in first-out
    Fifo = 1,
    /// Real-time round-robin
    RoundRobin = 2,
}

/// Task state as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    /// Host does not know the task
    UnknownId = 0,
    /// Running or runnable
    Active = 1,
    /// Stopped
    Inactive = 2,
    /// Waiting on a resource or sleeping
    Blocked = 3,
}
