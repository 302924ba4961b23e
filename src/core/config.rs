//! Configuration for the OSAL
//!
//! Compile-time limits plus the process-wide runtime configuration handed
//! to [`crate::kernel::init`].

/// Maximum task name length including the terminating NUL
pub const TASK_NAME_LEN: usize = 64;

/// Nanoseconds per second
pub const NSEC_PER_SEC: u64 = 1_000_000_000;

/// Number of CPUs addressable by an affinity mask
pub const CPU_SET_BITS: usize = 64;

/// Longest message queue name accepted, without the leading slash
pub const MQ_NAME_MAX: usize = 255;

/// Longest shared memory name accepted, without the leading slash
pub const SHM_NAME_MAX: usize = 255;

/// Magic word tagging an initialized logging ring
pub const IO_SHM_MAGIC: u32 = 0x00AF_FE00;

/// Stack buffer used to format one log message
pub const IO_FORMAT_BUF_SIZE: usize = 530;

/// Default slot count of the logging ring
pub const IO_SHM_DEFAULT_MAX_MSGS: usize = 100;

/// Default slot size of the logging ring
pub const IO_SHM_DEFAULT_MAX_MSG_SIZE: usize = 512;

/// Clock that absolute deadlines are expressed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockSource {
    /// Steady clock, unaffected by wall-clock adjustments
    #[default]
    Monotonic,
    /// Wall clock; jumps are visible to waiters
    Realtime,
}

/// Process-wide runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OsalConfig {
    /// Clock used by timers, sleeps and condition variables
    pub clock: ClockSource,
}

impl OsalConfig {
    pub const fn new() -> Self {
        OsalConfig {
            clock: ClockSource::Monotonic,
        }
    }

    pub const fn with_clock(mut self, clock: ClockSource) -> Self {
        self.clock = clock;
        self
    }
}
