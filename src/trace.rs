//! Timing trace
//!
//! Double-buffered capture of nanosecond time stamps. Recording never
//! blocks: each sample goes into the active buffer, and when that buffer
//! is full the buffers swap and [`Trace::timedwait`] wakes up. Analysis
//! then runs on the buffer that just filled while capture continues on the
//! other one.
//!
//! Capture is lock-free. The active buffer and the write position live in
//! one packed atomic word; each sample claims its slot with a
//! compare-and-swap, and the claim of a buffer's last slot also performs
//! the swap.
//!
//! ```no_run
//! # use osal::trace::Trace;
//! # use osal::time::Timer;
//! # fn main() -> osal::OsalResult<()> {
//! let trace = Trace::new(1000)?;
//! // cyclic task: trace.point();
//! trace.timedwait(&Timer::with_timeout(2_000_000_000))?;
//! let stats = trace.analyze();
//! println!("period {} ns, jitter {} ns", stats.avg, stats.avg_jit);
//! # Ok(())
//! # }
//! ```

use portable_atomic::{AtomicU64, Ordering};

use crate::error::{OsalError, OsalResult};
use crate::sync::binary_sem::BinarySemaphore;
use crate::time::Timer;
use crate::types::BinarySemaphoreAttr;

/// Result of a trace analysis, all in nanoseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceStats {
    /// Mean interval
    pub avg: u64,
    /// Standard deviation of the intervals
    pub avg_jit: u64,
    /// Largest absolute deviation from the mean
    pub max_jit: u64,
}

/// Double-buffered time stamp trace
pub struct Trace {
    bufs: [Box<[AtomicU64]>; 2],
    cnt: usize,
    /// Active buffer in bit 32, next write position in the low word
    state: AtomicU64,
    last: AtomicU64,
    full: BinarySemaphore,
}

const ACT_SHIFT: u32 = 32;
const POS_MASK: u64 = u32::MAX as u64;

#[inline]
fn pack(act: usize, pos: usize) -> u64 {
    ((act as u64) << ACT_SHIFT) | pos as u64
}

#[inline]
fn unpack(state: u64) -> (usize, usize) {
    ((state >> ACT_SHIFT) as usize & 1, (state & POS_MASK) as usize)
}

fn alloc_buf(cnt: usize) -> Box<[AtomicU64]> {
    (0..cnt).map(|_| AtomicU64::new(0)).collect()
}

impl Trace {
    /// Allocate a trace with two buffers of `cnt` samples
    ///
    /// # Returns
    /// * `Err(OsalError::InvalidParam)` - `cnt` below 2 or above `u32::MAX`
    pub fn new(cnt: usize) -> OsalResult<Self> {
        if cnt < 2 || cnt as u64 > POS_MASK {
            return Err(OsalError::InvalidParam);
        }

        Ok(Trace {
            bufs: [alloc_buf(cnt), alloc_buf(cnt)],
            cnt,
            state: AtomicU64::new(pack(0, 0)),
            last: AtomicU64::new(0),
            full: BinarySemaphore::new(BinarySemaphoreAttr::new())?,
        })
    }

    /// Samples per buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.cnt
    }

    /// Always false; a trace holds at least two samples per buffer
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Record the current time and return it
    pub fn point(&self) -> u64 {
        let ns = Timer::now_nsec();
        self.time(ns);
        ns
    }

    /// Record an externally taken time stamp
    ///
    /// Safe to call from several tasks at once; each sample gets its own
    /// slot.
    pub fn time(&self, ns: u64) {
        let mut cur = self.state.load(Ordering::Acquire);
        let (act, pos) = loop {
            let (act, pos) = unpack(cur);
            let next = if pos + 1 == self.cnt {
                pack(act ^ 1, 0)
            } else {
                pack(act, pos + 1)
            };
            match self
                .state
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break (act, pos),
                Err(actual) => cur = actual,
            }
        };

        self.bufs[act][pos].store(ns, Ordering::Release);
        self.last.store(ns, Ordering::Release);

        if pos + 1 == self.cnt {
            if let Err(e) = self.full.post() {
                crate::warn!("trace wakeup failed: {}", e);
            }
        }
    }

    /// Most recently recorded time stamp, 0 before the first one
    pub fn get_last_time(&self) -> u64 {
        self.last.load(Ordering::Acquire)
    }

    /// Wait until a buffer has filled up
    ///
    /// # Returns
    /// * `Err(OsalError::Timeout)` - No buffer filled before `deadline`
    pub fn timedwait(&self, deadline: &Timer) -> OsalResult<()> {
        self.full.timedwait(deadline)
    }

    /// Copy of the buffer that filled last
    fn filled(&self) -> Vec<u64> {
        let (act, _) = unpack(self.state.load(Ordering::Acquire));
        self.bufs[act ^ 1]
            .iter()
            .map(|t| t.load(Ordering::Acquire))
            .collect()
    }

    /// Statistics of the intervals between consecutive time stamps
    pub fn analyze(&self) -> TraceStats {
        let samples = self.filled();
        let intervals: Vec<u64> = samples
            .windows(2)
            .map(|w| w[1].wrapping_sub(w[0]))
            .collect();
        stats(&intervals)
    }

    /// Statistics of samples that already are intervals
    pub fn analyze_rel(&self) -> TraceStats {
        stats(&self.filled())
    }
}

impl std::fmt::Debug for Trace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (act, pos) = unpack(self.state.load(Ordering::Relaxed));
        f.debug_struct("Trace")
            .field("cnt", &self.cnt)
            .field("pos", &pos)
            .field("act_buf", &act)
            .finish()
    }
}

/// Mean, standard deviation and largest deviation of `values`
pub fn stats(values: &[u64]) -> TraceStats {
    if values.is_empty() {
        return TraceStats::default();
    }

    let n = values.len() as u128;
    let avg = (values.iter().map(|&v| u128::from(v)).sum::<u128>() / n) as u64;

    let mut max_jit = 0u64;
    let mut sq_sum = 0u128;
    for &v in values {
        let dev = v.abs_diff(avg);
        max_jit = max_jit.max(dev);
        sq_sum += u128::from(dev) * u128::from(dev);
    }

    TraceStats {
        avg,
        avg_jit: ((sq_sum / n) as f64).sqrt() as u64,
        max_jit,
    }
}
