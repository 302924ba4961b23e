//! CPU sets and priority ranges
//!
//! Affinity masks are a bitmap with one bit per CPU; bit 0 is CPU 0. An
//! empty set means "inherit the creator's affinity".

use crate::config::CPU_SET_BITS;
use crate::types::Priority;

/// CPU affinity bitmap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CpuSet {
    bitmap: u64,
}

impl CpuSet {
    pub const fn new() -> Self {
        CpuSet { bitmap: 0 }
    }

    /// Set from a raw mask
    #[inline]
    pub const fn from_mask(mask: u64) -> Self {
        CpuSet { bitmap: mask }
    }

    /// Raw mask
    #[inline]
    pub const fn mask(&self) -> u64 {
        self.bitmap
    }

    /// Add a CPU; CPUs beyond the bitmap are ignored
    #[inline]
    pub fn insert(&mut self, cpu: usize) {
        if cpu < CPU_SET_BITS {
            self.bitmap |= 1 << cpu;
        }
    }

    /// Remove a CPU
    #[inline]
    pub fn remove(&mut self, cpu: usize) {
        if cpu < CPU_SET_BITS {
            self.bitmap &= !(1 << cpu);
        }
    }

    /// Check if a CPU is part of the set
    #[inline]
    pub fn is_set(&self, cpu: usize) -> bool {
        cpu < CPU_SET_BITS && (self.bitmap & (1 << cpu)) != 0
    }

    /// Check if the set is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bitmap == 0
    }

    /// Number of CPUs in the set
    #[inline]
    pub fn count(&self) -> u32 {
        self.bitmap.count_ones()
    }

    /// Lowest CPU in the set
    #[inline]
    pub fn first(&self) -> Option<usize> {
        if self.bitmap == 0 {
            None
        } else {
            Some(self.bitmap.trailing_zeros() as usize)
        }
    }

    /// CPUs in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> {
        let bitmap = self.bitmap;
        (0..CPU_SET_BITS).filter(move |&cpu| bitmap & (1 << cpu) != 0)
    }
}

impl FromIterator<usize> for CpuSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = CpuSet::new();
        for cpu in iter {
            set.insert(cpu);
        }
        set
    }
}

/// Clamp a priority into the inclusive range of a policy
#[inline]
pub fn clamp_priority(priority: Priority, (min, max): (Priority, Priority)) -> Priority {
    priority.max(min).min(max)
}
