//! Task attributes
//!
//! Name, scheduling policy, priority and CPU affinity of a task.

use crate::config::TASK_NAME_LEN;
use crate::prio::CpuSet;
use crate::types::{Priority, SchedPolicy};

/// Task attributes
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskAttr {
    // ============ Identification ============
    /// Task name, at most `TASK_NAME_LEN - 1` bytes
    name: String,

    // ============ Scheduling ============
    /// Scheduling policy
    pub policy: SchedPolicy,
    /// Priority, clamped to the policy's range when applied
    pub priority: Priority,

    // ============ Placement ============
    /// CPUs the task may run on; empty inherits the creator's set
    pub affinity: CpuSet,
}

impl TaskAttr {
    /// Attributes with a name and host defaults for everything else
    pub fn new(name: &str) -> Self {
        let mut attr = TaskAttr::default();
        attr.set_name(name);
        attr
    }

    pub fn with_policy(mut self, policy: SchedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_affinity(mut self, affinity: CpuSet) -> Self {
        self.affinity = affinity;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the name, truncating on a character boundary
    pub fn set_name(&mut self, name: &str) {
        let mut end = name.len().min(TASK_NAME_LEN - 1);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        self.name = name[..end].to_owned();
    }

    /// Check if policy or priority differ from the host default
    #[inline]
    pub(crate) fn has_sched_override(&self) -> bool {
        self.policy != SchedPolicy::Other || self.priority != 0
    }
}
