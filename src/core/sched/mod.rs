//! Scheduling policy and priority handling
//!
//! Priorities are always clamped into the range the host reports for the
//! target policy before they are applied.

use crate::error::OsalResult;
use crate::port::{Host, TaskBackend};
use crate::prio::clamp_priority;
use crate::types::{Priority, SchedPolicy};

/// Inclusive priority range of a policy
#[inline]
pub fn priority_range(policy: SchedPolicy) -> OsalResult<(Priority, Priority)> {
    Host::priority_range(policy)
}

/// Clamp `priority` into the range of `policy`
pub fn clamp(policy: SchedPolicy, priority: Priority) -> OsalResult<Priority> {
    Ok(clamp_priority(priority, priority_range(policy)?))
}

/// Apply policy and clamped priority to a host thread
pub(crate) fn apply(
    id: <Host as TaskBackend>::Id,
    policy: SchedPolicy,
    priority: Priority,
) -> OsalResult<()> {
    let priority = clamp(policy, priority)?;
    Host::set_sched(id, policy, priority)
}
