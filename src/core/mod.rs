//! Core OSAL modules
//!
//! Contains configuration, errors, process state, scheduling helpers,
//! task management and time management.

pub mod config;
pub mod critical;
pub mod error;
pub mod kernel;
pub mod prio;
pub mod types;
pub mod task;
pub mod sched;
pub mod time;
