// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Task state and flags

use bitflags::bitflags;
use core::fmt;

use crate::mm::HeapError;

/// Process identifier; monotonic, never reused
pub type Pid = u32;

/// Task states
///
/// ```text
/// READY -> RUNNING -> READY        (yield / preemption)
///                  -> BLOCKED      (sleep) -> READY once the deadline passes
///                  -> TERMINATED   (exit, terminal)
/// ```
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Task is ready to run
    Ready,
    /// Task is currently running
    Running,
    /// Task is sleeping until its wake tick
    Blocked,
    /// Task has exited; its slot is never reused
    Terminated,
}

impl TaskState {
    /// Check if the task can be picked by the scheduler
    pub const fn is_runnable(&self) -> bool {
        matches!(self, Self::Ready | Self::Running)
    }

    /// Check if the task has not exited yet
    pub const fn is_alive(&self) -> bool {
        !matches!(self, Self::Terminated)
    }
}

bitflags! {
    /// Task attributes fixed at creation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TaskFlags: u8 {
        /// Runs on the boot stack, which the heap does not own
        const BOOT = 1 << 0;
        /// Lowest-priority sink, picked only when nothing else can run
        const IDLE = 1 << 1;
    }
}

/// Task management errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    /// `task_table_init` has not run yet
    NotInitialized,
    /// `task_table_init` already ran
    AlreadyInitialized,
    /// Every task slot has been handed out
    TableFull,
    /// The stack could not be allocated
    StackAllocation(HeapError),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => f.write_str("task table not initialized"),
            Self::AlreadyInitialized => f.write_str("task table already initialized"),
            Self::TableFull => f.write_str("task table full"),
            Self::StackAllocation(err) => write!(f, "task stack allocation failed: {}", err),
        }
    }
}
