// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Task control block

use core::ptr::NonNull;

use super::state::{Pid, TaskFlags, TaskState};

/// Task control block
#[derive(Debug)]
pub struct Task {
    /// Unique task ID
    pub(crate) pid: Pid,
    /// Task state
    pub(crate) state: TaskState,
    /// Creation attributes
    pub(crate) flags: TaskFlags,
    /// Saved stack pointer, valid only while the task is not running
    pub(crate) sp: usize,
    /// Heap-allocated stack (none for the boot task)
    pub(crate) stack: Option<NonNull<u8>>,
    /// Tick at which a blocked task becomes ready again
    pub(crate) wake_tick: u64,
    /// Slot of the next task in the ready ring
    pub(crate) next: usize,
    /// Number of times this task has been promoted to running
    pub(crate) schedule_count: u64,
}

// SAFETY: the stack buffer is owned exclusively by this task and only
// touched under the task table lock.
unsafe impl Send for Task {}

impl Task {
    pub(crate) fn new(pid: Pid, state: TaskState, flags: TaskFlags, stack: Option<NonNull<u8>>, sp: usize) -> Self {
        Self {
            pid,
            state,
            flags,
            sp,
            stack,
            wake_tick: 0,
            next: 0,
            schedule_count: 0,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn flags(&self) -> TaskFlags {
        self.flags
    }

    /// Deadline of a blocked task
    pub fn wake_tick(&self) -> Option<u64> {
        (self.state == TaskState::Blocked).then_some(self.wake_tick)
    }

    pub fn schedule_count(&self) -> u64 {
        self.schedule_count
    }

    /// Base of the task's heap stack
    pub fn stack(&self) -> Option<NonNull<u8>> {
        self.stack
    }

    /// Whether this is the lowest-priority fallback task
    pub fn is_idle(&self) -> bool {
        self.flags.contains(TaskFlags::IDLE)
    }
}
