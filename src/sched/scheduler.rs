// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Task table and round-robin selection
//!
//! Tasks live in a fixed array of slots. Slots are handed out in order and
//! never reclaimed, so a slot index is a stable handle for the lifetime of
//! the kernel. The ready ring is threaded through [`Task::next`] as slot
//! indices, in creation order; terminated tasks stay linked and are skipped.
//!
//! This type only makes decisions. It never switches stacks itself: it
//! hands back a [`SwitchFrame`] that the caller passes to the architecture
//! after releasing the table lock.

use core::ptr::NonNull;

use super::state::{Pid, TaskError, TaskFlags, TaskState};
use super::task::Task;
use crate::config::MAX_TASKS;

/// Operands for `Arch::switch`
#[derive(Debug)]
pub struct SwitchFrame {
    /// Where the outgoing task's stack pointer is saved
    pub save: *mut usize,
    /// Stack pointer of the incoming task
    pub next: usize,
}

/// Task table and scheduling state
pub struct Scheduler {
    /// All tasks in the system, indexed by slot
    tasks: [Option<Task>; MAX_TASKS],
    /// Number of slots handed out
    count: usize,
    /// Slot of the running task
    current: Option<usize>,
    /// Slot of the idle task
    idle: Option<usize>,
    /// Last slot linked into the ring
    tail: Option<usize>,
    next_pid: Pid,
}

impl Scheduler {
    /// Create an empty task table
    pub const fn new() -> Self {
        Self {
            tasks: [const { None }; MAX_TASKS],
            count: 0,
            current: None,
            idle: None,
            tail: None,
            next_pid: 1,
        }
    }

    /// Whether a current task exists
    pub fn is_initialized(&self) -> bool {
        self.current.is_some()
    }

    /// Whether every slot has been handed out
    pub fn is_full(&self) -> bool {
        self.count >= MAX_TASKS
    }

    /// Number of slots handed out (terminated tasks included)
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether no task has been adopted or added yet
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Wrap the code that is already executing as the first, running task
    ///
    /// Its stack pointer is filled in by the first switch away from it.
    pub fn adopt_boot_task(&mut self) -> Result<Pid, TaskError> {
        if !self.is_empty() {
            return Err(TaskError::AlreadyInitialized);
        }
        let slot = self.insert(None, 0, TaskFlags::BOOT)?;
        let task = self.slot_mut(slot);
        task.state = TaskState::Running;
        task.schedule_count = 1;
        let pid = task.pid;
        self.current = Some(slot);
        Ok(pid)
    }

    /// Add a ready task whose initial frame sits at `sp`
    pub fn add_task(&mut self, stack: Option<NonNull<u8>>, sp: usize, flags: TaskFlags) -> Result<Pid, TaskError> {
        if self.current.is_none() {
            return Err(TaskError::NotInitialized);
        }
        let slot = self.insert(stack, sp, flags)?;
        if flags.contains(TaskFlags::IDLE) {
            self.idle = Some(slot);
        }
        Ok(self.slot(slot).pid)
    }

    fn insert(&mut self, stack: Option<NonNull<u8>>, sp: usize, flags: TaskFlags) -> Result<usize, TaskError> {
        if self.is_full() {
            return Err(TaskError::TableFull);
        }
        let slot = self.count;
        let pid = self.next_pid;
        self.tasks[slot] = Some(Task::new(pid, TaskState::Ready, flags, stack, sp));
        self.count += 1;
        self.next_pid += 1;
        self.link(slot);
        Ok(slot)
    }

    /// Append `slot` to the ring, right before its head
    fn link(&mut self, slot: usize) {
        match self.tail {
            None => self.slot_mut(slot).next = slot,
            Some(tail) => {
                let head = self.slot(tail).next;
                self.slot_mut(slot).next = head;
                self.slot_mut(tail).next = slot;
            }
        }
        self.tail = Some(slot);
    }

    /// Pick the task that should run next
    ///
    /// Walks the ring once starting after the current task. The first
    /// ready non-idle task wins. Failing that, the current task keeps the
    /// CPU if it is still runnable, then the idle task is used. `None` means nothing
    /// is runnable and the caller has to wait for an interrupt.
    pub fn select_next(&self) -> Option<usize> {
        let current = self.current?;
        let mut idle = None;

        let mut slot = self.slot(current).next;
        for _ in 0..self.count {
            if slot == current {
                break;
            }
            let task = self.slot(slot);
            if task.state == TaskState::Ready {
                if task.is_idle() {
                    idle = Some(slot);
                } else {
                    return Some(slot);
                }
            }
            slot = task.next;
        }

        if self.slot(current).state.is_runnable() {
            return Some(current);
        }
        idle
    }

    /// Make `slot` the running task
    ///
    /// The outgoing task is demoted to ready only if it is still running;
    /// blocked and terminated tasks keep their state. Returns `None` when
    /// `slot` is already current and no switch is needed.
    pub fn switch_to(&mut self, slot: usize) -> Option<SwitchFrame> {
        let prev = self.current?;
        if slot == prev {
            self.slot_mut(slot).state = TaskState::Running;
            return None;
        }

        let outgoing = self.slot_mut(prev);
        if outgoing.state == TaskState::Running {
            outgoing.state = TaskState::Ready;
        }
        let save = &mut outgoing.sp as *mut usize;

        let incoming = self.slot_mut(slot);
        incoming.state = TaskState::Running;
        incoming.schedule_count += 1;
        let next = incoming.sp;

        self.current = Some(slot);
        Some(SwitchFrame { save, next })
    }

    /// Put the current task to sleep until `wake_tick`
    pub fn block_current(&mut self, wake_tick: u64) -> bool {
        match self.current {
            Some(slot) => {
                let task = self.slot_mut(slot);
                task.state = TaskState::Blocked;
                task.wake_tick = wake_tick;
                true
            }
            None => false,
        }
    }

    /// Mark the current task terminated and hand back its stack
    pub fn terminate_current(&mut self) -> Option<NonNull<u8>> {
        let slot = self.current?;
        let task = self.slot_mut(slot);
        task.state = TaskState::Terminated;
        task.stack.take()
    }

    /// Move every blocked task whose deadline has passed back to ready
    pub fn wake_sleepers(&mut self, now: u64) -> usize {
        let mut woken = 0;
        for task in self.tasks.iter_mut().flatten() {
            if task.state == TaskState::Blocked && task.wake_tick <= now {
                task.state = TaskState::Ready;
                woken += 1;
            }
        }
        woken
    }

    /// Look up a task by pid
    pub fn task(&self, pid: Pid) -> Option<&Task> {
        self.tasks().find(|task| task.pid == pid)
    }

    /// State of the task with `pid`
    pub fn state_of(&self, pid: Pid) -> Option<TaskState> {
        self.task(pid).map(Task::state)
    }

    /// The running task
    pub fn current(&self) -> Option<&Task> {
        self.current.map(|slot| self.slot(slot))
    }

    pub fn current_pid(&self) -> Option<Pid> {
        self.current().map(Task::pid)
    }

    pub fn idle_pid(&self) -> Option<Pid> {
        self.idle.map(|slot| self.slot(slot).pid)
    }

    /// Iterate over every task in slot order
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter().flatten()
    }

    fn slot(&self, slot: usize) -> &Task {
        match &self.tasks[slot] {
            Some(task) => task,
            None => unreachable!("ring links only populated slots"),
        }
    }

    fn slot_mut(&mut self, slot: usize) -> &mut Task {
        match &mut self.tasks[slot] {
            Some(task) => task,
            None => unreachable!("ring links only populated slots"),
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
