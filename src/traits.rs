// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Cross-architecture traits
//!
//! The scheduler and the timer never touch registers directly. Everything
//! that needs a privileged instruction or a hand-written stack layout goes
//! through [`Arch`], which has exactly one real implementation per target
//! (`arch::amd64::Amd64`) and a recording double for host tests.

/// Entry point of a kernel task; receives the argument given to `task_create`
pub type TaskEntry = extern "C" fn(usize);

/// Routine a task falls into when its entry function returns
pub type TaskReturn = extern "C" fn() -> !;

/// Trait for the CPU operations the scheduler depends on
pub trait Arch: Sync {
    /// Whether maskable interrupts are currently enabled
    fn interrupts_enabled(&self) -> bool;

    /// Mask interrupts (`cli`)
    fn disable_interrupts(&self);

    /// Unmask interrupts (`sti`)
    fn enable_interrupts(&self);

    /// Atomically unmask interrupts and halt until the next one arrives,
    /// then mask them again
    fn wait_for_interrupt(&self);

    /// Stop this execution context for good
    fn halt(&self) -> !;

    /// Body of the idle task
    fn idle_entry(&self) -> TaskEntry;

    /// Build the initial frame of a new task at the top of its stack
    ///
    /// Returns the stack pointer to hand to [`switch`](Self::switch). When
    /// restored, the frame enters `entry(arg)` with interrupts enabled, and
    /// falls into `on_return` if `entry` returns.
    ///
    /// # Safety
    ///
    /// `stack .. stack + size` must be writable memory exclusively owned by
    /// the new task.
    unsafe fn prepare_stack(
        &self,
        stack: *mut u8,
        size: usize,
        entry: TaskEntry,
        arg: usize,
        on_return: TaskReturn,
    ) -> usize;

    /// Save the callee-saved registers and stack pointer into `*save`, then
    /// resume the context whose stack pointer is `next`
    ///
    /// Returns once some other context switches back to the saved one.
    ///
    /// # Safety
    ///
    /// Must be called with interrupts disabled. `save` must stay valid until
    /// the saved context is resumed, and `next` must come from
    /// [`prepare_stack`](Self::prepare_stack) or an earlier `switch`.
    unsafe fn switch(&self, save: *mut usize, next: usize);

    /// Run `f` with interrupts masked, restoring the previous state after
    fn without_interrupts<R>(&self, f: impl FnOnce() -> R) -> R {
        let was_enabled = self.interrupts_enabled();
        if was_enabled {
            self.disable_interrupts();
        }
        let result = f();
        if was_enabled {
            self.enable_interrupts();
        }
        result
    }
}
