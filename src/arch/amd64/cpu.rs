// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! [`Arch`] for the x86_64 CPU

use x86_64::instructions::{self, interrupts};

use super::{frame, switch};
use crate::traits::{Arch, TaskEntry, TaskReturn};

/// The x86_64 CPU
#[derive(Debug, Clone, Copy, Default)]
pub struct Amd64;

/// Body of the idle task: sleep until the next interrupt, forever
extern "C" fn idle_loop(_: usize) {
    loop {
        instructions::hlt();
    }
}

impl Arch for Amd64 {
    #[inline]
    fn interrupts_enabled(&self) -> bool {
        interrupts::are_enabled()
    }

    #[inline]
    fn disable_interrupts(&self) {
        interrupts::disable();
    }

    #[inline]
    fn enable_interrupts(&self) {
        interrupts::enable();
    }

    fn wait_for_interrupt(&self) {
        // `sti; hlt` so an interrupt cannot slip in between the two
        interrupts::enable_and_hlt();
        interrupts::disable();
    }

    fn halt(&self) -> ! {
        loop {
            interrupts::disable();
            instructions::hlt();
        }
    }

    fn idle_entry(&self) -> TaskEntry {
        idle_loop
    }

    unsafe fn prepare_stack(
        &self,
        stack: *mut u8,
        size: usize,
        entry: TaskEntry,
        arg: usize,
        on_return: TaskReturn,
    ) -> usize {
        frame::initial_frame(stack, size, entry, arg, on_return, switch::trampoline())
    }

    unsafe fn switch(&self, save: *mut usize, next: usize) {
        switch::context_switch(save, next);
    }
}
