// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Task context switch
//!
//! The saved frame layout lives in [`frame`](super::frame). Caller-saved
//! registers are already spilled by the compiler around the call to
//! [`context_switch`]. RFLAGS is not saved: every switch happens with
//! interrupts masked and each task restores its own interrupt state once
//! it resumes.

use core::arch::global_asm;

global_asm!(
    ".section .text",
    ".global cinder_context_switch",
    "cinder_context_switch:",
    "    push rbp",
    "    push rbx",
    "    push r12",
    "    push r13",
    "    push r14",
    "    push r15",
    "    mov [rdi], rsp",
    "    mov rsp, rsi",
    "    pop r15",
    "    pop r14",
    "    pop r13",
    "    pop r12",
    "    pop rbx",
    "    pop rbp",
    "    ret",
    "",
    // First code a new task runs: r12 = entry, r13 = arg, r14 = on_return
    ".global cinder_task_trampoline",
    "cinder_task_trampoline:",
    "    mov rdi, r13",
    "    sti",
    "    call r12",
    "    call r14",
    "    ud2",
);

extern "C" {
    fn cinder_context_switch(save: *mut usize, next: usize);
    fn cinder_task_trampoline();
}

/// Save the current context into `*save` and resume the one at `next`
///
/// # Safety
///
/// Interrupts must be disabled, `save` must stay valid until the saved
/// context is resumed and `next` must be a stack pointer produced by
/// [`initial_frame`](super::frame::initial_frame) or saved by an earlier
/// switch.
#[inline]
pub unsafe fn context_switch(save: *mut usize, next: usize) {
    cinder_context_switch(save, next);
}

/// Address of the first code a new task runs
pub fn trampoline() -> usize {
    cinder_task_trampoline as usize
}
