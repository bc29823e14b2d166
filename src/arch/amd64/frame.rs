// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Saved task frame
//!
//! A suspended task is fully described by its stack pointer. The stack
//! holds the System V callee-saved registers followed by a return address:
//!
//! ```text
//! sp + 0x00  r15
//! sp + 0x08  r14
//! sp + 0x10  r13
//! sp + 0x18  r12
//! sp + 0x20  rbx
//! sp + 0x28  rbp
//! sp + 0x30  return address
//! ```
//!
//! A fresh task gets a frame whose return address is the trampoline, with
//! r12 = entry, r13 = arg and r14 = the exit routine.

use core::mem::size_of;

use crate::mm::align_down;
use crate::traits::{TaskEntry, TaskReturn};

/// Words in a saved frame
pub const FRAME_WORDS: usize = 7;

/// Lay out a frame at the top of `stack` that enters `entry(arg)` through
/// `trampoline`, and return its stack pointer
///
/// The trampoline starts with a 16-byte aligned stack, as the ABI expects
/// at a call site.
///
/// # Safety
///
/// `stack .. stack + size` must be writable and at least 64 bytes long.
pub unsafe fn initial_frame(
    stack: *mut u8,
    size: usize,
    entry: TaskEntry,
    arg: usize,
    on_return: TaskReturn,
    trampoline: usize,
) -> usize {
    let top = align_down(stack as usize + size, 16);
    let frame = (top - FRAME_WORDS * size_of::<usize>()) as *mut usize;

    let words: [usize; FRAME_WORDS] = [
        0,                  // r15
        on_return as usize, // r14
        arg,                // r13
        entry as usize,     // r12
        0,                  // rbx
        0,                  // rbp
        trampoline,         // return address
    ];
    for (i, word) in words.iter().enumerate() {
        frame.add(i).write(*word);
    }
    frame as usize
}
