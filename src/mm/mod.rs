// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Memory management
//!
//! The kernel owns exactly one heap: a caller-validated byte range handed
//! over by the boot sequence. Everything else (task stacks, driver buffers,
//! `alloc` collections) is carved out of it.

pub mod heap;

pub use heap::{Heap, HeapError, HeapStats, HEADER_SIZE};

/// Round `value` up to a multiple of `align` (a power of two)
#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Round `value` down to a multiple of `align` (a power of two)
#[inline]
pub const fn align_down(value: usize, align: usize) -> usize {
    value & !(align - 1)
}

/// Checked variant of [`align_up`]
#[inline]
pub fn checked_align_up(value: usize, align: usize) -> Option<usize> {
    Some(value.checked_add(align - 1)? & !(align - 1))
}
