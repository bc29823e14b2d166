// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel configuration
//!
//! Compile-time tunables shared by the heap, the task table and the timer.

use log::LevelFilter;

/// Timer interrupt frequency (ticks per second)
pub const TIMER_HZ: u64 = 100;

/// Maximum number of task slots (slots are never reclaimed)
pub const MAX_TASKS: usize = 16;

/// Size of each task stack carved from the kernel heap
pub const TASK_STACK_SIZE: usize = 16 * 1024;

/// Payload sizes are rounded up to this many bytes
pub const HEAP_ALIGNMENT: usize = 8;

/// Smallest payload a split-off remainder block may carry
pub const HEAP_MIN_PAYLOAD: usize = 16;

/// Sentinel written into every block header
pub const HEAP_MAGIC: u32 = 0xDEAD_BEEF;

/// Page size used by `valloc`
pub const PAGE_SIZE: usize = 4096;

/// Poll interval of `Kernel::wait_for`
pub const WAIT_POLL_MS: u64 = 10;

/// Maximum level forwarded to the serial logger
pub const LOG_LEVEL: LevelFilter = LevelFilter::Debug;
