// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! # Cinder - heap and scheduler core of a small x86 kernel
//!
//! Cinder is the part of a single-core kernel that everything else leans
//! on:
//!
//! - **Kernel heap**: first-fit allocator over one boot-provided region,
//!   with in-band headers, an address-sorted free list and eager coalescing
//! - **Tasks**: kernel threads on heap-allocated stacks, scheduled
//!   round-robin with an idle task as the lowest-priority fallback
//! - **Timer**: a 100 Hz tick that preempts the running task and wakes
//!   sleepers
//!
//! ## Architecture
//!
//! ```text
//! src/
//! ├── arch/              # Architecture-specific code
//! │   └── amd64/         # Context switch, PIT, PIC, IDT
//! ├── drivers/           # 16550 serial port
//! ├── mm/                # Kernel heap
//! ├── sched/             # Task table and scheduler
//! ├── kernel.rs          # Kernel context (heap + tasks + GlobalAlloc)
//! ├── timer.rs           # Tick handler and sleep
//! └── lib.rs             # This file
//! ```
//!
//! The only synchronization primitive is interrupt masking. Everything
//! that touches privileged state goes through the [`Arch`] trait so the
//! core can be tested on the host.
//!
//! ## Using the kernel context
//!
//! ```ignore
//! use cinder::{arch::Amd64, Kernel};
//!
//! static KERNEL: Kernel<Amd64> = Kernel::new(Amd64, task_return);
//!
//! unsafe { KERNEL.init_heap(heap_start, heap_len)? };
//! KERNEL.task_table_init()?;
//! KERNEL.task_create(worker, 0)?;
//! ```

#![cfg_attr(not(test), no_std)]
#![cfg_attr(all(feature = "kernel", target_os = "none"), feature(abi_x86_interrupt))]

// Compile-time configuration
pub mod config;

// Core traits and types
pub mod traits;

// Architecture-specific modules
pub mod arch;

// Memory management
pub mod mm;

// Task table and scheduler
pub mod sched;

// Kernel context
pub mod kernel;

// Tick source
pub mod timer;

// Device drivers
#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub mod drivers;

// Serial logger
#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub mod logging;

// Host test support
#[cfg(test)]
pub mod testing;

pub use kernel::Kernel;
pub use mm::{Heap, HeapError, HeapStats};
pub use sched::{Pid, TaskError, TaskState};
pub use traits::{Arch, TaskEntry, TaskReturn};
