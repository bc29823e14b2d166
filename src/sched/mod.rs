// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Task table and scheduler
//!
//! Tasks are kernel threads sharing one address space. Scheduling is
//! round-robin over a fixed ring, driven both by voluntary yields and by
//! the timer tick.
//!
//! # Example
//! ```ignore
//! use cinder::sched::{Scheduler, TaskFlags};
//!
//! let mut scheduler = Scheduler::new();
//! scheduler.adopt_boot_task()?;
//! scheduler.add_task(Some(stack), sp, TaskFlags::empty())?;
//! if let Some(slot) = scheduler.select_next() {
//!     let frame = scheduler.switch_to(slot);
//! }
//! ```

pub mod scheduler;
pub mod state;
pub mod task;

pub use scheduler::{Scheduler, SwitchFrame};
pub use state::{Pid, TaskError, TaskFlags, TaskState};
pub use task::Task;
