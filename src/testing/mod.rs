// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Host-side test support
//!
//! Lets the heap and the scheduler run under the ordinary test harness:
//! the heap gets a plain host buffer and the scheduler a fake CPU that
//! records what it was asked to do.
//!
//! # Usage
//! ```ignore
//! use crate::testing::{MockArch, TestRegion};
//!
//! let region = TestRegion::new(64 * 1024);
//! let kernel = Kernel::new(MockArch::new(), task_return);
//! unsafe { kernel.init_heap(region.start(), region.len())? };
//! ```

pub mod harness;

pub use harness::{MockArch, TestRegion, XorShift};
