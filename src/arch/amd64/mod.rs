// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! x86_64 (amd64) architecture-specific code
//!
//! Context switching, the legacy 8259 PIC, the 8254 PIT and, for the
//! kernel image, the IDT entry for the timer. The frame layout is plain
//! memory writes and also builds for host tests.

pub mod frame;

#[cfg(target_os = "none")]
pub mod pic;
#[cfg(target_os = "none")]
pub mod pit;
#[cfg(target_os = "none")]
pub mod switch;

#[cfg(all(feature = "kernel", target_os = "none"))]
pub mod idt;

#[cfg(target_os = "none")]
mod cpu;

#[cfg(target_os = "none")]
pub use cpu::Amd64;
