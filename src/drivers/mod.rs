// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Device Drivers
//!
//! Only what the kernel core needs to report on itself: a serial port.

/// UART (serial) drivers
pub mod uart;

pub use uart::{Uart16550, COM1_PORT};
