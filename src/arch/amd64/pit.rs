// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! 8254 Programmable Interval Timer

use x86_64::instructions::port::Port;

/// Input clock of the PIT in Hz
pub const PIT_FREQUENCY: u32 = 1_193_182;

const CHANNEL0: u16 = 0x40;
const COMMAND: u16 = 0x43;

/// Channel 0, lobyte/hibyte access, mode 3 (square wave), binary
const MODE_SQUARE_WAVE: u8 = 0x36;

/// Reload value producing `hz` interrupts per second
pub const fn divisor(hz: u32) -> u16 {
    let div = PIT_FREQUENCY / hz;
    if div > u16::MAX as u32 {
        u16::MAX
    } else if div == 0 {
        1
    } else {
        div as u16
    }
}

/// Program channel 0 to fire IRQ0 `hz` times per second
///
/// # Safety
///
/// Performs port I/O; call once during boot with interrupts disabled.
pub unsafe fn init(hz: u32) {
    let div = divisor(hz);
    let mut command = Port::<u8>::new(COMMAND);
    let mut channel0 = Port::<u8>::new(CHANNEL0);

    command.write(MODE_SQUARE_WAVE);
    channel0.write((div & 0xFF) as u8);
    channel0.write((div >> 8) as u8);

    log::debug!("pit: {} Hz (divisor {})", hz, div);
}
