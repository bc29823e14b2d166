// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! 16550 UART
//!
//! Transmit-only polled driver backing the kernel log.
//!
//! # Usage
//!
//! ```ignore
//! use core::fmt::Write;
//! use cinder::drivers::uart::{Uart16550, COM1_PORT};
//!
//! let mut uart = unsafe { Uart16550::new(COM1_PORT) };
//! uart.init();
//! writeln!(uart, "tick {}", ticks)?;
//! ```

use core::fmt;

use x86_64::instructions::port::Port;

/// Base I/O port for COM1
pub const COM1_PORT: u16 = 0x3F8;

/// Register offsets
mod reg {
    /// Transmit hold (write), divisor low with DLAB set
    pub const THR: u16 = 0;
    /// Interrupt enable, divisor high with DLAB set
    pub const IER: u16 = 1;
    pub const FCR: u16 = 2;
    pub const LCR: u16 = 3;
    pub const MCR: u16 = 4;
    pub const LSR: u16 = 5;
}

/// Line control: 8 data bits, no parity, 1 stop bit
const LCR_8N1: u8 = 0x03;
/// Line control: divisor latch access
const LCR_DLAB: u8 = 0x80;
/// FIFO control: enable and clear both FIFOs
const FCR_ENABLE_CLEAR: u8 = 0x07;
/// Modem control: DTR + RTS
const MCR_DTR_RTS: u8 = 0x03;
/// Line status: transmitter hold register empty
const LSR_THRE: u8 = 0x20;

/// Divisor for 115200 baud off the 1.8432 MHz reference clock
const BAUD_DIVISOR: u16 = 1;

/// 16550 UART driver
#[derive(Debug)]
pub struct Uart16550 {
    base: u16,
}

impl Uart16550 {
    /// # Safety
    ///
    /// `base` must be the I/O base of a 16550-compatible UART that nothing
    /// else drives.
    pub const unsafe fn new(base: u16) -> Self {
        Self { base }
    }

    fn port(&self, offset: u16) -> Port<u8> {
        Port::new(self.base + offset)
    }

    /// 115200 baud, 8N1, FIFOs on, UART interrupts off
    pub fn init(&mut self) {
        // SAFETY: `new` guarantees exclusive access to these ports.
        unsafe {
            self.port(reg::IER).write(0);
            self.port(reg::LCR).write(LCR_DLAB);
            self.port(reg::THR).write((BAUD_DIVISOR & 0xFF) as u8);
            self.port(reg::IER).write((BAUD_DIVISOR >> 8) as u8);
            self.port(reg::LCR).write(LCR_8N1);
            self.port(reg::FCR).write(FCR_ENABLE_CLEAR);
            self.port(reg::MCR).write(MCR_DTR_RTS);
        }
    }

    /// Write one byte, spinning until the transmitter is ready
    pub fn write_byte(&mut self, byte: u8) {
        // SAFETY: `new` guarantees exclusive access to these ports.
        unsafe {
            let mut lsr = self.port(reg::LSR);
            while lsr.read() & LSR_THRE == 0 {
                core::hint::spin_loop();
            }
            self.port(reg::THR).write(byte);
        }
    }
}

impl fmt::Write for Uart16550 {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
        Ok(())
    }
}
