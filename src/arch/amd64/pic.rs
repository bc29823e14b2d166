// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Legacy 8259 PIC pair
//!
//! Remapped so that IRQ 0..15 land on vectors 32..47, clear of the CPU
//! exception vectors.

use x86_64::instructions::port::Port;

const PIC1_COMMAND: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_COMMAND: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

/// First vector of the master PIC
pub const PIC1_OFFSET: u8 = 0x20;
/// First vector of the slave PIC
pub const PIC2_OFFSET: u8 = 0x28;

/// IRQ line of the PIT
pub const TIMER_IRQ: u8 = 0;
/// Vector the timer interrupt is delivered on
pub const TIMER_VECTOR: u8 = PIC1_OFFSET + TIMER_IRQ;

const ICW1_INIT: u8 = 0x11;
const ICW4_8086: u8 = 0x01;
const EOI: u8 = 0x20;

/// Remap both PICs and unmask only the timer
///
/// # Safety
///
/// Performs port I/O; call once during boot with interrupts disabled.
pub unsafe fn init() {
    let mut cmd1 = Port::<u8>::new(PIC1_COMMAND);
    let mut cmd2 = Port::<u8>::new(PIC2_COMMAND);
    let mut data1 = Port::<u8>::new(PIC1_DATA);
    let mut data2 = Port::<u8>::new(PIC2_DATA);

    cmd1.write(ICW1_INIT);
    cmd2.write(ICW1_INIT);
    data1.write(PIC1_OFFSET);
    data2.write(PIC2_OFFSET);
    // Slave on IRQ2 of the master
    data1.write(1 << 2);
    data2.write(2);
    data1.write(ICW4_8086);
    data2.write(ICW4_8086);

    data1.write(!(1 << TIMER_IRQ));
    data2.write(0xFF);
}

/// Acknowledge `irq`
///
/// # Safety
///
/// Performs port I/O; only call from the handler of `irq`.
pub unsafe fn end_of_interrupt(irq: u8) {
    if irq >= 8 {
        Port::<u8>::new(PIC2_COMMAND).write(EOI);
    }
    Port::<u8>::new(PIC1_COMMAND).write(EOI);
}
