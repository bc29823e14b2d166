// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! x86-64 Interrupt Descriptor Table (IDT)

use spin::Once;
use x86_64::structures::idt::{HandlerFunc, InterruptDescriptorTable, InterruptStackFrame};

use super::pic::TIMER_VECTOR;

static IDT: Once<InterruptDescriptorTable> = Once::new();

extern "x86-interrupt" fn breakpoint(frame: InterruptStackFrame) {
    log::warn!("idt: breakpoint at {:#x}", frame.instruction_pointer.as_u64());
}

extern "x86-interrupt" fn double_fault(frame: InterruptStackFrame, _code: u64) -> ! {
    panic!("double fault at {:#x}", frame.instruction_pointer.as_u64());
}

/// Build and load the IDT with `timer` on the timer vector
///
/// The handler must acknowledge the PIC before calling into the scheduler.
pub fn init(timer: HandlerFunc) {
    let idt = IDT.call_once(|| {
        let mut idt = InterruptDescriptorTable::new();
        idt.breakpoint.set_handler_fn(breakpoint);
        idt.double_fault.set_handler_fn(double_fault);
        idt[TIMER_VECTOR as usize].set_handler_fn(timer);
        idt
    });
    idt.load();
    log::debug!("idt: loaded, timer on vector {}", TIMER_VECTOR);
}
