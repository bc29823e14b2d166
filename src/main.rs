// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Cinder kernel image
//!
//! Entered from the boot stub in long mode, with interrupts disabled and
//! the heap region already identity-mapped.

#![no_std]
#![no_main]
#![feature(abi_x86_interrupt)]

extern crate alloc;

use alloc::vec::Vec;
use core::panic::PanicInfo;

use x86_64::structures::idt::InterruptStackFrame;

use cinder::arch::amd64::{idt, pic, pit};
use cinder::arch::Amd64;
use cinder::config::TIMER_HZ;
use cinder::{logging, Arch, Kernel};

#[global_allocator]
static KERNEL: Kernel<Amd64> = Kernel::new(Amd64, task_return);

/// Landing pad for tasks whose entry function returns
extern "C" fn task_return() -> ! {
    KERNEL.task_exit()
}

extern "x86-interrupt" fn timer_interrupt(_frame: InterruptStackFrame) {
    // SAFETY: this is the IRQ0 handler.
    unsafe { pic::end_of_interrupt(pic::TIMER_IRQ) };
    KERNEL.on_tick();
}

fn ticks() -> u64 {
    KERNEL.get_ticks()
}

/// Prints a heartbeat every half second, `rounds` times
extern "C" fn heartbeat(rounds: usize) {
    for round in 1..=rounds {
        log::info!("heartbeat {}/{} at tick {}", round, rounds, KERNEL.get_ticks());
        KERNEL.sleep(500);
    }
}

/// Exercises the global allocator and yields between batches
extern "C" fn worker(batches: usize) {
    let mut total: u64 = 0;
    for batch in 0..batches {
        let squares: Vec<u64> = (0..256u64).map(|n| n * n + batch as u64).collect();
        total = total.wrapping_add(squares.iter().sum::<u64>());
        KERNEL.task_yield();
    }
    log::info!("worker: {} batches, checksum {:#x}", batches, total);
}

/// Kernel entry point
///
/// `heap_start .. heap_start + heap_len` becomes the kernel heap.
#[no_mangle]
pub extern "C" fn kernel_main(heap_start: usize, heap_len: usize) -> ! {
    logging::init(ticks);
    log::info!("cinder: booting");

    // SAFETY: the boot stub hands over this region for the kernel's sole use.
    if let Err(err) = unsafe { KERNEL.init_heap(heap_start, heap_len) } {
        log::error!("cinder: heap init failed: {}", err);
        Amd64.halt();
    }
    if let Err(err) = KERNEL.task_table_init() {
        log::error!("cinder: task table init failed: {}", err);
        Amd64.halt();
    }

    idt::init(timer_interrupt);
    // SAFETY: interrupts are still disabled and nothing else drives the
    // PIC or the PIT.
    unsafe {
        pic::init();
        pit::init(TIMER_HZ as u32);
    }

    let beat = KERNEL.task_create(heartbeat, 6);
    let work = KERNEL.task_create(worker, 64);
    Amd64.enable_interrupts();
    log::info!("cinder: timer running at {} Hz", TIMER_HZ);

    for pid in [beat, work] {
        match pid {
            Ok(pid) => KERNEL.wait_for(pid),
            Err(err) => log::warn!("cinder: demo task not started: {}", err),
        }
    }

    KERNEL.dump_tasks();
    KERNEL.with_heap(|heap| {
        if let Err(err) = heap.check() {
            log::error!("cinder: heap check failed: {}", err);
        }
        heap.dump();
    });

    loop {
        KERNEL.sleep(10_000);
        let stats = KERNEL.heap_stats();
        log::debug!("cinder: heap used {} free {}", stats.used, stats.free);
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    // SAFETY: nothing runs after this.
    unsafe { logging::emergency_write(format_args!("\nkernel panic: {}\n", info)) };
    Amd64.halt()
}
