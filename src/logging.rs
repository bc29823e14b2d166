// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel logging
//!
//! Backs the `log` facade with COM1. Each record is written as
//! `[ticks] LEVEL target: message`. The port lock is only taken with
//! interrupts masked, so a timer tick can never find it held.

use core::fmt::{self, Write};

use log::{Level, Log, Metadata, Record};
use spin::{Mutex, Once};
use x86_64::instructions::interrupts;

use crate::config::LOG_LEVEL;
use crate::drivers::uart::{Uart16550, COM1_PORT};

// SAFETY: COM1 is driven by nothing but this logger.
static SERIAL: Mutex<Uart16550> = Mutex::new(unsafe { Uart16550::new(COM1_PORT) });

static CLOCK: Once<fn() -> u64> = Once::new();

struct KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= LOG_LEVEL
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let ticks = CLOCK.get().map_or(0, |clock| clock());
        let level = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => " WARN",
            Level::Info => " INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        interrupts::without_interrupts(|| {
            let _ = writeln!(
                SERIAL.lock(),
                "[{:>8}] {} {}: {}",
                ticks,
                level,
                record.target(),
                record.args()
            );
        });
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

/// Bring up COM1 and install the logger
///
/// `clock` supplies the tick count printed in front of each record.
pub fn init(clock: fn() -> u64) {
    interrupts::without_interrupts(|| SERIAL.lock().init());
    CLOCK.call_once(|| clock);
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(LOG_LEVEL))
        .ok();
}

/// Write straight to COM1, ignoring whoever holds the port
///
/// # Safety
///
/// Only for the panic path, when the holder will never run again.
pub unsafe fn emergency_write(args: fmt::Arguments) {
    interrupts::disable();
    SERIAL.force_unlock();
    let _ = SERIAL.lock().write_fmt(args);
}
