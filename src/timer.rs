// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Tick source and timed sleep
//!
//! The timer interrupt calls [`Kernel::on_tick`] [`TIMER_HZ`] times per
//! second. Each tick bumps the counter, wakes sleepers whose deadline has
//! passed and preempts the running task.

use core::sync::atomic::Ordering;

use crate::config::TIMER_HZ;
use crate::kernel::Kernel;
use crate::traits::Arch;

/// Milliseconds per tick at [`TIMER_HZ`]
pub const TICK_MS: u64 = 1000 / TIMER_HZ;

/// Convert a duration to ticks, rounding up, never less than one tick
pub const fn ms_to_ticks(ms: u64) -> u64 {
    let ticks = ms.saturating_mul(TIMER_HZ).div_ceil(1000);
    if ticks == 0 {
        1
    } else {
        ticks
    }
}

impl<A: Arch> Kernel<A> {
    /// Timer interrupt body
    ///
    /// Call after acknowledging the interrupt controller: when another task
    /// is picked this does not return until the current one is rescheduled.
    pub fn on_tick(&self) {
        let now = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        self.arch().without_interrupts(|| {
            {
                let mut sched = self.sched.lock();
                if !sched.is_initialized() {
                    return;
                }
                let woken = sched.wake_sleepers(now);
                if woken > 0 {
                    log::trace!("timer: tick {} woke {} task(s)", now, woken);
                }
            }
            // The halt loop selects again on its own once this returns
            if self.idling.load(Ordering::SeqCst) {
                return;
            }
            self.reschedule();
        });
    }

    /// Ticks since the timer was started
    pub fn get_ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Block the calling task for at least `ms` milliseconds
    ///
    /// `sleep(0)` is a plain yield.
    pub fn sleep(&self, ms: u64) {
        if ms == 0 {
            self.task_yield();
            return;
        }
        self.arch().without_interrupts(|| {
            let deadline = self.get_ticks().saturating_add(ms_to_ticks(ms));
            if self.sched.lock().block_current(deadline) {
                self.reschedule();
            }
        });
    }
}
