// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Mock CPU and heap regions

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use spin::Mutex;

use crate::mm::Heap;
use crate::traits::{Arch, TaskEntry, TaskReturn};

/// Number of halts after which a parked scheduler is considered stuck
const MAX_WAITS: usize = 10_000;

type WaitHook = Box<dyn Fn() + Send + Sync>;

/// Fake CPU for host tests
///
/// Context switches are recorded rather than performed, so after
/// `Arch::switch` the caller simply carries on as whichever task the
/// scheduler now considers current.
pub struct MockArch {
    interrupts: AtomicBool,
    switches: AtomicUsize,
    waits: AtomicUsize,
    halts: AtomicUsize,
    last_switch: Mutex<Option<usize>>,
    on_wait: Mutex<Option<WaitHook>>,
}

impl MockArch {
    pub const fn new() -> Self {
        Self {
            interrupts: AtomicBool::new(false),
            switches: AtomicUsize::new(0),
            waits: AtomicUsize::new(0),
            halts: AtomicUsize::new(0),
            last_switch: Mutex::new(None),
            on_wait: Mutex::new(None),
        }
    }

    /// Run `hook` each time the scheduler waits for an interrupt
    pub fn on_wait(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_wait.lock() = Some(Box::new(hook));
    }

    /// Number of context switches performed
    pub fn switches(&self) -> usize {
        self.switches.load(Ordering::SeqCst)
    }

    /// Number of interrupt waits
    pub fn waits(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }

    /// Number of `halt` calls
    pub fn halts(&self) -> usize {
        self.halts.load(Ordering::SeqCst)
    }

    /// Stack pointer handed to the most recent switch
    pub fn last_switch(&self) -> Option<usize> {
        *self.last_switch.lock()
    }
}

impl Default for MockArch {
    fn default() -> Self {
        Self::new()
    }
}

extern "C" fn mock_idle(_: usize) {}

impl Arch for MockArch {
    fn interrupts_enabled(&self) -> bool {
        self.interrupts.load(Ordering::SeqCst)
    }

    fn disable_interrupts(&self) {
        self.interrupts.store(false, Ordering::SeqCst);
    }

    fn enable_interrupts(&self) {
        self.interrupts.store(true, Ordering::SeqCst);
    }

    fn wait_for_interrupt(&self) {
        let waits = self.waits.fetch_add(1, Ordering::SeqCst) + 1;
        assert!(waits < MAX_WAITS, "scheduler never found a runnable task");

        self.interrupts.store(true, Ordering::SeqCst);
        if let Some(hook) = self.on_wait.lock().as_ref() {
            hook();
        }
        self.interrupts.store(false, Ordering::SeqCst);
    }

    fn halt(&self) -> ! {
        self.halts.fetch_add(1, Ordering::SeqCst);
        panic!("halted");
    }

    fn idle_entry(&self) -> TaskEntry {
        mock_idle
    }

    unsafe fn prepare_stack(
        &self,
        stack: *mut u8,
        size: usize,
        _entry: TaskEntry,
        _arg: usize,
        _on_return: TaskReturn,
    ) -> usize {
        (stack as usize + size) & !15
    }

    unsafe fn switch(&self, _save: *mut usize, next: usize) {
        assert!(!self.interrupts_enabled(), "switch with interrupts enabled");
        self.switches.fetch_add(1, Ordering::SeqCst);
        *self.last_switch.lock() = Some(next);
    }
}

/// Zeroed, 8-byte aligned host buffer for a [`Heap`]
pub struct TestRegion {
    buf: Vec<u64>,
    start: usize,
}

impl TestRegion {
    pub fn new(len: usize) -> Self {
        let mut buf = vec![0u64; len.div_ceil(8)];
        let start = buf.as_mut_ptr() as usize;
        Self { buf, start }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.buf.len() * 8
    }

    /// A heap initialized over the whole region
    pub fn heap(&self) -> Heap {
        let mut heap = Heap::new();
        // SAFETY: the buffer outlives every test that uses the heap.
        unsafe { heap.init(self.start(), self.len()).unwrap() };
        heap
    }
}

/// Deterministic generator for randomized workloads
pub struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
}
