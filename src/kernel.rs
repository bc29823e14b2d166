// Copyright 2025 The Cinder Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel context
//!
//! [`Kernel`] owns the heap and the task table and is the only way to reach
//! either. It is meant to live in a `static`:
//!
//! ```ignore
//! #[global_allocator]
//! static KERNEL: Kernel<Amd64> = Kernel::new(Amd64, task_return);
//! ```
//!
//! # Locking
//!
//! There is a single core and no other synchronization primitive than
//! interrupt masking. Every method that takes a lock does so inside
//! [`Arch::without_interrupts`], so the timer can never observe a lock held
//! by the code it interrupted. Locks are always released before a context
//! switch; the switch itself runs with interrupts masked.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use spin::Mutex;

use crate::config::{HEAP_ALIGNMENT, TASK_STACK_SIZE, WAIT_POLL_MS};
use crate::mm::{Heap, HeapError, HeapStats};
use crate::sched::{Pid, Scheduler, TaskError, TaskFlags, TaskState};
use crate::traits::{Arch, TaskEntry, TaskReturn};

/// Root kernel context: heap, task table and tick counter
pub struct Kernel<A: Arch> {
    arch: A,
    heap: Mutex<Heap>,
    pub(crate) sched: Mutex<Scheduler>,
    /// Timer ticks since the timer was started
    pub(crate) ticks: AtomicU64,
    /// Set while the scheduler is parked waiting for an interrupt
    pub(crate) idling: AtomicBool,
    /// Where a task lands when its entry function returns
    on_return: TaskReturn,
}

impl<A: Arch> Kernel<A> {
    /// Create a kernel context with an empty heap and task table
    pub const fn new(arch: A, on_return: TaskReturn) -> Self {
        Self {
            arch,
            heap: Mutex::new(Heap::new()),
            sched: Mutex::new(Scheduler::new()),
            ticks: AtomicU64::new(0),
            idling: AtomicBool::new(false),
            on_return,
        }
    }

    pub fn arch(&self) -> &A {
        &self.arch
    }

    // ------------------------------------------------------------------
    // Allocator
    // ------------------------------------------------------------------

    /// Hand `[start, start + len)` to the heap
    ///
    /// # Safety
    ///
    /// See [`Heap::init`].
    pub unsafe fn init_heap(&self, start: usize, len: usize) -> Result<(), HeapError> {
        self.with_heap(|heap| heap.init(start, len))
    }

    /// Run `f` on the heap with interrupts masked
    pub fn with_heap<R>(&self, f: impl FnOnce(&mut Heap) -> R) -> R {
        self.arch.without_interrupts(|| f(&mut self.heap.lock()))
    }

    pub fn kmalloc(&self, size: usize) -> Result<NonNull<u8>, HeapError> {
        self.with_heap(|heap| heap.alloc(size))
    }

    pub fn kcalloc(&self, n: usize, size: usize) -> Result<NonNull<u8>, HeapError> {
        self.with_heap(|heap| heap.calloc(n, size))
    }

    /// # Safety
    ///
    /// See [`Heap::realloc`].
    pub unsafe fn krealloc(&self, ptr: *mut u8, size: usize) -> Result<Option<NonNull<u8>>, HeapError> {
        self.with_heap(|heap| heap.realloc(ptr, size))
    }

    /// # Safety
    ///
    /// See [`Heap::free`].
    pub unsafe fn kfree(&self, ptr: *mut u8) -> Result<(), HeapError> {
        self.with_heap(|heap| heap.free(ptr))
    }

    pub fn aligned_alloc(&self, size: usize, align: usize) -> Result<NonNull<u8>, HeapError> {
        self.with_heap(|heap| heap.aligned_alloc(size, align))
    }

    /// # Safety
    ///
    /// See [`Heap::aligned_free`].
    pub unsafe fn aligned_free(&self, ptr: *mut u8) -> Result<(), HeapError> {
        self.with_heap(|heap| heap.aligned_free(ptr))
    }

    pub fn valloc(&self, size: usize) -> Result<NonNull<u8>, HeapError> {
        self.with_heap(|heap| heap.valloc(size))
    }

    /// # Safety
    ///
    /// See [`Heap::vfree`].
    pub unsafe fn vfree(&self, ptr: *mut u8) -> Result<(), HeapError> {
        self.with_heap(|heap| heap.vfree(ptr))
    }

    pub fn heap_stats(&self) -> HeapStats {
        self.with_heap(|heap| heap.stats())
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    /// Turn the running code into task 1 and create the idle task
    ///
    /// Must run after [`init_heap`](Self::init_heap) and before the timer
    /// is started. Returns the pid of the boot task. On failure the table
    /// is left empty and the call can be retried.
    pub fn task_table_init(&self) -> Result<Pid, TaskError> {
        self.arch.without_interrupts(|| {
            let mut sched = self.sched.lock();
            if !sched.is_empty() {
                return Err(TaskError::AlreadyInitialized);
            }

            // The idle stack comes first so a heap failure leaves the table
            // untouched.
            let (stack, sp) = self.new_stack(self.arch.idle_entry(), 0)?;
            let installed = sched.adopt_boot_task().and_then(|boot| {
                let idle = sched.add_task(Some(stack), sp, TaskFlags::IDLE)?;
                Ok((boot, idle))
            });
            match installed {
                Ok((boot, idle)) => {
                    log::info!("sched: boot task {} idle task {}", boot, idle);
                    Ok(boot)
                }
                Err(err) => {
                    self.release_stack(stack);
                    Err(err)
                }
            }
        })
    }

    /// Create a ready task running `entry(arg)` on a fresh heap stack
    pub fn task_create(&self, entry: TaskEntry, arg: usize) -> Result<Pid, TaskError> {
        self.arch.without_interrupts(|| {
            let mut sched = self.sched.lock();
            if !sched.is_initialized() {
                return Err(TaskError::NotInitialized);
            }
            if sched.is_full() {
                log::warn!("sched: task table full");
                return Err(TaskError::TableFull);
            }

            let (stack, sp) = self.new_stack(entry, arg)?;
            match sched.add_task(Some(stack), sp, TaskFlags::empty()) {
                Ok(pid) => {
                    log::debug!("sched: created task {} stack {:p} sp {:#x}", pid, stack, sp);
                    Ok(pid)
                }
                Err(err) => {
                    self.release_stack(stack);
                    Err(err)
                }
            }
        })
    }

    /// Allocate a task stack and lay out the frame that starts `entry(arg)`
    fn new_stack(&self, entry: TaskEntry, arg: usize) -> Result<(NonNull<u8>, usize), TaskError> {
        let stack = self.heap.lock().alloc(TASK_STACK_SIZE).map_err(|err| {
            log::warn!("sched: task stack allocation failed: {}", err);
            TaskError::StackAllocation(err)
        })?;
        // SAFETY: the stack block was just allocated and belongs to the new
        // task alone.
        let sp = unsafe {
            self.arch
                .prepare_stack(stack.as_ptr(), TASK_STACK_SIZE, entry, arg, self.on_return)
        };
        Ok((stack, sp))
    }

    /// Hand back a stack that was never published to the task table
    fn release_stack(&self, stack: NonNull<u8>) {
        // SAFETY: the stack came from `new_stack` and no task runs on it.
        if let Err(err) = unsafe { self.heap.lock().free(stack.as_ptr()) } {
            log::error!("sched: failed to release stack {:p}: {}", stack, err);
        }
    }

    /// Give up the CPU to the next ready task
    pub fn task_yield(&self) {
        self.arch.without_interrupts(|| self.reschedule());
    }

    /// Terminate the calling task
    ///
    /// Its stack goes back to the heap right away. The block is not touched
    /// again before the switch because interrupts stay masked and the heap
    /// only rewrites block headers.
    pub fn task_exit(&self) -> ! {
        self.arch.disable_interrupts();
        let (pid, stack) = {
            let mut sched = self.sched.lock();
            let pid = sched.current_pid();
            (pid, sched.terminate_current())
        };
        if let Some(stack) = stack {
            // SAFETY: the stack was allocated by `new_stack` and its owner is
            // now terminated.
            if let Err(err) = unsafe { self.heap.lock().free(stack.as_ptr()) } {
                log::error!("sched: failed to release stack of task {:?}: {}", pid, err);
            }
        }
        log::debug!("sched: task {:?} exited", pid);

        self.reschedule();
        self.arch.halt()
    }

    /// State of the task with `pid`, if it exists
    pub fn task_state(&self, pid: Pid) -> Option<TaskState> {
        self.arch.without_interrupts(|| self.sched.lock().state_of(pid))
    }

    pub fn current_pid(&self) -> Option<Pid> {
        self.arch.without_interrupts(|| self.sched.lock().current_pid())
    }

    /// Run `f` on the task table with interrupts masked
    pub fn with_tasks<R>(&self, f: impl FnOnce(&Scheduler) -> R) -> R {
        self.arch.without_interrupts(|| f(&self.sched.lock()))
    }

    /// Block until task `pid` has exited
    ///
    /// Polls every [`WAIT_POLL_MS`]. Returns at once for unknown pids and
    /// for the caller's own pid.
    pub fn wait_for(&self, pid: Pid) {
        if self.current_pid() == Some(pid) {
            log::warn!("sched: task {} cannot wait for itself", pid);
            return;
        }
        while self.task_state(pid).map_or(false, |state| state.is_alive()) {
            self.sleep(WAIT_POLL_MS);
        }
    }

    /// Log every task
    pub fn dump_tasks(&self) {
        self.with_tasks(|sched| {
            for task in sched.tasks() {
                log::debug!(
                    "task {:>3} {:?} {:?} scheduled {}",
                    task.pid(),
                    task.state(),
                    task.flags(),
                    task.schedule_count()
                );
            }
        });
    }

    /// Pick the next task and switch to it
    ///
    /// Must be called with interrupts masked. Returns once the calling task
    /// is selected again. When nothing is runnable it parks the CPU until an
    /// interrupt arrives and selects again.
    pub(crate) fn reschedule(&self) {
        loop {
            let frame = {
                let mut sched = self.sched.lock();
                if !sched.is_initialized() {
                    return;
                }
                match sched.select_next() {
                    Some(slot) => sched.switch_to(slot),
                    None => {
                        drop(sched);
                        self.idling.store(true, Ordering::SeqCst);
                        self.arch.wait_for_interrupt();
                        self.idling.store(false, Ordering::SeqCst);
                        continue;
                    }
                }
            };
            if let Some(frame) = frame {
                // SAFETY: interrupts are masked, the lock is released and
                // `save` points into the task table which outlives the switch.
                unsafe { self.arch.switch(frame.save, frame.next) };
            }
            return;
        }
    }
}

unsafe impl<A: Arch> GlobalAlloc for Kernel<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let result = if layout.align() <= HEAP_ALIGNMENT {
            self.kmalloc(layout.size())
        } else {
            self.aligned_alloc(layout.size(), layout.align())
        };
        result.map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let _ = if layout.align() <= HEAP_ALIGNMENT {
            self.kfree(ptr)
        } else {
            self.aligned_free(ptr)
        };
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > HEAP_ALIGNMENT {
            let fresh = self.alloc(Layout::from_size_align_unchecked(new_size, layout.align()));
            if !fresh.is_null() {
                ptr::copy_nonoverlapping(ptr, fresh, layout.size().min(new_size));
                self.dealloc(ptr, layout);
            }
            return fresh;
        }
        match self.krealloc(ptr, new_size) {
            Ok(Some(fresh)) => fresh.as_ptr(),
            _ => ptr::null_mut(),
        }
    }
}
