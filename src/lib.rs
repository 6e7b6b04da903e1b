//! Hybrid stride/MLFQ process and thread scheduling core.
//!
//! A fixed-size task table guarded by one global lock, a stride scheduler
//! for tasks with an explicit CPU-share reservation, a three-level MLFQ
//! for everything else, and the fork/exit/wait/thread lifecycle that keeps
//! both sides' bookkeeping consistent as tasks come and go.
//!
//! Address-space manipulation, the inode cache, the open-file table, the
//! journaling log, and the raw context switch are modeled through the
//! [`platform::Platform`] trait rather than implemented here; see that
//! module for why.

#![no_std]
#![cfg_attr(not(test), allow(dead_code))]

#[cfg(not(target_os = "none"))]
extern crate std;

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod mlfq;
pub mod platform;
pub mod scheduler;
pub mod stride;
pub mod syscalls;
pub mod table;
pub mod task;
pub mod thread;

use error::{KernelError, KernelResult};
use platform::Platform;
use spin::Mutex;
use table::TaskTable;
use task::{ProcessRole, Role, TaskState};

/// A running kernel instance: the task table plus the injected platform.
/// Owning its own `TaskTable` (rather than reaching for a single process-
/// wide global, as the teacher's no-alloc `PROCESS_TABLE` does) keeps unit
/// tests independent of each other; a real boot path constructs exactly
/// one `Kernel` and never drops it.
pub struct Kernel<P: Platform> {
    pub table: TaskTable,
    /// `PL`: serializes `thread_create` within one process (spec §5).
    pub pl: Mutex<()>,
    pub platform: P,
}

impl<P: Platform> Kernel<P> {
    pub fn new(platform: P) -> Self {
        Self { table: TaskTable::new(), pl: Mutex::new(()), platform }
    }

    /// Allocate and boot the very first process-role task. May only be
    /// called once; a second call is a contract violation, not a
    /// recoverable error, since a kernel only ever has one init task.
    pub fn spawn_init(&self, name: &str) -> KernelResult<usize> {
        if self.table.inner.lock().init.is_some() {
            panic!("{}", KernelError::LockContractViolation("spawn_init called twice"));
        }
        let idx = table::alloc_task(&self.table, &self.platform)?;
        let space = self.platform.map_copy(platform::AddressSpaceId(0))?;
        let mut inner = self.table.inner.lock();
        inner.tasks[idx].address_space = Some(space);
        inner.tasks[idx].parent = Some(idx);
        inner.tasks[idx].set_name(name);
        inner.tasks[idx].state = TaskState::Runnable;
        inner.tasks[idx].role = Role::Process(ProcessRole::default());
        inner.init = Some(idx);
        Ok(idx)
    }

    pub fn fork(&self, caller: usize) -> KernelResult<u64> {
        lifecycle::fork(self, caller)
    }

    pub fn exit(&self, caller: usize) {
        lifecycle::exit(self, caller)
    }

    pub fn wait(&self, caller: usize) -> KernelResult<u64> {
        lifecycle::wait(self, caller)
    }

    pub fn kill(&self, pid: u64) -> KernelResult<()> {
        lifecycle::kill(self, pid)
    }

    pub fn yield_now(&self, caller: usize) {
        lifecycle::yield_now(self, caller)
    }

    pub fn sleep(&self, caller: usize, channel: task::ChanId) {
        lifecycle::sleep(self, caller, channel)
    }

    pub fn wakeup(&self, channel: task::ChanId) {
        lifecycle::wakeup(self, channel)
    }

    pub fn get_level(&self, caller: usize) -> u8 {
        self.table.inner.lock().tasks[caller].level
    }

    pub fn set_cpu_share(&self, caller: usize, share: i32) -> KernelResult<i32> {
        stride::set_cpu_share(&self.table, caller, share)
    }

    pub fn thread_create(&self, caller: usize, entry: usize, arg: u64) -> KernelResult<u64> {
        thread::thread_create(self, caller, entry, arg)
    }

    pub fn thread_exit(&self, caller: usize, retval: u64) {
        thread::thread_exit(self, caller, retval)
    }

    pub fn thread_join(&self, caller: usize, tid: u64) -> KernelResult<(u64, u64)> {
        thread::thread_join(self, caller, tid)
    }

    pub fn schedule_once(&self, cpu: usize) -> Option<usize> {
        scheduler::schedule_once(self, cpu)
    }

    pub fn debug_dump(&self) {
        table::debug_dump(&self.table)
    }
}
