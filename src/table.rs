//! The global task table: `NPROC` fixed slots behind one lock (`TL`).
//!
//! Grounded on the teacher's no-alloc `ProcessArray` path in
//! `process/table.rs`: a fixed array plus a linear scan, not a `BTreeMap`.
//! Unlike the teacher this crate has no `alloc` path at all — the array is
//! the only representation, matching the original C `struct proc ptable[]`.

use crate::config::{NPROC, TOTALTICKET_SHARE_CAP};
use crate::platform::Platform;
use crate::task::{Task, TaskState};
use crate::error::{KernelError, KernelResult};
use spin::Mutex;

/// The MLFQ's own stride bookkeeping, treated as a pseudo-task competing
/// for dispatch against every stride task (spec §4.2).
#[derive(Debug, Clone, Copy)]
pub struct MlfqPseudoTask {
    pub share: i32,
    pub stride: i32,
    pub pass: i64,
}

impl MlfqPseudoTask {
    pub const fn new() -> Self {
        Self {
            share: TOTALTICKET_SHARE_CAP,
            stride: TOTALTICKET_SHARE_CAP / TOTALTICKET_SHARE_CAP,
            pass: 0,
        }
    }
}

pub struct TaskTableInner {
    pub tasks: [Task; NPROC],
    pub next_pid: u64,
    pub mlfq: MlfqPseudoTask,
    /// Index of the init task, reparenting target for orphans.
    pub init: Option<usize>,
    /// Per-CPU index of the currently running task, if any (I4).
    pub current: [Option<usize>; crate::config::NCPU],
}

impl TaskTableInner {
    const fn new() -> Self {
        Self {
            tasks: [Task::UNUSED; NPROC],
            next_pid: 1,
            mlfq: MlfqPseudoTask::new(),
            init: None,
            current: [None; crate::config::NCPU],
        }
    }

    pub fn find_unused(&self) -> Option<usize> {
        self.tasks.iter().position(|t| t.state == TaskState::Unused)
    }
}

/// The task table lock, `TL`: one global lock guarding every task slot
/// and the MLFQ pseudo-task (spec §5).
pub struct TaskTable {
    pub inner: Mutex<TaskTableInner>,
}

impl TaskTable {
    pub const fn new() -> Self {
        Self { inner: Mutex::new(TaskTableInner::new()) }
    }
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Find a free slot, mark it `Embryo`, and allocate its kernel stack.
/// Mirrors `allocproc`: the slot is claimed under `TL`, but the kernel
/// stack allocation happens with `TL` released.
pub fn alloc_task(table: &TaskTable, platform: &dyn Platform) -> KernelResult<usize> {
    let idx = {
        let mut inner = table.inner.lock();
        let idx = inner.find_unused().ok_or(KernelError::TableFull)?;
        let pid = inner.next_pid;
        inner.next_pid += 1;
        inner.tasks[idx] = Task::UNUSED;
        inner.tasks[idx].state = TaskState::Embryo;
        inner.tasks[idx].pid = pid;
        idx
    };

    match platform.kstack_alloc() {
        Ok(kstack) => {
            let mut inner = table.inner.lock();
            inner.tasks[idx].kstack = Some(kstack);
            log::debug!("alloc_task: pid={} slot={}", inner.tasks[idx].pid, idx);
            Ok(idx)
        }
        Err(e) => {
            let mut inner = table.inner.lock();
            inner.tasks[idx] = Task::UNUSED;
            Err(e)
        }
    }
}

/// Release a partially-initialized `Embryo` slot back to `Unused`, e.g.
/// when a later step of `fork`/`thread_create` fails.
pub fn free_embryo(table: &TaskTable, platform: &dyn Platform, idx: usize) {
    let kstack = {
        let mut inner = table.inner.lock();
        let kstack = inner.tasks[idx].kstack;
        inner.tasks[idx] = Task::UNUSED;
        kstack
    };
    if let Some(kstack) = kstack {
        platform.kstack_free(kstack);
    }
}

/// Wake every task sleeping on `channel`. Caller must already hold `TL`.
pub fn wakeup_locked(inner: &mut TaskTableInner, channel: crate::task::ChanId) {
    for t in inner.tasks.iter_mut() {
        if t.state == TaskState::Sleeping && t.wait_channel == Some(channel) {
            t.state = TaskState::Runnable;
            t.wait_channel = None;
        }
    }
}

/// A `^P`-style table dump: out-of-scope console aside, this logs one
/// line per live task instead of writing to a real tty.
pub fn debug_dump(table: &TaskTable) {
    let inner = table.inner.lock();
    for (idx, t) in inner.tasks.iter().enumerate() {
        if t.state != TaskState::Unused {
            log::info!(
                "slot={} pid={} tid={} state={:?} name={}",
                idx,
                t.pid,
                t.tid,
                t.state,
                t.name_str()
            );
        }
    }
}
