//! Process lifecycle: fork, the three exit paths, wait, kill, yield,
//! sleep, wakeup.
//!
//! Grounded on `original_source/xv6-public/proc.c`'s `fork`,
//! `exitProcAndProc`, `exitProcAndLWP`, `exitLWPAndLWP`, `exit`, `wait`,
//! `yield`, `sleep`, `wakeup1`/`wakeup`, and `kill`.

use crate::config::{NPROC, PAGE_SIZE, TOTALTICKET_SHARE_CAP};
use crate::error::{KernelError, KernelResult};
use crate::platform::Platform;
use crate::table::{self, wakeup_locked};
use crate::task::{ChanId, ProcessRole, Role, TaskState};
use crate::Kernel;

fn take_files_and_cwd<P: Platform>(
    kernel: &Kernel<P>,
    idx: usize,
) -> ([Option<crate::platform::FileId>; crate::config::NOFILE], Option<crate::platform::InodeId>) {
    let mut inner = kernel.table.inner.lock();
    let files = core::mem::replace(&mut inner.tasks[idx].files, [None; crate::config::NOFILE]);
    let cwd = inner.tasks[idx].cwd.take();
    (files, cwd)
}

/// Release `idx`'s open files and current-directory reference. Matches
/// the original's `begin_op`/`iput`/`end_op` wrapping: only the inode put
/// needs the log transaction, file closes do not.
fn close_files_and_cwd<P: Platform>(kernel: &Kernel<P>, idx: usize) {
    let (files, cwd) = take_files_and_cwd(kernel, idx);
    for f in files.into_iter().flatten() {
        kernel.platform.file_close(f);
    }
    if let Some(c) = cwd {
        kernel.platform.log_begin();
        kernel.platform.inode_put(c);
        kernel.platform.log_end();
    }
}

/// Return a reaped stride task's share to the MLFQ pool.
fn return_share_locked(inner: &mut crate::table::TaskTableInner, share: i32) {
    inner.mlfq.share += share;
    inner.mlfq.stride = TOTALTICKET_SHARE_CAP / inner.mlfq.share;
}

/// `fork`: allocate a child slot, copy the caller's address space, and
/// duplicate its open files and current directory. Returns the child's
/// pid to the caller; the child's own trap frame is primed to observe a
/// return value of 0.
pub fn fork<P: Platform>(kernel: &Kernel<P>, caller: usize) -> KernelResult<u64> {
    let child = table::alloc_task(&kernel.table, &kernel.platform)?;

    let parent_space = kernel.table.inner.lock().tasks[caller].address_space;
    let Some(parent_space) = parent_space else {
        table::free_embryo(&kernel.table, &kernel.platform, child);
        return Err(KernelError::AddressSpaceFailure);
    };

    let child_space = match kernel.platform.map_copy(parent_space) {
        Ok(space) => space,
        Err(e) => {
            table::free_embryo(&kernel.table, &kernel.platform, child);
            return Err(e);
        }
    };

    let mut inner = kernel.table.inner.lock();
    let (size, files, cwd, name, mut trap_frame, parent_pid) = {
        let p = &inner.tasks[caller];
        (p.size, p.files, p.cwd, p.name, p.trap_frame, p.pid)
    };
    trap_frame.ret = 0;
    drop(inner);

    let dup_files = files.map(|f| f.map(|fid| kernel.platform.file_dup(fid)));
    let dup_cwd = cwd.map(|c| kernel.platform.inode_dup(c));

    inner = kernel.table.inner.lock();
    let c = &mut inner.tasks[child];
    c.address_space = Some(child_space);
    c.size = size;
    c.parent = Some(caller);
    c.trap_frame = trap_frame;
    c.files = dup_files;
    c.cwd = dup_cwd;
    c.name = name;
    c.role = Role::Process(ProcessRole::default());
    c.state = TaskState::Runnable;
    let child_pid = c.pid;
    log::debug!("fork: parent pid={parent_pid} child pid={child_pid}");
    Ok(child_pid)
}

/// `wait`: block until a process-role child (`tid == 0`) becomes a
/// zombie, then reap it: free its table slot, its kernel stack, its
/// address space, and return its stride share (if any) to the MLFQ pool.
pub fn wait<P: Platform>(kernel: &Kernel<P>, caller: usize) -> KernelResult<u64> {
    loop {
        let mut inner = kernel.table.inner.lock();
        let mut have_kids = false;
        let mut zombie = None;
        for i in 0..NPROC {
            if inner.tasks[i].parent == Some(caller) && inner.tasks[i].tid == 0 {
                have_kids = true;
                if inner.tasks[i].state == TaskState::Zombie {
                    zombie = Some(i);
                    break;
                }
            }
        }

        if let Some(z) = zombie {
            let pid = inner.tasks[z].pid;
            let kstack = inner.tasks[z].kstack;
            let space = inner.tasks[z].address_space;
            let share = inner.tasks[z].share;
            let was_stride = inner.tasks[z].is_stride();
            if was_stride {
                return_share_locked(&mut inner, share);
            }
            inner.tasks[z] = crate::task::Task::UNUSED;
            drop(inner);
            if let Some(k) = kstack {
                kernel.platform.kstack_free(k);
            }
            if let Some(space) = space {
                kernel.platform.map_destroy(space);
            }
            log::debug!("wait: caller slot={caller} reaped pid={pid}");
            return Ok(pid);
        }

        if !have_kids || inner.tasks[caller].is_killed() {
            return Err(if inner.tasks[caller].is_killed() {
                KernelError::Killed
            } else {
                KernelError::NoChildren
            });
        }

        drop(inner);
        sleep(kernel, caller, ChanId(caller));
    }
}

/// `exit`, case 1: a process-role task with no live threads. Wakes its
/// parent, reparents its own children (and any already-zombie child) to
/// init, and becomes a zombie itself.
fn exit_proc_and_proc<P: Platform>(kernel: &Kernel<P>, idx: usize) {
    close_files_and_cwd(kernel, idx);

    let mut inner = kernel.table.inner.lock();
    let parent = inner.tasks[idx].parent;
    if let Some(p) = parent {
        wakeup_locked(&mut inner, ChanId(p));
    }

    let init = inner.init;
    for i in 0..NPROC {
        if inner.tasks[i].parent == Some(idx) {
            inner.tasks[i].parent = init;
            if inner.tasks[i].state == TaskState::Zombie {
                if let Some(init_idx) = init {
                    wakeup_locked(&mut inner, ChanId(init_idx));
                }
            }
        }
    }
    inner.tasks[idx].state = TaskState::Zombie;
}

/// `exit`, case 2: a process-role task with live threads. Tears down
/// every thread first (closing its files, returning its stride share,
/// freeing its slot), shrinks the shared address space once the last
/// thread is gone, then falls through to the ordinary process exit path.
fn exit_proc_and_lwp<P: Platform>(kernel: &Kernel<P>, idx: usize) {
    let mut sum_of_threads = 0u32;
    let mut last_thread_gone = false;

    loop {
        let next = {
            let inner = kernel.table.inner.lock();
            (0..NPROC).find(|&i| inner.tasks[i].parent == Some(idx) && inner.tasks[i].tid != 0)
        };
        let Some(child) = next else { break };

        close_files_and_cwd(kernel, child);

        let mut inner = kernel.table.inner.lock();
        let share = inner.tasks[child].share;
        let was_stride = inner.tasks[child].is_stride();
        let kstack = inner.tasks[child].kstack;

        if let Role::Process(ref mut p) = inner.tasks[idx].role {
            p.num_of_threads -= 1;
            if p.num_of_threads == 0 {
                last_thread_gone = true;
                sum_of_threads = p.sum_of_threads;
                p.sum_of_threads = 0;
            }
        }
        if was_stride {
            return_share_locked(&mut inner, share);
        }
        inner.tasks[child] = crate::task::Task::UNUSED;
        drop(inner);
        if let Some(k) = kstack {
            kernel.platform.kstack_free(k);
        }
    }

    if last_thread_gone && sum_of_threads > 0 {
        let (space, size) = {
            let inner = kernel.table.inner.lock();
            (inner.tasks[idx].address_space, inner.tasks[idx].size)
        };
        if let Some(space) = space {
            let pages = 2 * sum_of_threads as usize;
            kernel.platform.map_shrink(space, pages);
            let mut inner = kernel.table.inner.lock();
            inner.tasks[idx].size = size.saturating_sub(pages * PAGE_SIZE);
        }
    }

    exit_proc_and_proc(kernel, idx);
}

/// `exit`, case 3: a thread exits via the plain exit path (not
/// `thread_exit`). Tears down every sibling thread and the owning
/// process-role task along with it, self-orphaning so the calling slot
/// is reaped as its own zombie. This mirrors `exitLWPAndLWP` exactly,
/// including its `2 * (sum_of_threads - 1)` shrink (one page pair short
/// of `exitProcAndLWP`'s `2 * sum_of_threads`) — see DESIGN.md for why
/// that discrepancy is preserved rather than "fixed".
fn exit_lwp_and_lwp<P: Platform>(kernel: &Kernel<P>, idx: usize) {
    let Some(pp) = kernel.table.inner.lock().tasks[idx].parent else {
        return;
    };

    loop {
        let next = {
            let inner = kernel.table.inner.lock();
            (0..NPROC).find(|&i| inner.tasks[i].parent == Some(pp) && inner.tasks[i].tid != 0 && i != idx)
        };
        let Some(sib) = next else { break };

        close_files_and_cwd(kernel, sib);

        let mut inner = kernel.table.inner.lock();
        let share = inner.tasks[sib].share;
        let was_stride = inner.tasks[sib].is_stride();
        let kstack = inner.tasks[sib].kstack;
        if let Role::Process(ref mut p) = inner.tasks[pp].role {
            p.num_of_threads -= 1;
        }
        if was_stride {
            return_share_locked(&mut inner, share);
        }
        inner.tasks[sib] = crate::task::Task::UNUSED;
        drop(inner);
        if let Some(k) = kstack {
            kernel.platform.kstack_free(k);
        }
    }

    close_files_and_cwd(kernel, idx);

    let mut sum_of_threads = 0u32;
    let mut last_gone = false;
    {
        let mut inner = kernel.table.inner.lock();
        if let Role::Process(ref mut p) = inner.tasks[pp].role {
            p.num_of_threads -= 1;
            if p.num_of_threads == 0 && p.sum_of_threads > 0 {
                sum_of_threads = p.sum_of_threads;
                last_gone = true;
                p.sum_of_threads = 0;
            }
        }
    }

    if last_gone && sum_of_threads > 0 {
        let (space, size) = {
            let inner = kernel.table.inner.lock();
            (inner.tasks[pp].address_space, inner.tasks[pp].size)
        };
        if let Some(space) = space {
            let pages = 2 * (sum_of_threads - 1) as usize;
            kernel.platform.map_shrink(space, pages);
            let mut inner = kernel.table.inner.lock();
            inner.tasks[pp].size = size.saturating_sub(pages * PAGE_SIZE);
        }
    }

    {
        let mut inner = kernel.table.inner.lock();
        inner.tasks[idx].state = TaskState::Zombie;
        inner.tasks[idx].parent = Some(idx);
    }

    close_files_and_cwd(kernel, pp);

    let grandparent = kernel.table.inner.lock().tasks[pp].parent;
    let mut inner = kernel.table.inner.lock();
    if let Some(gp) = grandparent {
        wakeup_locked(&mut inner, ChanId(gp));
    }
    inner.tasks[pp].state = TaskState::Zombie;
}

/// Dispatch to one of the three exit paths based on the caller's role.
/// In the real kernel this never returns to the caller; here it commits
/// every state transition and returns, since there is no real scheduler
/// loop underneath to transfer control away.
pub fn exit<P: Platform>(kernel: &Kernel<P>, idx: usize) {
    let (tid, num_threads) = {
        let inner = kernel.table.inner.lock();
        let t = &inner.tasks[idx];
        let n = match t.role {
            Role::Process(p) => p.num_of_threads,
            Role::Thread => 0,
        };
        (t.tid, n)
    };

    if tid == 0 && num_threads == 0 {
        exit_proc_and_proc(kernel, idx);
    } else if tid == 0 {
        exit_proc_and_lwp(kernel, idx);
    } else {
        exit_lwp_and_lwp(kernel, idx);
    }
}

/// `kill`: mark a task killed, waking it if it is sleeping so it observes
/// the kill promptly rather than only on its next voluntary block.
pub fn kill<P: Platform>(kernel: &Kernel<P>, pid: u64) -> KernelResult<()> {
    let mut inner = kernel.table.inner.lock();
    for t in inner.tasks.iter_mut() {
        if t.pid == pid && t.state != TaskState::Unused {
            t.set_killed();
            if t.state == TaskState::Sleeping {
                t.state = TaskState::Runnable;
            }
            return Ok(());
        }
    }
    Err(KernelError::ProcessNotFound { pid })
}

/// `yield`: voluntarily give up the CPU. `Running -> Runnable`.
pub fn yield_now<P: Platform>(kernel: &Kernel<P>, idx: usize) {
    let mut inner = kernel.table.inner.lock();
    inner.tasks[idx].state = TaskState::Runnable;
    for c in inner.current.iter_mut() {
        if *c == Some(idx) {
            *c = None;
        }
    }
}

/// `sleep`: block on `channel` until a matching `wakeup`.
pub fn sleep<P: Platform>(kernel: &Kernel<P>, idx: usize, channel: ChanId) {
    let mut inner = kernel.table.inner.lock();
    inner.tasks[idx].wait_channel = Some(channel);
    inner.tasks[idx].state = TaskState::Sleeping;
    for c in inner.current.iter_mut() {
        if *c == Some(idx) {
            *c = None;
        }
    }
}

/// `wakeup`: wake every task sleeping on `channel`.
pub fn wakeup<P: Platform>(kernel: &Kernel<P>, channel: ChanId) {
    let mut inner = kernel.table.inner.lock();
    wakeup_locked(&mut inner, channel);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockPlatform;
    use crate::task::TaskState;
    use crate::Kernel;

    fn boot() -> (Kernel<MockPlatform>, usize) {
        let kernel = Kernel::new(MockPlatform::new());
        let init = kernel.spawn_init("init").unwrap();
        (kernel, init)
    }

    #[test]
    fn fork_child_sees_zero_return() {
        let (kernel, init) = boot();
        let child_pid = fork(&kernel, init).unwrap();
        let inner = kernel.table.inner.lock();
        let child = inner.tasks.iter().find(|t| t.pid == child_pid).unwrap();
        assert_eq!(child.trap_frame.ret, 0);
        assert_eq!(child.state, TaskState::Runnable);
    }

    /// Scenario 1: boot, fork a child, the child exits, the parent waits
    /// and reaps it.
    #[test]
    fn boot_fork_exit_wait_reaps_child() {
        let (kernel, init) = boot();
        let child_pid = fork(&kernel, init).unwrap();
        let child_idx = kernel
            .table
            .inner
            .lock()
            .tasks
            .iter()
            .position(|t| t.pid == child_pid)
            .unwrap();

        exit(&kernel, child_idx);
        assert_eq!(kernel.table.inner.lock().tasks[child_idx].state, TaskState::Zombie);

        let reaped = wait(&kernel, init).unwrap();
        assert_eq!(reaped, child_pid);
        assert_eq!(kernel.table.inner.lock().tasks[child_idx].state, TaskState::Unused);
    }

    #[test]
    fn wait_with_no_children_fails() {
        let (kernel, init) = boot();
        assert_eq!(wait(&kernel, init), Err(KernelError::NoChildren));
    }

    /// Scenario 5: killing a sleeping task wakes it so it can observe the
    /// kill instead of sleeping forever.
    #[test]
    fn kill_wakes_a_sleeping_task() {
        let (kernel, init) = boot();
        let child_pid = fork(&kernel, init).unwrap();
        let child_idx = kernel
            .table
            .inner
            .lock()
            .tasks
            .iter()
            .position(|t| t.pid == child_pid)
            .unwrap();

        sleep(&kernel, child_idx, ChanId(99));
        assert_eq!(kernel.table.inner.lock().tasks[child_idx].state, TaskState::Sleeping);

        kill(&kernel, child_pid).unwrap();
        let inner = kernel.table.inner.lock();
        assert_eq!(inner.tasks[child_idx].state, TaskState::Runnable);
        assert!(inner.tasks[child_idx].is_killed());
    }

    #[test]
    fn kill_missing_pid_fails() {
        let (kernel, _init) = boot();
        assert_eq!(kill(&kernel, 9999), Err(KernelError::ProcessNotFound { pid: 9999 }));
    }

    #[test]
    fn exit_reparents_orphans_to_init() {
        let (kernel, init) = boot();
        let parent_pid = fork(&kernel, init).unwrap();
        let parent_idx = kernel
            .table
            .inner
            .lock()
            .tasks
            .iter()
            .position(|t| t.pid == parent_pid)
            .unwrap();
        let grandchild_pid = fork(&kernel, parent_idx).unwrap();
        let grandchild_idx = kernel
            .table
            .inner
            .lock()
            .tasks
            .iter()
            .position(|t| t.pid == grandchild_pid)
            .unwrap();

        exit(&kernel, parent_idx);

        let inner = kernel.table.inner.lock();
        assert_eq!(inner.tasks[grandchild_idx].parent, Some(init));
    }

    /// A forked (non-init) process is tagged `Role::Process`, exactly like
    /// init, so its thread-group accounting works the same way.
    #[test]
    fn forked_process_is_tagged_process_role() {
        let (kernel, init) = boot();
        let child_pid = fork(&kernel, init).unwrap();
        let inner = kernel.table.inner.lock();
        let child = inner.tasks.iter().find(|t| t.pid == child_pid).unwrap();
        assert!(matches!(child.role, Role::Process(_)));
    }

    /// Exit case 2: a process with live threads exits directly (not via
    /// `thread_exit`). Every thread is torn down, the shared address space
    /// is shrunk, and the process itself becomes a reapable zombie.
    #[test]
    fn exit_proc_and_lwp_tears_down_threads_and_shrinks() {
        let (kernel, init) = boot();
        let proc_pid = fork(&kernel, init).unwrap();
        let proc_idx = kernel
            .table
            .inner
            .lock()
            .tasks
            .iter()
            .position(|t| t.pid == proc_pid)
            .unwrap();

        let t1 = crate::thread::thread_create(&kernel, proc_idx, 0x1000, 0).unwrap();
        let t2 = crate::thread::thread_create(&kernel, proc_idx, 0x1000, 1).unwrap();

        exit(&kernel, proc_idx);

        let inner = kernel.table.inner.lock();
        assert_eq!(inner.tasks[proc_idx].state, TaskState::Zombie);
        assert!(!inner.tasks.iter().any(|t| t.tid == t1 || t.tid == t2));
        drop(inner);

        assert_eq!(wait(&kernel, init).unwrap(), proc_pid);
    }

    /// Exit case 3: a thread exits through the plain `exit` path instead of
    /// `thread_exit`. Its sibling threads and the owning process are torn
    /// down along with it, and the caller self-orphans into its own zombie.
    #[test]
    fn exit_lwp_and_lwp_tears_down_process_and_siblings() {
        let (kernel, init) = boot();
        let proc_pid = fork(&kernel, init).unwrap();
        let proc_idx = kernel
            .table
            .inner
            .lock()
            .tasks
            .iter()
            .position(|t| t.pid == proc_pid)
            .unwrap();

        let t1 = crate::thread::thread_create(&kernel, proc_idx, 0x1000, 0).unwrap();
        let t2 = crate::thread::thread_create(&kernel, proc_idx, 0x1000, 1).unwrap();
        let t1_idx = kernel.table.inner.lock().tasks.iter().position(|t| t.tid == t1).unwrap();

        exit(&kernel, t1_idx);

        let inner = kernel.table.inner.lock();
        assert_eq!(inner.tasks[t1_idx].state, TaskState::Zombie);
        assert_eq!(inner.tasks[t1_idx].parent, Some(t1_idx));
        assert_eq!(inner.tasks[proc_idx].state, TaskState::Zombie);
        assert!(!inner.tasks.iter().any(|t| t.tid == t2));
        drop(inner);

        assert_eq!(wait(&kernel, init).unwrap(), proc_pid);
    }

    /// P7: no lost wakeups — every task sleeping on a channel at the
    /// moment `wakeup` runs transitions to `Runnable`, regardless of how
    /// many tasks share that channel.
    #[test]
    fn wakeup_wakes_every_sleeper_on_same_channel() {
        let (kernel, init) = boot();
        let pid_a = fork(&kernel, init).unwrap();
        let pid_b = fork(&kernel, init).unwrap();
        let idx_a = kernel.table.inner.lock().tasks.iter().position(|t| t.pid == pid_a).unwrap();
        let idx_b = kernel.table.inner.lock().tasks.iter().position(|t| t.pid == pid_b).unwrap();

        sleep(&kernel, idx_a, ChanId(7));
        sleep(&kernel, idx_b, ChanId(7));
        assert_eq!(kernel.table.inner.lock().tasks[idx_a].state, TaskState::Sleeping);
        assert_eq!(kernel.table.inner.lock().tasks[idx_b].state, TaskState::Sleeping);

        wakeup(&kernel, ChanId(7));

        let inner = kernel.table.inner.lock();
        assert_eq!(inner.tasks[idx_a].state, TaskState::Runnable);
        assert_eq!(inner.tasks[idx_b].state, TaskState::Runnable);
    }

    /// A wakeup that runs before the matching sleep call does not carry
    /// forward: `wakeup_locked` only scans tasks already `Sleeping`, so the
    /// waiter must re-check its condition under `TL` before sleeping.
    #[test]
    fn wakeup_before_sleep_does_not_carry_forward() {
        let (kernel, init) = boot();
        let pid_a = fork(&kernel, init).unwrap();
        let idx_a = kernel.table.inner.lock().tasks.iter().position(|t| t.pid == pid_a).unwrap();

        wakeup(&kernel, ChanId(42));
        sleep(&kernel, idx_a, ChanId(42));

        assert_eq!(kernel.table.inner.lock().tasks[idx_a].state, TaskState::Sleeping);
    }
}
