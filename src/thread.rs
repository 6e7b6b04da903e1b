//! The thread group coordinator: `thread_create`, `thread_exit`,
//! `thread_join`, and the `PL` lock that serializes thread creation
//! within one process.
//!
//! Grounded on `original_source/xv6-public/proc.c`'s `thread_create`,
//! `thread_exit`, and `thread_join`.

use crate::config::{NOFILE, NPROC, PAGE_SIZE, TOTALTICKET_SHARE_CAP};
use crate::error::{KernelError, KernelResult};
use crate::platform::Platform;
use crate::table::{self, wakeup_locked};
use crate::task::{ChanId, Role, TaskState};
use crate::Kernel;

/// Create a new thread (R1-R4): it shares `caller`'s address space, files,
/// and current directory, gets two fresh stack pages at the top of that
/// address space, and is admitted into the same stride reservation as its
/// siblings if `caller` already holds one.
pub fn thread_create<P: Platform>(
    kernel: &Kernel<P>,
    caller: usize,
    entry: usize,
    arg: u64,
) -> KernelResult<u64> {
    let child = table::alloc_task(&kernel.table, &kernel.platform)?;

    // PL serializes the address-space growth and sibling re-split below
    // against a second, concurrent thread_create on the same process.
    let _pl = kernel.pl.lock();

    let space = {
        let inner = kernel.table.inner.lock();
        inner.tasks[caller].address_space
    };
    let Some(space) = space else {
        table::free_embryo(&kernel.table, &kernel.platform, child);
        return Err(KernelError::AddressSpaceFailure);
    };

    let new_top = match kernel.platform.map_grow(space, 2) {
        Ok(top) => top,
        Err(e) => {
            table::free_embryo(&kernel.table, &kernel.platform, child);
            return Err(e);
        }
    };
    let stack_top = new_top;

    let (files, cwd, name) = {
        let mut inner = kernel.table.inner.lock();
        inner.tasks[caller].size = new_top;
        let p = &inner.tasks[caller];
        (p.files, p.cwd, p.name)
    };

    let dup_files = files.map(|f| f.map(|fid| kernel.platform.file_dup(fid)));
    let dup_cwd = cwd.map(|c| kernel.platform.inode_dup(c));

    let mut inner = kernel.table.inner.lock();
    let child_pid = inner.tasks[child].pid;
    {
        let c = &mut inner.tasks[child];
        c.tid = child_pid; // R4: tid == pid for a thread
        c.address_space = Some(space);
        c.size = new_top;
        c.parent = Some(caller);
        c.files = dup_files;
        c.cwd = dup_cwd;
        c.name = name;
        c.trap_frame = crate::platform::TrapFrame {
            ip: entry,
            sp: stack_top,
            arg0: arg,
            ret: 0,
        };
        c.state = TaskState::Runnable;
    }

    if let Role::Process(ref mut role) = inner.tasks[caller].role {
        role.num_of_threads += 1;
        role.sum_of_threads += 1;
    }

    // R2: if the process already holds a stride reservation, re-split it
    // evenly across the (now larger) thread group. `(share * n) / n` is a
    // no-op preserved verbatim from the original; see DESIGN.md.
    if inner.tasks[caller].is_stride() {
        let (n, current_share) = match inner.tasks[caller].role {
            Role::Process(role) if role.num_of_threads > 0 => {
                (role.num_of_threads as i32, inner.tasks[caller].share)
            }
            _ => (1, inner.tasks[caller].share / 2),
        };
        let new_share = ((current_share * n) / n).max(1);
        let new_stride = TOTALTICKET_SHARE_CAP / new_share;
        inner.tasks[caller].share = new_share;
        inner.tasks[caller].stride = new_stride;
        let parent_pass = inner.tasks[caller].pass;

        for i in 0..NPROC {
            if inner.tasks[i].parent == Some(caller) && inner.tasks[i].tid != 0 {
                inner.tasks[i].set_stride(true);
                inner.tasks[i].share = new_share;
                inner.tasks[i].stride = new_stride;
                inner.tasks[i].pass = parent_pass;
            }
        }
    }

    log::debug!("thread_create: parent slot={caller} tid={child_pid}");
    Ok(child_pid)
}

/// `thread_exit`: wake the joiner, reparent any of this thread's own
/// children to init, store `retval` for `thread_join` to pick up, and
/// become a zombie.
pub fn thread_exit<P: Platform>(kernel: &Kernel<P>, idx: usize, retval: u64) {
    let (files, cwd) = {
        let mut inner = kernel.table.inner.lock();
        let files = core::mem::replace(&mut inner.tasks[idx].files, [None; NOFILE]);
        let cwd = inner.tasks[idx].cwd.take();
        (files, cwd)
    };
    for f in files.into_iter().flatten() {
        kernel.platform.file_close(f);
    }
    if let Some(c) = cwd {
        kernel.platform.log_begin();
        kernel.platform.inode_put(c);
        kernel.platform.log_end();
    }

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

    inner.tasks[idx].retval = retval;
    inner.tasks[idx].state = TaskState::Zombie;
}

/// `thread_join`: block until the thread with table-matching `parent` and
/// `tid` becomes a zombie, then reap it and return its pid and retval.
/// Unlike `wait`, the address space is never destroyed here (I6): only
/// the process-role task's own reap via `wait` owns that.
pub fn thread_join<P: Platform>(kernel: &Kernel<P>, caller: usize, tid: u64) -> KernelResult<(u64, u64)> {
    loop {
        let mut inner = kernel.table.inner.lock();
        let mut have_kids = false;
        let mut zombie = None;
        for i in 0..NPROC {
            if inner.tasks[i].parent == Some(caller) && inner.tasks[i].tid == tid {
                have_kids = true;
                if inner.tasks[i].state == TaskState::Zombie {
                    zombie = Some(i);
                    break;
                }
            }
        }

        if let Some(z) = zombie {
            let pid = inner.tasks[z].pid;
            let retval = inner.tasks[z].retval;
            let kstack = inner.tasks[z].kstack;
            let share = inner.tasks[z].share;
            let was_stride = inner.tasks[z].is_stride();

            let mut shrink: Option<(crate::platform::AddressSpaceId, usize, usize)> = None;
            if let Role::Process(ref mut role) = inner.tasks[caller].role {
                role.num_of_threads -= 1;
                if role.num_of_threads == 0 {
                    let pages = 2 * role.sum_of_threads as usize;
                    role.sum_of_threads = 0;
                    if let Some(space) = inner.tasks[caller].address_space {
                        shrink = Some((space, pages, inner.tasks[caller].size));
                    }
                }
            }
            if was_stride {
                inner.mlfq.share += share;
                inner.mlfq.stride = TOTALTICKET_SHARE_CAP / inner.mlfq.share;
            }
            inner.tasks[z] = crate::task::Task::UNUSED;
            drop(inner);

            if let Some(k) = kstack {
                kernel.platform.kstack_free(k);
            }
            if let Some((space, pages, size)) = shrink {
                kernel.platform.map_shrink(space, pages);
                let mut inner = kernel.table.inner.lock();
                inner.tasks[caller].size = size.saturating_sub(pages * PAGE_SIZE);
            }
            log::debug!("thread_join: caller slot={caller} reaped tid={tid} pid={pid}");
            return Ok((pid, retval));
        }

        if !have_kids || inner.tasks[caller].is_killed() {
            return Err(KernelError::NoChildren);
        }

        drop(inner);
        crate::lifecycle::sleep(kernel, caller, ChanId(caller));
    }
}
