//! Stride-side bookkeeping: `set_cpu_share` admission and epoch wrap.
//!
//! Grounded on `original_source/xv6-public/proc.c`'s `set_cpu_share` and the
//! `mlfq.pass >= 100000000` wrap check inside `scheduler()`.

use crate::config::{MLFQ_RESERVED_FLOOR, STRIDE_EPOCH_SENTINEL, TOTALTICKET_SHARE_CAP};
use crate::error::{KernelError, KernelResult};
use crate::table::{TaskTable, TaskTableInner};
use crate::task::Role;

/// Reset every stride task's pass, and the MLFQ pseudo-task's pass, to
/// zero once `mlfq.pass` crosses the epoch sentinel (I7). Keeps pass
/// values from growing without bound while leaving relative fairness
/// intact, since every pass is reset together.
pub fn maybe_epoch_wrap(inner: &mut TaskTableInner) {
    if inner.mlfq.pass >= STRIDE_EPOCH_SENTINEL {
        inner.mlfq.pass = 0;
        for t in inner.tasks.iter_mut() {
            if t.is_stride() {
                t.pass = 0;
            }
        }
    }
}

/// Admit (or reject) a stride reservation for `caller`.
///
/// - Rejects non-positive requests.
/// - Rejects requests that would leave `mlfq.share` below the reserved
///   floor (I3).
/// - If `caller` is a process-role task with live threads, the request is
///   split evenly across the process and every one of its threads
///   (spec §4.6); otherwise it applies to `caller` alone.
/// - The granted pass is the minimum of `mlfq.pass` and the lowest pass
///   among existing stride tasks, so a newly admitted task does not leap
///   ahead of (or catastrophically behind) the tasks already competing.
pub fn set_cpu_share(table: &TaskTable, caller: usize, requested: i32) -> KernelResult<i32> {
    if requested <= 0 {
        log::warn!("set_cpu_share: rejected non-positive share {requested}");
        return Err(KernelError::InvalidShare { requested });
    }

    let mut inner = table.inner.lock();

    if inner.mlfq.share - requested < MLFQ_RESERVED_FLOOR {
        log::warn!(
            "set_cpu_share: rejected share {requested}, mlfq.share={} would drop below floor",
            inner.mlfq.share
        );
        return Err(KernelError::InvalidShare { requested });
    }

    let min_existing_pass = inner
        .tasks
        .iter()
        .filter(|t| t.is_stride())
        .map(|t| t.pass)
        .min();
    let pass = min_existing_pass.map(|m| m.min(inner.mlfq.pass)).unwrap_or(inner.mlfq.pass);

    let role = inner.tasks[caller].role;
    let pid = inner.tasks[caller].pid;

    let share = match role {
        Role::Process(p) if p.num_of_threads > 0 => requested / (p.num_of_threads as i32),
        _ => requested,
    };
    if share <= 0 {
        log::warn!("set_cpu_share: rejected share {requested}, splits to zero across threads");
        return Err(KernelError::InvalidShare { requested });
    }
    let stride = TOTALTICKET_SHARE_CAP / share;

    inner.tasks[caller].set_stride(true);
    inner.tasks[caller].share = share;
    inner.tasks[caller].stride = stride;
    inner.tasks[caller].pass = pass;

    for i in 0..inner.tasks.len() {
        if inner.tasks[i].parent == Some(caller) && inner.tasks[i].tid != 0 {
            inner.tasks[i].set_stride(true);
            inner.tasks[i].share = share;
            inner.tasks[i].stride = stride;
            inner.tasks[i].pass = pass;
        }
    }

    inner.mlfq.share -= requested;
    inner.mlfq.stride = TOTALTICKET_SHARE_CAP / inner.mlfq.share;
    log::debug!("set_cpu_share: pid={pid} requested={requested} mlfq.share={}", inner.mlfq.share);
    Ok(requested)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockPlatform;
    use crate::table::alloc_task;
    use crate::task::TaskState;

    fn spawn(table: &TaskTable, platform: &MockPlatform) -> usize {
        let idx = alloc_task(table, platform).unwrap();
        table.inner.lock().tasks[idx].state = TaskState::Runnable;
        idx
    }

    /// P1 / scenario 2: two tasks each take 40% share, leaving 20% for
    /// MLFQ exactly at the floor; a third task can no longer be admitted
    /// at any positive share once the floor is hit.
    #[test]
    fn admission_respects_reserved_floor() {
        let platform = MockPlatform::new();
        let table = TaskTable::new();
        let a = spawn(&table, &platform);
        let b = spawn(&table, &platform);
        let c = spawn(&table, &platform);

        assert_eq!(set_cpu_share(&table, a, 40), Ok(40));
        assert_eq!(set_cpu_share(&table, b, 40), Ok(40));
        assert_eq!(table.inner.lock().mlfq.share, 20);

        assert_eq!(
            set_cpu_share(&table, c, 19),
            Err(KernelError::InvalidShare { requested: 19 })
        );
        assert_eq!(table.inner.lock().mlfq.share, 20);
    }

    #[test]
    fn rejects_non_positive_share() {
        let platform = MockPlatform::new();
        let table = TaskTable::new();
        let a = spawn(&table, &platform);
        assert_eq!(
            set_cpu_share(&table, a, 0),
            Err(KernelError::InvalidShare { requested: 0 })
        );
        assert_eq!(
            set_cpu_share(&table, a, -5),
            Err(KernelError::InvalidShare { requested: -5 })
        );
    }

    #[test]
    fn epoch_wrap_resets_every_stride_pass() {
        let platform = MockPlatform::new();
        let table = TaskTable::new();
        let a = spawn(&table, &platform);
        set_cpu_share(&table, a, 50).unwrap();
        {
            let mut inner = table.inner.lock();
            inner.tasks[a].pass = 123;
            inner.mlfq.pass = STRIDE_EPOCH_SENTINEL;
        }
        {
            let mut inner = table.inner.lock();
            maybe_epoch_wrap(&mut inner);
        }
        let inner = table.inner.lock();
        assert_eq!(inner.mlfq.pass, 0);
        assert_eq!(inner.tasks[a].pass, 0);
    }
}
