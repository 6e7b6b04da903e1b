//! MLFQ level bookkeeping: per-level quantum/allotment, demotion, boost.
//!
//! Grounded directly on `original_source/xv6-public/proc.c`'s `scheduler()`
//! MLFQ branch: `p->ticks += time_quantum[p->level]; ... if (p->ticks >=
//! time_allotment[p->level]) { demote or boost }`.

use crate::config::{MLFQ_ALLOTMENT, MLFQ_LEVELS, MLFQ_QUANTUM};
use crate::task::Task;

/// Charge one dispatch at `task`'s current level, demoting it (or
/// priority-boosting it back to level 0 from the bottom level) once its
/// accumulated ticks cross that level's allotment.
///
/// Does not touch `state`; the caller is responsible for the
/// Runnable/Running transition around this call.
pub fn advance(task: &mut Task) {
    let level = task.level as usize;
    task.ticks += MLFQ_QUANTUM[level];
    if task.ticks >= MLFQ_ALLOTMENT[level] {
        task.ticks = 0;
        task.level = if level + 1 == MLFQ_LEVELS { 0 } else { task.level + 1 };
    }
}
