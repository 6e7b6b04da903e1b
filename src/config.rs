//! Kernel-wide tunables.
//!
//! Centralized here so `table`, `stride`, `mlfq`, and `scheduler` all read
//! the same constants instead of re-declaring them, the way the teacher
//! centralizes `MAX_PROCESSES`/`DEFAULT_TIME_SLICE`.

/// Maximum number of task slots in the global task table.
pub const NPROC: usize = 64;

/// Number of CPUs modeled by the scheduler loop.
pub const NCPU: usize = 8;

/// Maximum number of open file descriptors per task.
pub const NOFILE: usize = 16;

/// Fixed-size task name buffer length (mirrors the original `char name[16]`).
pub const TASK_NAME_LEN: usize = 16;

/// Total stride "ticket" pool, also the share admission cap.
pub const TOTALTICKET_SHARE_CAP: i32 = 100;

/// MLFQ must always retain at least this much share.
pub const MLFQ_RESERVED_FLOOR: i32 = 20;

/// Number of MLFQ priority levels.
pub const MLFQ_LEVELS: usize = 3;

/// Per-level quantum, in ticks charged per dispatch.
pub const MLFQ_QUANTUM: [u32; MLFQ_LEVELS] = [1, 2, 4];

/// Per-level allotment, in accumulated ticks before demotion/boost.
pub const MLFQ_ALLOTMENT: [u32; MLFQ_LEVELS] = [5, 10, 100];

/// Stride pass sentinel: crossing this triggers an epoch wrap (I7).
pub const STRIDE_EPOCH_SENTINEL: i64 = 100_000_000;

/// Nominal page size used for address-space bookkeeping (size, growth).
pub const PAGE_SIZE: usize = 4096;
