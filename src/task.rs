//! The task control block and its small satellite types.

use crate::config::{NOFILE, TASK_NAME_LEN};
use crate::platform::{AddressSpaceId, Context, FileId, InodeId, KernelStackId, TrapFrame};
use bitflags::bitflags;

/// A task's position in the lifecycle state machine (spec §3/§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    #[default]
    Unused,
    Embryo,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

bitflags! {
    /// Sticky per-task bits. `KILLED` and the stride/MLFQ scheduling-class
    /// bits are logically independent of `TaskState`, so they live in a
    /// bitset instead of widening the state enum.
    #[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TaskFlags: u8 {
        const KILLED = 0b0000_0001;
        const STRIDE = 0b0000_0010;
    }
}

/// Thread-group bookkeeping that only makes sense on the process-role
/// task of a thread group (spec §3, §4.6).
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRole {
    pub num_of_threads: u32,
    pub sum_of_threads: u32,
}

/// Whether a task slot is the process-role task of a thread group or one
/// of its threads. Replaces the original `tid == 0` check with a tagged
/// variant, per the design note in spec §9.
#[derive(Debug, Clone, Copy)]
pub enum Role {
    Process(ProcessRole),
    Thread,
}

impl Default for Role {
    fn default() -> Self {
        Role::Thread
    }
}

/// An opaque wait channel. Two tasks rendezvous in `sleep`/`wakeup` by
/// comparing `ChanId`s for equality only, never by inspecting what a
/// channel "means" (mirrors address-equality sleep channels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChanId(pub usize);

/// One task table slot: a process (`tid == 0`) or one of its threads
/// (`tid != 0`), per spec §3's data model.
#[derive(Debug, Clone, Copy)]
pub struct Task {
    pub state: TaskState,
    pub pid: u64,
    pub tid: u64,
    /// Index of the owning task in the table: for a thread, its process;
    /// for a process, its parent process.
    pub parent: Option<usize>,
    pub address_space: Option<AddressSpaceId>,
    /// Top of the address space, in bytes. Meaningful only on the
    /// process-role task; threads share their process's value.
    pub size: usize,
    pub kstack: Option<KernelStackId>,
    pub context: Context,
    pub trap_frame: TrapFrame,
    pub files: [Option<FileId>; NOFILE],
    pub cwd: Option<InodeId>,
    pub name: [u8; TASK_NAME_LEN],
    pub flags: TaskFlags,
    pub wait_channel: Option<ChanId>,
    /// MLFQ level, meaningful only while `!flags.contains(STRIDE)`.
    pub level: u8,
    /// Ticks accumulated at the current level since the last demotion or
    /// boost.
    pub ticks: u32,
    pub share: i32,
    pub stride: i32,
    pub pass: i64,
    pub role: Role,
    /// Set by `thread_exit`, read back by the joining `thread_join`.
    pub retval: u64,
}

impl Task {
    pub const UNUSED: Task = Task {
        state: TaskState::Unused,
        pid: 0,
        tid: 0,
        parent: None,
        address_space: None,
        size: 0,
        kstack: None,
        context: Context { sp: 0, regs: [0; 6] },
        trap_frame: TrapFrame { ip: 0, sp: 0, arg0: 0, ret: 0 },
        files: [None; NOFILE],
        cwd: None,
        name: [0; TASK_NAME_LEN],
        flags: TaskFlags::empty(),
        wait_channel: None,
        level: 0,
        ticks: 0,
        share: 0,
        stride: 0,
        pass: 0,
        role: Role::Thread,
        retval: 0,
    };

    pub fn is_killed(&self) -> bool {
        self.flags.contains(TaskFlags::KILLED)
    }

    pub fn set_killed(&mut self) {
        self.flags.insert(TaskFlags::KILLED);
    }

    pub fn is_stride(&self) -> bool {
        self.flags.contains(TaskFlags::STRIDE)
    }

    pub fn set_stride(&mut self, stride: bool) {
        self.flags.set(TaskFlags::STRIDE, stride);
    }

    /// `tid == 0` marks a process-role task; any other value marks a
    /// thread.
    pub fn is_thread(&self) -> bool {
        self.tid != 0
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = [0; TASK_NAME_LEN];
        let bytes = name.as_bytes();
        let n = bytes.len().min(TASK_NAME_LEN);
        self.name[..n].copy_from_slice(&bytes[..n]);
    }

    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(TASK_NAME_LEN);
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }
}
