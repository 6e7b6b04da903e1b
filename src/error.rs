//! Crate-wide error currency.

use core::fmt;

/// Errors produced by the task table, stride bookkeeper, and lifecycle
/// manager. Mirrors the structured-enum convention rather than string
/// errors: resource exhaustion and user-request failures become `Err`
/// variants here; contract violations panic at the call site instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// No free slot in the task table.
    TableFull,
    /// No task with this pid exists.
    ProcessNotFound { pid: u64 },
    /// No task with this tid exists.
    ThreadNotFound { tid: u64 },
    /// `wait`/`thread_join` found no matching children to wait for.
    NoChildren,
    /// Caller was killed while blocked waiting for a child.
    Killed,
    /// `set_cpu_share` admission rule rejected this request.
    InvalidShare { requested: i32 },
    /// A `Platform::map_*` call failed.
    AddressSpaceFailure,
    /// A `Platform::kstack_alloc` call failed.
    StackAllocFailure,
    /// A fatal contract violation (held lock into schedule, re-init of an
    /// already-booted init task, ...). Carried through to a uniform panic
    /// message at the call site rather than panicking deep in a helper.
    LockContractViolation(&'static str),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::TableFull => write!(f, "task table full"),
            KernelError::ProcessNotFound { pid } => write!(f, "no process with pid {pid}"),
            KernelError::ThreadNotFound { tid } => write!(f, "no thread with tid {tid}"),
            KernelError::NoChildren => write!(f, "no children to wait for"),
            KernelError::Killed => write!(f, "caller was killed"),
            KernelError::InvalidShare { requested } => {
                write!(f, "cpu share request {requested} rejected")
            }
            KernelError::AddressSpaceFailure => write!(f, "address space operation failed"),
            KernelError::StackAllocFailure => write!(f, "kernel stack allocation failed"),
            KernelError::LockContractViolation(msg) => write!(f, "lock contract violation: {msg}"),
        }
    }
}

pub type KernelResult<T> = Result<T, KernelError>;
