//! The out-of-scope-collaborator boundary.
//!
//! Everything this crate deliberately does not implement — VM primitives,
//! the inode cache, file descriptors, the journaling log, and the raw
//! context switch — is named here as a trait, the way the teacher puts a
//! neutral `TaskContext` enum in front of its per-arch context backends.
//! A real kernel plugs in one concrete `Platform`; tests plug in the mock
//! below.

use crate::error::KernelResult;

/// Opaque handle to a per-process address space, owned by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct AddressSpaceId(pub u64);

/// Opaque handle to a kernel stack, owned by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct KernelStackId(pub u64);

/// Opaque open-file-table handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct FileId(pub u32);

/// Opaque inode handle (used for `cwd`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct InodeId(pub u64);

/// Saved callee-saved register state for one task, opaque to the
/// scheduler beyond being swapped by `Platform::ctx_switch`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Context {
    pub sp: usize,
    pub regs: [usize; 6],
}

/// The trap frame a task resumes into on its first dispatch, or restores
/// from the kernel stack thereafter.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrapFrame {
    pub ip: usize,
    pub sp: usize,
    pub arg0: u64,
    pub ret: u64,
}

/// Every collaborator the scheduling/lifecycle core needs but does not
/// own: address-space manipulation, kernel stacks, the open-file table,
/// the inode cache, the journaling log, and the raw context switch.
pub trait Platform: Sync {
    /// Duplicate `parent`'s address space for a forked child (`copyuvm`).
    fn map_copy(&self, parent: AddressSpaceId) -> KernelResult<AddressSpaceId>;
    /// Grow `space` by `pages` pages, returning the new top address
    /// (`allocuvm`).
    fn map_grow(&self, space: AddressSpaceId, pages: usize) -> KernelResult<usize>;
    /// Shrink `space` by `pages` pages (`deallocuvm`).
    fn map_shrink(&self, space: AddressSpaceId, pages: usize);
    /// Tear down an address space no longer referenced by any task.
    fn map_destroy(&self, space: AddressSpaceId);
    /// Install `space` as the active user address space on this CPU
    /// (`switchuvm`).
    fn map_activate_user(&self, space: AddressSpaceId);
    /// Install the kernel's own address space on this CPU (`switchkvm`).
    fn map_activate_kernel(&self);
    /// Allocate one kernel stack for a new task.
    fn kstack_alloc(&self) -> KernelResult<KernelStackId>;
    /// Release a kernel stack.
    fn kstack_free(&self, stack: KernelStackId);
    /// Bump a file's reference count (`filedup`).
    fn file_dup(&self, file: FileId) -> FileId;
    /// Drop a reference to an open file (`fileclose`).
    fn file_close(&self, file: FileId);
    /// Bump an inode's reference count (`idup`).
    fn inode_dup(&self, inode: InodeId) -> InodeId;
    /// Drop a reference to an inode (`iput`).
    fn inode_put(&self, inode: InodeId);
    /// Begin a filesystem log transaction (`begin_op`).
    fn log_begin(&self);
    /// End a filesystem log transaction (`end_op`).
    fn log_end(&self);
    /// Swap callee-saved register state from `from` to `to` (`swtch`).
    fn ctx_switch(&self, from: &mut Context, to: &Context);
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

    /// Deterministic, allocation-free `Platform` for the host test suite.
    /// Every handle is a monotonically increasing counter; none of it
    /// models real memory, so tests exercise the bookkeeping this crate
    /// owns without needing a real MMU or disk.
    pub struct MockPlatform {
        next_space: AtomicU64,
        next_stack: AtomicU64,
        next_file: AtomicU32,
        next_inode: AtomicU64,
        pub switch_count: AtomicU64,
        pub fail_map_copy: core::sync::atomic::AtomicBool,
        pub fail_kstack: core::sync::atomic::AtomicBool,
    }

    impl MockPlatform {
        pub const fn new() -> Self {
            Self {
                next_space: AtomicU64::new(1),
                next_stack: AtomicU64::new(1),
                next_file: AtomicU32::new(1),
                next_inode: AtomicU64::new(1),
                switch_count: AtomicU64::new(0),
                fail_map_copy: core::sync::atomic::AtomicBool::new(false),
                fail_kstack: core::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    impl Default for MockPlatform {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Platform for MockPlatform {
        fn map_copy(&self, _parent: AddressSpaceId) -> KernelResult<AddressSpaceId> {
            if self.fail_map_copy.load(Ordering::Relaxed) {
                return Err(crate::error::KernelError::AddressSpaceFailure);
            }
            Ok(AddressSpaceId(self.next_space.fetch_add(1, Ordering::Relaxed)))
        }
        fn map_grow(&self, _space: AddressSpaceId, pages: usize) -> KernelResult<usize> {
            Ok(pages * crate::config::PAGE_SIZE)
        }
        fn map_shrink(&self, _space: AddressSpaceId, _pages: usize) {}
        fn map_destroy(&self, _space: AddressSpaceId) {}
        fn map_activate_user(&self, _space: AddressSpaceId) {}
        fn map_activate_kernel(&self) {}
        fn kstack_alloc(&self) -> KernelResult<KernelStackId> {
            if self.fail_kstack.load(Ordering::Relaxed) {
                return Err(crate::error::KernelError::StackAllocFailure);
            }
            Ok(KernelStackId(self.next_stack.fetch_add(1, Ordering::Relaxed)))
        }
        fn kstack_free(&self, _stack: KernelStackId) {}
        fn file_dup(&self, file: FileId) -> FileId {
            let _ = file;
            FileId(self.next_file.fetch_add(1, Ordering::Relaxed))
        }
        fn file_close(&self, _file: FileId) {}
        fn inode_dup(&self, inode: InodeId) -> InodeId {
            let _ = inode;
            InodeId(self.next_inode.fetch_add(1, Ordering::Relaxed))
        }
        fn inode_put(&self, _inode: InodeId) {}
        fn log_begin(&self) {}
        fn log_end(&self) {}
        fn ctx_switch(&self, _from: &mut Context, _to: &Context) {
            self.switch_count.fetch_add(1, Ordering::Relaxed);
        }
    }
}
