//! Syscall-shaped wrappers: the external interface table from spec §6.
//!
//! `Kernel`'s own methods already carry the right argument shapes; this
//! module only flattens `KernelResult` to the `-1`-on-failure convention
//! the syscall boundary uses, matching the original C entry points.

use crate::platform::Platform;
use crate::Kernel;

pub fn fork<P: Platform>(kernel: &Kernel<P>, caller: usize) -> i64 {
    kernel.fork(caller).map(|pid| pid as i64).unwrap_or(-1)
}

/// Never returns to the caller on success; a real kernel transfers
/// control to the scheduler before this could resume. The `unreachable!`
/// stands in for the original's `panic("zombie exit")` guard.
pub fn exit<P: Platform>(kernel: &Kernel<P>, caller: usize) -> ! {
    kernel.exit(caller);
    unreachable!("exit: a zombie task must never be dispatched again");
}

pub fn wait<P: Platform>(kernel: &Kernel<P>, caller: usize) -> i64 {
    kernel.wait(caller).map(|pid| pid as i64).unwrap_or(-1)
}

pub fn kill<P: Platform>(kernel: &Kernel<P>, pid: u64) -> i64 {
    kernel.kill(pid).map(|_| 0).unwrap_or(-1)
}

pub fn yield_now<P: Platform>(kernel: &Kernel<P>, caller: usize) -> i64 {
    kernel.yield_now(caller);
    0
}

pub fn get_level<P: Platform>(kernel: &Kernel<P>, caller: usize) -> i64 {
    kernel.get_level(caller) as i64
}

pub fn set_cpu_share<P: Platform>(kernel: &Kernel<P>, caller: usize, share: i32) -> i64 {
    kernel.set_cpu_share(caller, share).map(|s| s as i64).unwrap_or(-1)
}

pub fn thread_create<P: Platform>(
    kernel: &Kernel<P>,
    caller: usize,
    entry: usize,
    arg: u64,
    out_tid: &mut u64,
) -> i64 {
    match kernel.thread_create(caller, entry, arg) {
        Ok(tid) => {
            *out_tid = tid;
            0
        }
        Err(_) => -1,
    }
}

pub fn thread_exit<P: Platform>(kernel: &Kernel<P>, caller: usize, retval: u64) {
    kernel.thread_exit(caller, retval);
}

pub fn thread_join<P: Platform>(
    kernel: &Kernel<P>,
    caller: usize,
    tid: u64,
    out_retval: &mut u64,
) -> i64 {
    match kernel.thread_join(caller, tid) {
        Ok((pid, retval)) => {
            *out_retval = retval;
            pid as i64
        }
        Err(_) => -1,
    }
}
