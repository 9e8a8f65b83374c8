//! A 256-slot syscall table indexed by number, per §4.K — built alongside
//! the teacher's original `dispatch()` rather than replacing it. Several
//! handlers here delegate straight into that `dispatch()` (it already
//! implements the console/pipe I/O paths this table shouldn't duplicate);
//! the rest cover syscalls the legacy numbering never had
//! (`GETPPID`/`KILL`/`BRK`) or renumbers to match §4.K's table.
//!
//! Slots with no registered handler — `EXEC`, `LSEEK`/`STAT`/`UNLINK`/`LIST`,
//! `MMAP`/`MUNMAP`/`MPROTECT`, `SIGNAL`, `TIME`/`SLEEP`/`NANOSLEEP` — return
//! `-ENOSYS` by the same path an unknown number would, since their backing
//! (VFS metadata, demand paging, signal delivery, a real clock source)
//! doesn't exist yet. See DESIGN.md.

use super::errno;
use crate::scheduler;

pub const SYS_FORK: u64 = 1;
pub const SYS_EXEC: u64 = 2;
pub const SYS_EXIT: u64 = 3;
pub const SYS_WAIT: u64 = 4;
pub const SYS_GETPID: u64 = 5;
pub const SYS_GETPPID: u64 = 6;
pub const SYS_KILL: u64 = 7;
pub const SYS_OPEN: u64 = 10;
pub const SYS_CLOSE: u64 = 11;
pub const SYS_READ: u64 = 12;
pub const SYS_WRITE: u64 = 13;
pub const SYS_BRK: u64 = 20;
pub const SYS_PIPE: u64 = 30;
pub const SYS_DUP: u64 = 31;
pub const SYS_DUP2: u64 = 32;

const TABLE_SIZE: usize = 256;

pub type SyscallHandler = fn(u64, u64, u64, u64, u64, u64) -> i64;

/// Looks up a handler by number and invokes it; an empty slot reports
/// `-ENOSYS` instead of panicking, matching a real kernel's syscall ABI.
pub struct Dispatcher {
    table: [Option<SyscallHandler>; TABLE_SIZE],
}

impl Dispatcher {
    pub const fn empty() -> Self {
        Dispatcher { table: [None; TABLE_SIZE] }
    }

    pub fn register(&mut self, number: u64, handler: SyscallHandler) {
        self.table[number as usize] = Some(handler);
    }

    pub fn dispatch(&self, number: u64, a0: u64, a1: u64, a2: u64, a3: u64, a4: u64, a5: u64) -> i64 {
        match self.table.get(number as usize).copied().flatten() {
            Some(handler) => handler(a0, a1, a2, a3, a4, a5),
            None => -(errno::ENOSYS as i64),
        }
    }
}

/// Build the table with every syscall this kernel can currently back.
pub fn build() -> Dispatcher {
    let mut d = Dispatcher::empty();
    d.register(SYS_FORK, h_fork);
    d.register(SYS_EXIT, h_exit);
    d.register(SYS_WAIT, h_wait);
    d.register(SYS_GETPID, h_getpid);
    d.register(SYS_GETPPID, h_getppid);
    d.register(SYS_KILL, h_kill);
    d.register(SYS_OPEN, h_open);
    d.register(SYS_CLOSE, h_close);
    d.register(SYS_READ, h_read);
    d.register(SYS_WRITE, h_write);
    d.register(SYS_BRK, h_brk);
    d.register(SYS_PIPE, h_pipe);
    d.register(SYS_DUP, h_dup);
    d.register(SYS_DUP2, h_dup2);
    d
}

fn h_fork(_a0: u64, _a1: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64) -> i64 {
    let pid = scheduler::sys_fork();
    if pid == u64::MAX { -(errno::EAGAIN as i64) } else { pid as i64 }
}

fn h_exit(code: u64, _a1: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64) -> i64 {
    scheduler::exit_current(code);
    0
}

fn h_wait(target_pid: u64, _a1: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64) -> i64 {
    let status = scheduler::sys_wait(target_pid);
    if status == u64::MAX { -(errno::ECHILD as i64) } else { status as i64 }
}

fn h_getpid(_a0: u64, _a1: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64) -> i64 {
    super::sys_getpid() as i64
}

fn h_getppid(_a0: u64, _a1: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64) -> i64 {
    scheduler::sys_getppid() as i64
}

fn h_kill(target_pid: u64, _a1: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64) -> i64 {
    if scheduler::sys_kill(target_pid) { 0 } else { -(errno::ESRCH as i64) }
}

fn h_open(path_ptr: u64, len: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64) -> i64 {
    let r = super::dispatch(super::SYS_OPEN, path_ptr, len, 0);
    if r == u64::MAX { -(errno::EFAULT as i64) } else { r as i64 }
}

fn h_close(fd: u64, _a1: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64) -> i64 {
    let r = super::dispatch(super::SYS_CLOSE, fd, 0, 0);
    if r == u64::MAX { -(errno::EBADF as i64) } else { r as i64 }
}

fn h_read(fd: u64, ptr: u64, len: u64, _a3: u64, _a4: u64, _a5: u64) -> i64 {
    let r = super::dispatch(super::SYS_READ, fd, ptr, len);
    if r == u64::MAX { -(errno::EBADF as i64) } else { r as i64 }
}

fn h_write(fd: u64, ptr: u64, len: u64, _a3: u64, _a4: u64, _a5: u64) -> i64 {
    let r = super::dispatch(super::SYS_WRITE, fd, ptr, len);
    if r == u64::MAX { -(errno::EBADF as i64) } else { r as i64 }
}

fn h_pipe(fds_ptr: u64, _a1: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64) -> i64 {
    super::dispatch(super::SYS_PIPE, fds_ptr, 0, 0) as i64
}

fn h_dup(old_fd: u64, _a1: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64) -> i64 {
    let r = super::dispatch(super::SYS_DUP, old_fd, 0, 0);
    if r == u64::MAX { -(errno::EBADF as i64) } else { r as i64 }
}

fn h_dup2(old_fd: u64, new_fd: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64) -> i64 {
    let r = super::dispatch(super::SYS_DUP2, old_fd, new_fd, 0);
    if r == u64::MAX { -(errno::EBADF as i64) } else { r as i64 }
}

fn h_brk(new_brk: u64, _a1: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64) -> i64 {
    let mut sched = scheduler::SCHEDULER.lock();
    let current = match sched.current.as_mut() {
        Some(p) => p,
        None => return -(errno::ESRCH as i64),
    };
    match current.memory.brk(new_brk) {
        Ok(end) => end as i64,
        Err(e) => -(e as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_a0: u64, _a1: u64, _a2: u64, _a3: u64, _a4: u64, _a5: u64) -> i64 {
        42
    }

    #[test]
    fn registered_slot_invokes_its_handler() {
        let mut d = Dispatcher::empty();
        d.register(99, noop);
        assert_eq!(d.dispatch(99, 0, 0, 0, 0, 0, 0), 42);
    }

    #[test]
    fn empty_slot_returns_negated_enosys() {
        let d = Dispatcher::empty();
        assert_eq!(d.dispatch(200, 0, 0, 0, 0, 0, 0), -(errno::ENOSYS as i64));
    }

    #[test]
    fn build_registers_every_advertised_syscall_number() {
        let d = build();
        for n in [
            SYS_FORK, SYS_EXIT, SYS_WAIT, SYS_GETPID, SYS_GETPPID, SYS_KILL, SYS_OPEN, SYS_CLOSE, SYS_READ, SYS_WRITE,
            SYS_BRK, SYS_PIPE, SYS_DUP, SYS_DUP2,
        ] {
            assert!(d.table[n as usize].is_some(), "syscall {n} should be registered");
        }
    }

    #[test]
    fn exec_slot_is_deliberately_unregistered() {
        let d = build();
        assert_eq!(d.dispatch(SYS_EXEC, 0, 0, 0, 0, 0, 0), -(errno::ENOSYS as i64));
    }
}
