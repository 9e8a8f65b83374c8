//! Per-process virtual memory bookkeeping: the `[code, data, heap, stack]`
//! user ranges a `Process` owns, range validation, and the user/kernel
//! copy helpers that route through a fixed scratch buffer instead of
//! dereferencing user pointers directly.
//!
//! The teacher's `memory::paging` builds one shared level-4 table for the
//! whole kernel; `AddressSpace` is the per-`Process` companion that tracks
//! which parts of that address space are actually the process's own, so
//! syscalls can reject a pointer that wanders outside them.

use crate::syscalls::errno;

/// Default size of the scratch buffer `copy_to_user`/`copy_from_user`
/// stage bytes through, per spec.
pub const COPY_SCRATCH_LEN: usize = 256;

/// A cap on how far `brk` can grow a process's heap before it's treated
/// as an allocation failure rather than silently growing forever.
pub const MAX_HEAP_SIZE: u64 = 16 * 1024 * 1024;

/// One contiguous user-space region: `[start, end)`, plus whether it's
/// writable (code segments generally aren't).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange {
    pub start: u64,
    pub end: u64,
    pub writable: bool,
}

impl MemoryRange {
    pub const fn empty() -> Self {
        MemoryRange { start: 0, end: 0, writable: false }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `[addr, addr+len)` fits entirely inside this range.
    pub fn contains(&self, addr: u64, len: u64) -> bool {
        if len == 0 || self.is_empty() {
            return false;
        }
        match addr.checked_add(len) {
            Some(end) => addr >= self.start && end <= self.end,
            None => false,
        }
    }
}

/// A process's virtual memory layout: the root page table plus its four
/// named user ranges. `validate_user_range` is the gate every syscall that
/// touches a user pointer goes through before trusting it.
#[derive(Debug, Clone, Copy)]
pub struct AddressSpace {
    /// Physical address of this process's level-4 page table (mirrors
    /// `Process::page_table`, kept here too so VM code has one place to
    /// look instead of reaching back into the scheduler).
    pub page_table: u64,
    pub code: MemoryRange,
    pub data: MemoryRange,
    pub heap: MemoryRange,
    pub stack: MemoryRange,
}

impl Default for AddressSpace {
    fn default() -> Self {
        AddressSpace {
            page_table: 0,
            code: MemoryRange::empty(),
            data: MemoryRange::empty(),
            heap: MemoryRange::empty(),
            stack: MemoryRange::empty(),
        }
    }
}

impl AddressSpace {
    /// Reject a user range that falls outside every known segment, or
    /// that asks to write into a read-only one. `EFAULT` either way, per
    /// §4.J — the caller doesn't get to distinguish "out of range" from
    /// "wrong permission".
    pub fn validate_user_range(&self, addr: u64, size: u64, write: bool) -> Result<(), i32> {
        for range in [&self.code, &self.data, &self.heap, &self.stack] {
            if range.contains(addr, size) {
                if write && !range.writable {
                    return Err(errno::EFAULT);
                }
                return Ok(());
            }
        }
        Err(errno::EFAULT)
    }

    /// Grow or query the heap, mimicking POSIX `brk`: `new_brk == 0` just
    /// reports the current break. The first nonzero call establishes
    /// `heap.start` at that address. No physical frames are actually
    /// mapped here — that's left to a future demand-paging fault handler,
    /// consistent with this crate not yet doing paged swap.
    pub fn brk(&mut self, new_brk: u64) -> Result<u64, i32> {
        if new_brk == 0 {
            return Ok(self.heap.end);
        }
        if self.heap.is_empty() {
            self.heap = MemoryRange { start: new_brk, end: new_brk, writable: true };
            return Ok(self.heap.end);
        }
        if new_brk < self.heap.start || new_brk > self.heap.start + MAX_HEAP_SIZE {
            return Err(errno::ENOMEM);
        }
        self.heap.end = new_brk;
        Ok(self.heap.end)
    }
}

/// Copy `len` bytes from `user_addr` (validated against `space`) into
/// `out`, via a fixed-size kernel scratch buffer rather than one big
/// direct read — bounds the worst-case stack usage to `COPY_SCRATCH_LEN`
/// regardless of how large a syscall's buffer argument claims to be.
pub fn copy_from_user(space: &AddressSpace, user_addr: u64, len: usize, out: &mut [u8]) -> Result<(), i32> {
    if len > out.len() {
        return Err(errno::EINVAL);
    }
    space.validate_user_range(user_addr, len as u64, false)?;

    let mut scratch = [0u8; COPY_SCRATCH_LEN];
    let mut done = 0usize;
    while done < len {
        let chunk = (len - done).min(COPY_SCRATCH_LEN);
        // SAFETY: `validate_user_range` above already confirmed
        // `[user_addr, user_addr+len)` lies inside one of this process's
        // mapped, readable ranges.
        unsafe {
            core::ptr::copy_nonoverlapping((user_addr as usize + done) as *const u8, scratch.as_mut_ptr(), chunk);
        }
        out[done..done + chunk].copy_from_slice(&scratch[..chunk]);
        done += chunk;
    }
    Ok(())
}

/// The inverse of `copy_from_user`: stage `src` through the scratch
/// buffer and write it into `user_addr`, which must be a writable range.
pub fn copy_to_user(space: &AddressSpace, user_addr: u64, src: &[u8]) -> Result<(), i32> {
    space.validate_user_range(user_addr, src.len() as u64, true)?;

    let mut done = 0usize;
    while done < src.len() {
        let chunk = (src.len() - done).min(COPY_SCRATCH_LEN);
        let mut scratch = [0u8; COPY_SCRATCH_LEN];
        scratch[..chunk].copy_from_slice(&src[done..done + chunk]);
        // SAFETY: see `copy_from_user`; `validate_user_range` confirmed
        // the destination is inside a writable range.
        unsafe {
            core::ptr::copy_nonoverlapping(scratch.as_ptr(), (user_addr as usize + done) as *mut u8, chunk);
        }
        done += chunk;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_space() -> AddressSpace {
        AddressSpace {
            page_table: 0,
            code: MemoryRange { start: 0x1000, end: 0x2000, writable: false },
            data: MemoryRange { start: 0x2000, end: 0x3000, writable: true },
            heap: MemoryRange::empty(),
            stack: MemoryRange { start: 0x7000_0000, end: 0x7000_4000, writable: true },
        }
    }

    #[test]
    fn range_outside_every_segment_is_rejected() {
        let space = sample_space();
        assert_eq!(space.validate_user_range(0x9999, 8, false), Err(errno::EFAULT));
    }

    #[test]
    fn write_to_code_segment_is_rejected() {
        let space = sample_space();
        assert_eq!(space.validate_user_range(0x1000, 16, true), Err(errno::EFAULT));
    }

    #[test]
    fn read_from_code_segment_is_allowed() {
        let space = sample_space();
        assert_eq!(space.validate_user_range(0x1000, 16, false), Ok(()));
    }

    #[test]
    fn write_into_data_segment_is_allowed() {
        let space = sample_space();
        assert_eq!(space.validate_user_range(0x2100, 64, true), Ok(()));
    }

    #[test]
    fn range_spanning_past_segment_end_is_rejected() {
        let space = sample_space();
        assert_eq!(space.validate_user_range(0x1F00, 0x200, false), Err(errno::EFAULT));
    }

    #[test]
    fn first_brk_call_establishes_heap_base() {
        let mut space = sample_space();
        assert_eq!(space.brk(0x4000).unwrap(), 0x4000);
        assert_eq!(space.heap.start, 0x4000);
    }

    #[test]
    fn brk_query_with_zero_reports_current_break_without_mutating() {
        let mut space = sample_space();
        space.brk(0x4000).unwrap();
        space.brk(0x4500).unwrap();
        assert_eq!(space.brk(0).unwrap(), 0x4500);
        assert_eq!(space.heap.end, 0x4500);
    }

    #[test]
    fn brk_past_the_heap_cap_is_rejected() {
        let mut space = sample_space();
        space.brk(0x4000).unwrap();
        assert_eq!(space.brk(0x4000 + MAX_HEAP_SIZE + 1), Err(errno::ENOMEM));
    }

    #[test]
    fn copy_round_trips_across_the_scratch_buffer_in_multiple_chunks() {
        let space = sample_space();
        let payload: alloc::vec::Vec<u8> = (0..600u32).map(|i| (i % 251) as u8).collect();

        // Fake "user memory": just a kernel-owned buffer, valid because
        // the unit tests run on the host where there is no real MMU — the
        // range check is exercised against `space`'s ranges, the actual
        // copy targets the buffer's address directly.
        let mut user_buf = alloc::vec![0u8; 600];
        let mut data_space = space;
        data_space.data = MemoryRange { start: user_buf.as_ptr() as u64, end: user_buf.as_ptr() as u64 + 600, writable: true };

        copy_to_user(&data_space, user_buf.as_ptr() as u64, &payload).unwrap();
        let mut out = alloc::vec![0u8; 600];
        copy_from_user(&data_space, user_buf.as_ptr() as u64, 600, &mut out).unwrap();
        assert_eq!(out, payload);
    }
}
