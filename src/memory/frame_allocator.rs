use x86_64::{
    structures::paging::{FrameAllocator, FrameDeallocator, PhysFrame, Size4KiB},
    PhysAddr,
};

/// How many freed frames `free_frame` can hold before it starts leaking
/// them. Fixed-capacity so the allocator never needs the heap — it has to
/// work before `allocator::init_heap` has run.
const MAX_FREED_FRAMES: usize = 1024;

/// A bump allocator for physical memory frames, with a small fixed-size
/// free list layered on top so `munmap`/process-exit can give frames back.
/// Frames are only reused from the free list (LIFO); the bump pointer
/// itself never moves backwards.
pub struct BumpFrameAllocator {
    next_free_frame: PhysFrame,
    current_limit: PhysFrame,
    freed: [Option<PhysFrame>; MAX_FREED_FRAMES],
    freed_len: usize,
}

impl BumpFrameAllocator {
    /// Create a new Empty BumpFrameAllocator.
    pub fn new() -> Self {
        BumpFrameAllocator {
            next_free_frame: PhysFrame::containing_address(PhysAddr::new(0)),
            current_limit: PhysFrame::containing_address(PhysAddr::new(0)),
            freed: [None; MAX_FREED_FRAMES],
            freed_len: 0,
        }
    }

    /// Initialize the allocator with a start and end physical address.
    /// In a fully featured OS, this parses the multiboot memory map.
    pub unsafe fn init(&mut self, start: PhysAddr, end: PhysAddr) {
        self.next_free_frame = PhysFrame::containing_address(start);
        self.current_limit = PhysFrame::containing_address(end);
    }

    /// Give a frame back to the allocator. Returns `false` (and leaks the
    /// frame) if the free list is already full — a fixed ceiling rather
    /// than growing, to keep this allocator usable before the heap exists.
    pub fn free_frame(&mut self, frame: PhysFrame) -> bool {
        if self.freed_len >= MAX_FREED_FRAMES {
            return false;
        }
        self.freed[self.freed_len] = Some(frame);
        self.freed_len += 1;
        true
    }
}

unsafe impl FrameAllocator<Size4KiB> for BumpFrameAllocator {
    fn allocate_frame(&mut self) -> Option<PhysFrame> {
        if self.freed_len > 0 {
            self.freed_len -= 1;
            return self.freed[self.freed_len].take();
        }
        if self.next_free_frame <= self.current_limit {
            let frame = self.next_free_frame;
            self.next_free_frame += 1;
            Some(frame)
        } else {
            None
        }
    }
}

unsafe impl FrameDeallocator<Size4KiB> for BumpFrameAllocator {
    unsafe fn deallocate_frame(&mut self, frame: PhysFrame) {
        self.free_frame(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_free_is_reused_before_bumping_further() {
        let mut a = BumpFrameAllocator::new();
        unsafe { a.init(PhysAddr::new(0), PhysAddr::new(4096 * 8)) };
        let f0 = a.allocate_frame().unwrap();
        let f1 = a.allocate_frame().unwrap();
        assert!(a.free_frame(f0));
        let reused = a.allocate_frame().unwrap();
        assert_eq!(reused, f0);
        assert_ne!(f1, f0);
    }

    #[test]
    fn free_list_full_reports_failure_instead_of_panicking() {
        let mut a = BumpFrameAllocator::new();
        unsafe { a.init(PhysAddr::new(0), PhysAddr::new(4096 * (MAX_FREED_FRAMES as u64 + 4))) };
        let frames: alloc::vec::Vec<PhysFrame> = (0..MAX_FREED_FRAMES + 1).map(|_| a.allocate_frame().unwrap()).collect();
        for f in &frames[..MAX_FREED_FRAMES] {
            assert!(a.free_frame(*f));
        }
        assert!(!a.free_frame(frames[MAX_FREED_FRAMES]));
    }
}
