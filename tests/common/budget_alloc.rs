use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Allocation totals observed while a [`CountingAlloc`] was armed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocStats {
    pub allocations: usize,
    pub bytes: usize,
}

/// Global allocator that counts allocations only between `arm` and
/// `disarm`, so fixture setup does not pollute a measurement.
pub struct CountingAlloc {
    armed: AtomicBool,
    allocations: AtomicUsize,
    bytes: AtomicUsize,
}

impl CountingAlloc {
    pub const fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
            allocations: AtomicUsize::new(0),
            bytes: AtomicUsize::new(0),
        }
    }

    pub fn arm(&self) {
        self.allocations.store(0, Ordering::SeqCst);
        self.bytes.store(0, Ordering::SeqCst);
        self.armed.store(true, Ordering::SeqCst);
    }

    pub fn disarm(&self) -> AllocStats {
        self.armed.store(false, Ordering::SeqCst);
        AllocStats {
            allocations: self.allocations.load(Ordering::SeqCst),
            bytes: self.bytes.load(Ordering::SeqCst),
        }
    }

    /// Run `f` with counting enabled.
    pub fn measure<R>(&self, f: impl FnOnce() -> R) -> (R, AllocStats) {
        self.arm();
        let out = f();
        (out, self.disarm())
    }

    fn record(&self, bytes: usize) {
        if self.armed.load(Ordering::Relaxed) {
            self.allocations.fetch_add(1, Ordering::SeqCst);
            self.bytes.fetch_add(bytes, Ordering::SeqCst);
        }
    }
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            self.record(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc_zeroed(layout) };
        if !ptr.is_null() {
            self.record(layout.size());
        }
        ptr
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { System.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            self.record(new_size.saturating_sub(layout.size()));
        }
        new_ptr
    }
}
