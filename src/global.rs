//! The allocator as a process-wide service.
//!
//! [`BestFit`] is a plain, single-threaded context. To stand in for the
//! system allocator it has to be shared, so [`BfAlloc`] wraps one context in
//! a single [`spin::Mutex`]. Both the best-fit search followed by the list
//! splice, and the bump followed by the header commit, happen under that one
//! lock.
//!
//! ```rust,ignore
//! use bfalloc::BfAlloc;
//!
//! #[global_allocator]
//! static ALLOCATOR: BfAlloc = BfAlloc::new();
//! ```
//!
//! A logger installed while `BfAlloc` is the global allocator must not
//! allocate from inside `log` calls: the allocator logs while holding its lock.

use std::{
    alloc::{GlobalAlloc, Layout},
    ptr::{self, NonNull},
};

use spin::Mutex;

use crate::{
    bestfit::{BestFit, HeapStats},
    config::Config,
};

/// A [`BestFit`] heap behind a lock, usable from a `static`.
pub struct BfAlloc {
    heap: Mutex<BestFit>,
}

impl BfAlloc {
    pub const fn new() -> Self {
        Self::with_config(Config::new())
    }

    pub const fn with_config(config: Config) -> Self {
        Self {
            heap: Mutex::new(BestFit::with_config(config)),
        }
    }

    /// Runs `f` with exclusive access to the heap.
    ///
    /// `f` must not allocate through this same allocator, the lock is not
    /// reentrant.
    pub fn with_heap<R>(&self, f: impl FnOnce(&mut BestFit) -> R) -> R {
        f(&mut *self.heap.lock())
    }

    pub fn stats(&self) -> HeapStats {
        self.with_heap(|heap| heap.stats())
    }
}

impl Default for BfAlloc {
    fn default() -> Self {
        Self::new()
    }
}

fn into_raw(ptr: Option<NonNull<u8>>) -> *mut u8 {
    ptr.map_or(ptr::null_mut(), NonNull::as_ptr)
}

unsafe impl GlobalAlloc for BfAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        // A null return means failure here, so zero sized layouts still get
        // a real block.
        into_raw(self.heap.lock().allocate_aligned(layout.size().max(1), layout.align()))
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        unsafe { self.heap.lock().deallocate(NonNull::new(ptr)) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        into_raw(self.heap.lock().zero_allocate_aligned(layout.size().max(1), layout.align()))
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let mut heap = self.heap.lock();

        unsafe { into_raw(heap.resize_aligned(NonNull::new(ptr), new_size.max(1), layout.align())) }
    }
}

/// The crate's own process-wide heap, used by the free functions below.
static HEAP: BfAlloc = BfAlloc::new();

/// [`BestFit::allocate`] on the process-wide heap.
pub fn allocate(size: usize) -> Option<NonNull<u8>> {
    HEAP.with_heap(|heap| heap.allocate(size))
}

/// [`BestFit::deallocate`] on the process-wide heap.
///
/// # Safety
///
/// `ptr` must be `None` or a live block returned by one of the free functions
/// of this module.
pub unsafe fn deallocate(ptr: Option<NonNull<u8>>) {
    HEAP.with_heap(|heap| unsafe { heap.deallocate(ptr) })
}

/// [`BestFit::zero_allocate`] on the process-wide heap.
pub fn zero_allocate(count: usize, element_size: usize) -> Option<NonNull<u8>> {
    HEAP.with_heap(|heap| heap.zero_allocate(count, element_size))
}

/// [`BestFit::resize`] on the process-wide heap.
///
/// # Safety
///
/// Same contract as [`deallocate`].
pub unsafe fn resize(ptr: Option<NonNull<u8>>, new_size: usize) -> Option<NonNull<u8>> {
    HEAP.with_heap(|heap| unsafe { heap.resize(ptr, new_size) })
}

/// Bookkeeping of the process-wide heap.
pub fn stats() -> HeapStats {
    HEAP.stats()
}
