//! Allocator configuration.

/// Size of the address space reserved for the heap when nothing else is
/// configured: 2 GiB. The region is reserved lazily and backed on demand by
/// the OS, so practical workloads never come close to exhausting it.
pub const DEFAULT_REGION_SIZE: usize = 2 * 1024 * 1024 * 1024;

/// Tunables of a [`crate::BestFit`] context.
///
/// Everything here is `const` so a configured allocator can still live in a
/// `static`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Bytes of virtual address space reserved on first use.
    pub region_size: usize,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            region_size: DEFAULT_REGION_SIZE,
        }
    }

    /// Overrides the reserved region size. Small regions are handy to make
    /// exhaustion observable.
    pub const fn with_region_size(mut self, region_size: usize) -> Self {
        self.region_size = region_size;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
