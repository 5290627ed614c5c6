use std::ptr::{self, NonNull};

use crate::{
    block::{self, BLOCK_ALIGN, Block, HEADER_SIZE},
    config::Config,
    error::{AllocError, CorruptionError, ListKind, fatal},
    freelist::FreeList,
    list::{List, Node},
    region::Region,
};

/// A best-fit heap allocator context.
///
/// The context owns one reserved [`Region`] of address space and two lists
/// partitioning every block ever carved out of it:
///
/// ```text
///                  +---------------------------------------------+
///                  |                  BestFit                    |
///                  |                                             |
///                  |   region: start .. next_free .. end         |
///                  |   free_list ------+     allocated ---+      |
///                  +-------------------|------------------|------+
///                                      |                  |
///   +--------+------+--------+------+--v-----+------+-----v--+------+
///   | Header | used | Header | free | Header | free | Header | used | ...
///   +--------+------+--------+------+--------+------+--------+------+
/// ```
///
/// * `allocate` takes the best fitting block from the free list, or bumps a
///   new one out of the region when none fits.
/// * `deallocate` moves the block back to the head of the free list.
///   Adjacent free blocks are **not** coalesced and blocks are never split,
///   so a block keeps the size it was created with forever. Long running
///   workloads with varying sizes will fragment.
///
/// The region is reserved lazily on the first call, so building a context is
/// free and can happen in a `const` context.
///
/// A `BestFit` has no internal locking. See [`crate::BfAlloc`] for the
/// process-wide, locked instance.
pub struct BestFit {
    config: Config,
    /// Reserved address space, `None` until the first operation.
    region: Option<Region>,
    /// Blocks available for reuse.
    free_list: FreeList,
    /// Blocks currently handed out.
    allocated: List<Block>,
}

// The context exclusively owns its region and every header inside it; the raw
// pointers are never shared with another context.
unsafe impl Send for BestFit {}

/// A block as seen by the diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Payload address, as handed to the caller.
    pub addr: NonNull<u8>,
    /// Usable size recorded in the header.
    pub size: usize,
}

/// Snapshot of the heap's bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Blocks on the allocated list.
    pub allocated_blocks: usize,
    /// Payload bytes of those blocks.
    pub allocated_bytes: usize,
    /// Blocks on the free list.
    pub free_blocks: usize,
    /// Payload bytes of those blocks.
    pub free_bytes: usize,
    /// Bytes consumed by the bump pointer, headers and padding included.
    pub used_bytes: usize,
    /// Size of the reserved region. Zero until the first operation.
    pub reserved_bytes: usize,
}

impl BestFit {
    /// A context with the default [`Config`].
    pub const fn new() -> Self {
        Self::with_config(Config::new())
    }

    pub const fn with_config(config: Config) -> Self {
        Self {
            config,
            region: None,
            free_list: FreeList::new(),
            allocated: List::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Reserves the heap region on first use. Failing to do so is fatal: the
    /// allocator can't do anything without it.
    fn ensure_initialized(&mut self) -> &mut Region {
        let size = self.config.region_size;

        self.region.get_or_insert_with(|| match Region::reserve(size) {
            Ok(region) => region,
            Err(err) => fatal(err),
        })
    }

    /// Returns a block of at least `size` usable bytes, or `None` when the
    /// request is for zero bytes or the heap is exhausted.
    ///
    /// The payload is aligned to [`BLOCK_ALIGN`] and its contents are
    /// unspecified.
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.allocate_aligned(size, BLOCK_ALIGN)
    }

    /// Like [`allocate`](Self::allocate), with the payload aligned to `align`
    /// bytes. `align` must be a power of two. Alignments up to
    /// [`BLOCK_ALIGN`] cost nothing extra; larger ones only reuse free blocks
    /// that happen to be aligned enough, and bump new blocks past a gap that
    /// is never handed out.
    pub fn allocate_aligned(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        match self.try_allocate(size, align) {
            Ok(ptr) => Some(ptr),
            Err(AllocError::ZeroSized) => None,
            Err(err) => {
                log::warn!("[bfalloc] allocate({size}, align {align}) failed: {err}");
                None
            }
        }
    }

    fn try_allocate(&mut self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        self.ensure_initialized();

        if size == 0 {
            return Err(AllocError::ZeroSized);
        }

        if !align.is_power_of_two() {
            return Err(AllocError::UnsupportedAlignment { align });
        }

        let best = match self.free_list.find_best_fit(size, align) {
            Ok(best) => best,
            Err(corruption) => fatal(corruption),
        };

        let header = match best {
            Some(mut header) => unsafe {
                self.free_list.remove_free_block(header);
                header.as_mut().data.allocated = true;
                self.allocated.push_front(header);

                log::trace!(
                    "[bfalloc] allocate({size}) -> reused block of {} at {:p}",
                    header.as_ref().data.size,
                    block::payload(header)
                );

                header
            },
            None => {
                let region = self.ensure_initialized();
                let addr = region.bump(size, align)?;

                let header = unsafe {
                    self.allocated.insert(
                        Block {
                            size,
                            allocated: true,
                        },
                        addr.cast(),
                    )
                };

                log::trace!("[bfalloc] allocate({size}) -> bumped {:p}", block::payload(header));

                header
            }
        };

        Ok(block::payload(header))
    }

    /// Returns the block at `ptr` to the free list. `None` is a no-op.
    ///
    /// Freeing a block twice, or a pointer this context never handed out, is
    /// fatal.
    ///
    /// # Safety
    ///
    /// `ptr` must be `None` or a payload address returned by this context.
    /// After this call the caller must not touch the block again.
    pub unsafe fn deallocate(&mut self, ptr: Option<NonNull<u8>>) {
        let Some(ptr) = ptr else {
            return;
        };

        let header = match self.live_header(ptr) {
            Ok(header) => header,
            Err(corruption) => fatal(corruption),
        };

        unsafe {
            self.allocated.remove(header);
            self.free_list.insert_free_block(header);

            log::trace!("[bfalloc] deallocate({ptr:p}) size={}", header.as_ref().data.size);
        }
    }

    /// Allocates room for `count` elements of `element_size` bytes each and
    /// zeroes all of it.
    ///
    /// The multiplication is checked: an overflowing request gets `None`
    /// instead of a block smaller than the caller believes.
    pub fn zero_allocate(&mut self, count: usize, element_size: usize) -> Option<NonNull<u8>> {
        let Some(size) = count.checked_mul(element_size) else {
            log::warn!("[bfalloc] {}", AllocError::Overflow { count, element_size });
            return None;
        };

        self.zero_allocate_aligned(size, BLOCK_ALIGN)
    }

    /// Allocates `size` zeroed bytes aligned to `align`.
    pub fn zero_allocate_aligned(&mut self, size: usize, align: usize) -> Option<NonNull<u8>> {
        let ptr = self.allocate_aligned(size, align)?;

        // Recycled blocks still hold whatever their previous owner wrote.
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, size) };

        Some(ptr)
    }

    /// Changes the size of the block at `ptr` to `new_size` bytes.
    ///
    /// * `ptr == None` behaves like [`allocate`](Self::allocate).
    /// * `new_size == 0` behaves like [`deallocate`](Self::deallocate) and
    ///   returns `None`.
    /// * When the block is already big enough `ptr` is returned untouched.
    ///   The block is not shrunk, it keeps its recorded size.
    /// * Otherwise a new block is allocated, the old contents are copied over
    ///   and the old block is freed. If that allocation fails the old block is
    ///   left as it was and `None` is returned.
    ///
    /// # Safety
    ///
    /// Same contract as [`deallocate`](Self::deallocate). When a different
    /// address is returned, `ptr` is no longer valid.
    pub unsafe fn resize(&mut self, ptr: Option<NonNull<u8>>, new_size: usize) -> Option<NonNull<u8>> {
        unsafe { self.resize_aligned(ptr, new_size, BLOCK_ALIGN) }
    }

    /// [`resize`](Self::resize) for a block allocated with `align`. A block
    /// that has to move is reallocated with the same alignment.
    ///
    /// # Safety
    ///
    /// Same contract as [`resize`](Self::resize), and `ptr` must be aligned
    /// to `align`.
    pub unsafe fn resize_aligned(
        &mut self,
        ptr: Option<NonNull<u8>>,
        new_size: usize,
        align: usize,
    ) -> Option<NonNull<u8>> {
        let Some(old) = ptr else {
            return self.allocate_aligned(new_size, align);
        };

        if new_size == 0 {
            unsafe { self.deallocate(Some(old)) };
            return None;
        }

        let old_size = match self.live_header(old) {
            Ok(header) => unsafe { header.as_ref().data.size },
            Err(corruption) => fatal(corruption),
        };

        if new_size <= old_size {
            log::trace!("[bfalloc] resize({old:p}, {new_size}) fits in {old_size}, kept in place");
            return Some(old);
        }

        let new = self.allocate_aligned(new_size, align)?;

        unsafe {
            ptr::copy_nonoverlapping(old.as_ptr(), new.as_ptr(), old_size.min(new_size));
            self.deallocate(Some(old));
        }

        log::trace!("[bfalloc] resize({old:p}, {new_size}) moved to {new:p}");

        Some(new)
    }

    /// Usable size recorded for the live block at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be a payload address returned by this context.
    pub unsafe fn block_size(&self, ptr: NonNull<u8>) -> Option<usize> {
        self.live_header(ptr)
            .ok()
            .map(|header| unsafe { header.as_ref().data.size })
    }

    /// Whether `ptr` points into the part of the region carved into blocks.
    pub fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.region
            .as_ref()
            .is_some_and(|region| region.contains(ptr.as_ptr() as usize))
    }

    /// Finds the header of a block that is currently allocated.
    fn live_header(&self, ptr: NonNull<u8>) -> Result<NonNull<Node<Block>>, CorruptionError> {
        let addr = ptr.as_ptr() as usize;

        let foreign = || CorruptionError::ForeignPointer { addr };

        let region = self.region.as_ref().ok_or_else(foreign)?;

        let header_addr = addr.checked_sub(HEADER_SIZE).ok_or_else(foreign)?;
        if !region.contains(header_addr) || header_addr % BLOCK_ALIGN != 0 {
            return Err(foreign());
        }

        let header = unsafe { block::header(ptr) };

        if unsafe { !header.as_ref().data.allocated } {
            return Err(CorruptionError::DoubleFree { addr });
        }

        Ok(header)
    }

    /// Blocks currently handed out, most recently allocated first.
    pub fn allocated_blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        self.allocated.iter().map(block_info)
    }

    /// Blocks waiting for reuse, most recently freed first.
    pub fn free_blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        self.free_list.items.iter().map(block_info)
    }

    pub fn stats(&self) -> HeapStats {
        let (allocated_blocks, allocated_bytes) = totals(self.allocated_blocks());
        let (free_blocks, free_bytes) = totals(self.free_blocks());

        let (used_bytes, reserved_bytes) = self
            .region
            .as_ref()
            .map_or((0, 0), |region| (region.next_free() - region.start(), region.size()));

        HeapStats {
            allocated_blocks,
            allocated_bytes,
            free_blocks,
            free_bytes,
            used_bytes,
            reserved_bytes,
        }
    }

    /// Walks both lists and checks every structural invariant of the heap:
    ///
    /// * links are symmetric, the head has no `prev` and the tail no `next`,
    /// * each header's `allocated` flag matches the list holding it,
    /// * every header lies in the used part of the region, on a block
    ///   boundary, and its payload ends below the bump pointer,
    /// * each list holds as many headers as it believes it does,
    /// * no two blocks, headers included, share a byte.
    ///
    /// The last check compares every pair of blocks, so this is quadratic in
    /// the number of blocks. It never allocates and may run under the lock of
    /// [`crate::BfAlloc::with_heap`].
    pub fn check_integrity(&self) -> Result<(), CorruptionError> {
        let Some(region) = self.region.as_ref() else {
            return Ok(());
        };

        check_list(region, &self.free_list.items, ListKind::Free)?;
        check_list(region, &self.allocated, ListKind::Allocated)?;

        check_disjoint(|| self.free_list.items.iter().chain(self.allocated.iter()))
    }
}

impl Default for BestFit {
    fn default() -> Self {
        Self::new()
    }
}

fn block_info(header: NonNull<Node<Block>>) -> BlockInfo {
    BlockInfo {
        addr: block::payload(header),
        size: unsafe { header.as_ref().data.size },
    }
}

fn totals(blocks: impl Iterator<Item = BlockInfo>) -> (usize, usize) {
    blocks.fold((0, 0), |(count, bytes), block| (count + 1, bytes + block.size))
}

fn check_list(region: &Region, list: &List<Block>, kind: ListKind) -> Result<(), CorruptionError> {
    let expect_allocated = kind == ListKind::Allocated;

    let mut prev = None;
    let mut counted = 0;
    let mut current = list.first();

    while let Some(node) = current {
        let addr = node.as_ptr() as usize;

        // More nodes than recorded: either a cycle or a stray link.
        if counted == list.len() {
            return Err(CorruptionError::LengthMismatch {
                list: kind,
                counted: counted + 1,
                expected: list.len(),
            });
        }

        if !region.contains(addr) || addr % BLOCK_ALIGN != 0 {
            return Err(CorruptionError::BrokenLink { list: kind, addr });
        }

        let header = unsafe { node.as_ref() };

        let end = (addr + HEADER_SIZE).checked_add(header.data.size);
        if end.is_none_or(|end| end > region.next_free()) || header.prev != prev {
            return Err(CorruptionError::BrokenLink { list: kind, addr });
        }

        if header.data.allocated != expect_allocated {
            return Err(CorruptionError::MembershipMismatch { list: kind, addr });
        }

        counted += 1;
        prev = Some(node);
        current = header.next;
    }

    if prev != list.last() {
        return Err(CorruptionError::BrokenLink {
            list: kind,
            addr: prev.map_or(0, |node| node.as_ptr() as usize),
        });
    }

    if counted != list.len() {
        return Err(CorruptionError::LengthMismatch {
            list: kind,
            counted,
            expected: list.len(),
        });
    }

    Ok(())
}

/// Header plus payload of every block must be pairwise disjoint. Both lists
/// were checked first, so every block lies inside the region and the sums
/// below cannot overflow.
fn check_disjoint<I>(blocks: impl Fn() -> I) -> Result<(), CorruptionError>
where
    I: Iterator<Item = NonNull<Node<Block>>>,
{
    let span = |node: NonNull<Node<Block>>| {
        let start = node.as_ptr() as usize;
        start..start + HEADER_SIZE + unsafe { node.as_ref().data.size }
    };

    for (i, a) in blocks().enumerate() {
        let first = span(a);

        for b in blocks().skip(i + 1) {
            let second = span(b);

            if first.start < second.end && second.start < first.end {
                return Err(CorruptionError::Overlap {
                    first: first.start.min(second.start),
                    second: first.start.max(second.start),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: Config = Config::new().with_region_size(64 * 1024);

    fn heap() -> BestFit {
        BestFit::with_config(SMALL)
    }

    fn addr(ptr: Option<NonNull<u8>>) -> usize {
        ptr.unwrap().as_ptr() as usize
    }

    unsafe fn fill(ptr: NonNull<u8>, len: usize, byte: u8) {
        unsafe { ptr::write_bytes(ptr.as_ptr(), byte, len) }
    }

    unsafe fn bytes<'a>(ptr: NonNull<u8>, len: usize) -> &'a [u8] {
        unsafe { std::slice::from_raw_parts(ptr.as_ptr(), len) }
    }

    #[test]
    fn region_is_reserved_lazily() {
        let mut heap = heap();
        assert_eq!(heap.stats().reserved_bytes, 0);

        assert!(heap.allocate(0).is_none());

        assert!(heap.stats().reserved_bytes >= SMALL.region_size);
        assert_eq!(heap.stats().used_bytes, 0);
    }

    #[test]
    fn zero_sized_request_has_no_side_effects() {
        let mut heap = heap();
        heap.allocate(8).unwrap();
        let before = heap.stats();

        assert!(heap.allocate(0).is_none());

        assert_eq!(heap.stats(), before);
    }

    #[test]
    fn sequential_allocations_are_increasing_aligned_and_disjoint() {
        let mut heap = heap();

        let x = addr(heap.allocate(24));
        let y = addr(heap.allocate(19));
        let z = addr(heap.allocate(32));

        assert!(x < y && y < z);
        assert!(x + 24 <= y && y + 19 <= z);

        let start = heap.region.as_ref().unwrap().start();
        for ptr in [x, y, z] {
            assert_eq!((ptr - start) % BLOCK_ALIGN, 0);
        }

        heap.check_integrity().unwrap();
    }

    #[test]
    fn freed_block_is_reused() {
        let mut heap = heap();

        let a = heap.allocate(24);
        let b = heap.allocate(19);
        let c = heap.allocate(32);

        unsafe { heap.deallocate(b) };
        let d = heap.allocate(10);

        assert_eq!(d, b);
        assert_ne!(d, a);
        assert_ne!(d, c);
        // The block keeps the size it was carved with.
        assert_eq!(unsafe { heap.block_size(d.unwrap()) }, Some(19));
        heap.check_integrity().unwrap();
    }

    #[test]
    fn best_fit_prefers_the_smallest_sufficient_block() {
        let mut heap = heap();

        let small = heap.allocate(16);
        let guard_1 = heap.allocate(8);
        let medium = heap.allocate(32);
        let guard_2 = heap.allocate(8);
        let large = heap.allocate(64);

        unsafe {
            heap.deallocate(medium);
            heap.deallocate(small);
            heap.deallocate(large);
        }

        assert_eq!(heap.allocate(12), small);
        assert_eq!(heap.allocate(20), medium);
        assert_eq!(heap.allocate(33), large);

        // Nothing left on the free list: the next request bumps.
        let bumped = heap.allocate(4);
        assert!(addr(bumped) > addr(large));

        assert!(guard_1.is_some() && guard_2.is_some());
    }

    #[test]
    fn most_recently_freed_block_wins_ties() {
        let mut heap = heap();

        let first = heap.allocate(32);
        let second = heap.allocate(32);

        unsafe {
            heap.deallocate(first);
            heap.deallocate(second);
        }

        assert_eq!(heap.allocate(32), second);
        assert_eq!(heap.allocate(32), first);
    }

    #[test]
    fn allocate_moves_block_between_lists() {
        let mut heap = heap();

        let a = heap.allocate(40);
        unsafe { heap.deallocate(a) };

        assert_eq!(heap.allocated_blocks().count(), 0);
        assert_eq!(
            heap.free_blocks().collect::<Vec<_>>(),
            vec![BlockInfo { addr: a.unwrap(), size: 40 }]
        );

        heap.allocate(40);

        assert_eq!(heap.free_blocks().count(), 0);
        assert_eq!(heap.allocated_blocks().next().map(|block| block.addr), a);
        heap.check_integrity().unwrap();
    }

    #[test]
    fn lists_are_ordered_most_recent_first() {
        let mut heap = heap();

        let blocks: Vec<_> = (1..=4).map(|size| heap.allocate(size * 8)).collect();

        let allocated: Vec<_> = heap.allocated_blocks().map(|block| Some(block.addr)).collect();
        assert_eq!(allocated, blocks.iter().rev().copied().collect::<Vec<_>>());

        unsafe {
            heap.deallocate(blocks[0]);
            heap.deallocate(blocks[2]);
        }

        let free: Vec<_> = heap.free_blocks().map(|block| Some(block.addr)).collect();
        assert_eq!(free, vec![blocks[2], blocks[0]]);
    }

    #[test]
    fn stats_track_both_lists() {
        let mut heap = heap();

        let a = heap.allocate(24);
        heap.allocate(19);
        unsafe { heap.deallocate(a) };

        let stats = heap.stats();

        assert_eq!(stats.allocated_blocks, 1);
        assert_eq!(stats.allocated_bytes, 19);
        assert_eq!(stats.free_blocks, 1);
        assert_eq!(stats.free_bytes, 24);
        // Second header starts on the boundary after the first block.
        assert_eq!(stats.used_bytes, crate::utils::align(HEADER_SIZE + 24, BLOCK_ALIGN) + HEADER_SIZE + 19);
    }

    #[test]
    fn deallocate_none_is_a_no_op() {
        let mut heap = heap();
        heap.allocate(8);
        let before = heap.stats();

        unsafe { heap.deallocate(None) };

        assert_eq!(heap.stats(), before);
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_is_fatal() {
        let mut heap = heap();
        let ptr = heap.allocate(24);

        unsafe {
            heap.deallocate(ptr);
            heap.deallocate(ptr);
        }
    }

    #[test]
    #[should_panic(expected = "was not handed out by this allocator")]
    fn foreign_pointer_is_fatal() {
        let mut heap = heap();
        heap.allocate(24);

        let mut local = [0u8; 64];
        unsafe { heap.deallocate(NonNull::new(local.as_mut_ptr().wrapping_add(HEADER_SIZE))) };
    }

    #[test]
    #[should_panic(expected = "was not handed out by this allocator")]
    fn freeing_on_an_untouched_heap_is_fatal() {
        let mut heap = heap();
        let mut local = 0u64;

        unsafe { heap.deallocate(Some(NonNull::from(&mut local).cast())) };
    }

    #[test]
    #[should_panic(expected = "could not reserve a heap region")]
    fn failed_reservation_is_fatal() {
        let mut heap = BestFit::with_config(Config::new().with_region_size(usize::MAX / 2));

        heap.allocate(8);
    }

    #[test]
    #[should_panic(expected = "found on the free list")]
    fn allocated_header_on_free_list_is_fatal() {
        let mut heap = heap();
        let ptr = heap.allocate(24);
        unsafe {
            heap.deallocate(ptr);
            block::header(ptr.unwrap()).as_mut().data.allocated = true;
        }

        heap.allocate(8);
    }

    #[test]
    fn exhaustion_fails_cleanly() {
        let mut heap = heap();
        let reserved = {
            heap.allocate(0);
            heap.stats().reserved_bytes
        };

        let a = heap.allocate(1024).unwrap();
        unsafe { fill(a, 1024, 0xAB) };
        let before = heap.stats();

        assert!(heap.allocate(reserved).is_none());

        // Nothing was committed by the failed request.
        assert_eq!(heap.stats(), before);
        assert_eq!(unsafe { bytes(a, 1024) }, &[0xAB; 1024][..]);
        heap.check_integrity().unwrap();

        // Freed memory is still reusable once the region is spent.
        unsafe { heap.deallocate(Some(a)) };
        assert_eq!(heap.allocate(512), Some(a));
    }

    #[test]
    fn bump_can_use_the_whole_region() {
        let mut heap = heap();
        heap.allocate(0);
        let reserved = heap.stats().reserved_bytes;

        let ptr = heap.allocate(reserved - HEADER_SIZE);

        assert!(ptr.is_some());
        assert!(heap.allocate(1).is_none());
    }

    #[test]
    fn zero_allocate_clears_recycled_memory() {
        let mut heap = heap();

        let dirty = heap.allocate(64).unwrap();
        unsafe {
            fill(dirty, 64, 0xFF);
            heap.deallocate(Some(dirty));
        }

        let clean = heap.zero_allocate(8, 8).unwrap();

        assert_eq!(clean, dirty);
        assert!(unsafe { bytes(clean, 64) }.iter().all(|&byte| byte == 0));
    }

    #[test]
    fn zero_allocate_rejects_overflow() {
        let mut heap = heap();

        assert!(heap.zero_allocate(usize::MAX, 2).is_none());
        assert!(heap.zero_allocate(0, 16).is_none());
        assert_eq!(heap.stats().allocated_blocks, 0);
    }

    #[test]
    fn resize_grows_and_shrinks() {
        let mut heap = heap();

        let x = heap.allocate(24).unwrap();
        heap.allocate(19);
        heap.allocate(32);

        unsafe {
            x.as_ptr().write(b'a');
            x.as_ptr().add(1).write(b'b');

            let grown = heap.resize(Some(x), 26).unwrap();
            assert_ne!(grown, x);
            assert_eq!(bytes(grown, 2), b"ab");
            assert!(heap.free_blocks().any(|block| block.addr == x));

            let shrunk = heap.resize(Some(grown), 10).unwrap();
            assert_eq!(shrunk, grown);
            assert_eq!(bytes(shrunk, 2), b"ab");
            assert_eq!(heap.block_size(shrunk), Some(26));
        }

        heap.check_integrity().unwrap();
    }

    #[test]
    fn resize_preserves_all_old_bytes() {
        let mut heap = heap();

        let old = heap.allocate(100).unwrap();
        unsafe {
            for i in 0..100 {
                old.as_ptr().add(i).write(i as u8);
            }

            let new = heap.resize(Some(old), 300).unwrap();

            let expected: Vec<u8> = (0..100).collect();
            assert_eq!(bytes(new, 100), &expected[..]);
        }
    }

    #[test]
    fn resize_edge_cases() {
        let mut heap = heap();

        unsafe {
            let ptr = heap.resize(None, 16);
            assert!(ptr.is_some());
            assert_eq!(heap.stats().allocated_blocks, 1);

            assert!(heap.resize(ptr, 0).is_none());
            assert_eq!(heap.stats().allocated_blocks, 0);
            assert_eq!(heap.stats().free_blocks, 1);
        }
    }

    #[test]
    fn failed_grow_leaves_the_block_alone() {
        let mut heap = heap();
        heap.allocate(0);
        let reserved = heap.stats().reserved_bytes;

        let ptr = heap.allocate(32).unwrap();
        unsafe {
            fill(ptr, 32, 7);

            assert!(heap.resize(Some(ptr), reserved).is_none());

            assert_eq!(heap.block_size(ptr), Some(32));
            assert_eq!(bytes(ptr, 32), &[7; 32][..]);
        }
        assert_eq!(heap.stats().allocated_blocks, 1);
        assert_eq!(heap.stats().free_blocks, 0);
    }

    #[test]
    fn owns_only_handed_out_memory() {
        let mut heap = heap();
        let mut local = 0u8;
        assert!(!heap.owns(NonNull::from(&mut local)));

        let ptr = heap.allocate(16).unwrap();

        assert!(heap.owns(ptr));
        assert!(!heap.owns(NonNull::from(&mut local)));
    }

    #[test]
    fn integrity_check_spots_broken_links() {
        let mut heap = heap();
        let a = heap.allocate(8);
        let b = heap.allocate(8);
        heap.allocate(8);
        heap.check_integrity().unwrap();

        let header_b = unsafe { block::header(b.unwrap()) };
        let mut header_a = unsafe { block::header(a.unwrap()) };

        // b is in the middle of the allocated list: c -> b -> a.
        unsafe { header_a.as_mut().prev = None };

        assert_eq!(
            heap.check_integrity(),
            Err(CorruptionError::BrokenLink {
                list: ListKind::Allocated,
                addr: header_a.as_ptr() as usize,
            })
        );

        unsafe { header_a.as_mut().prev = Some(header_b) };
        heap.check_integrity().unwrap();
    }

    #[test]
    fn integrity_check_spots_wrong_flags() {
        let mut heap = heap();
        let a = heap.allocate(8);
        let mut header = unsafe { block::header(a.unwrap()) };

        unsafe { header.as_mut().data.allocated = false };

        assert_eq!(
            heap.check_integrity(),
            Err(CorruptionError::MembershipMismatch {
                list: ListKind::Allocated,
                addr: header.as_ptr() as usize,
            })
        );
    }

    #[test]
    #[should_panic(expected = "could not reserve a heap region")]
    fn region_size_near_the_address_space_limit_is_fatal() {
        let mut heap = BestFit::with_config(Config::new().with_region_size(usize::MAX));

        heap.allocate(8);
    }

    #[test]
    fn over_aligned_requests_get_aligned_payloads() {
        let mut heap = heap();
        heap.allocate(8);

        let ptr = heap.allocate_aligned(512, 128).unwrap();

        assert_eq!(ptr.as_ptr() as usize % 128, 0);
        assert_eq!(unsafe { heap.block_size(ptr) }, Some(512));
        unsafe { fill(ptr, 512, 3) };

        let next = heap.allocate(8).unwrap();
        assert!(next.as_ptr() as usize >= ptr.as_ptr() as usize + 512);
        heap.check_integrity().unwrap();
    }

    #[test]
    fn reuse_skips_blocks_that_are_not_aligned_enough() {
        let mut heap = heap();

        // The region starts on a page, so this payload is 16 but not 256
        // aligned.
        let plain = heap.allocate(200);
        heap.allocate(8);
        let aligned = heap.allocate_aligned(200, 256);
        heap.allocate(8);
        assert_ne!(addr(plain) % 256, 0);

        unsafe {
            heap.deallocate(aligned);
            heap.deallocate(plain);
        }

        assert_eq!(heap.allocate_aligned(100, 256), aligned);
        assert_eq!(heap.allocate(100), plain);
        heap.check_integrity().unwrap();
    }

    #[test]
    fn alignment_must_be_a_power_of_two() {
        let mut heap = heap();

        assert!(heap.allocate_aligned(8, 24).is_none());
        assert!(heap.allocate_aligned(8, 0).is_none());
        assert_eq!(heap.stats().allocated_blocks, 0);
    }

    #[test]
    fn aligned_blocks_stay_aligned_when_moved() {
        let mut heap = heap();

        let ptr = heap.zero_allocate_aligned(16, 128).unwrap();
        assert_eq!(unsafe { bytes(ptr, 16) }, &[0; 16][..]);
        heap.allocate(8);

        unsafe {
            fill(ptr, 16, 0x5A);

            let moved = heap.resize_aligned(Some(ptr), 1024, 128).unwrap();

            assert_ne!(moved, ptr);
            assert_eq!(moved.as_ptr() as usize % 128, 0);
            assert_eq!(bytes(moved, 16), &[0x5A; 16][..]);
        }
        heap.check_integrity().unwrap();
    }

    #[test]
    fn integrity_check_spots_overlapping_blocks() {
        let mut heap = heap();
        let a = heap.allocate(64).unwrap();
        heap.allocate(8);

        // A well formed free header planted inside a live payload.
        let fake = a.cast::<Node<Block>>();
        unsafe {
            fake.write(Node {
                next: None,
                prev: None,
                data: Block {
                    size: 16,
                    allocated: false,
                },
            });
            heap.free_list.insert_free_block(fake);
        }

        let header_a = unsafe { block::header(a) };

        assert_eq!(
            heap.check_integrity(),
            Err(CorruptionError::Overlap {
                first: header_a.as_ptr() as usize,
                second: a.as_ptr() as usize,
            })
        );
    }
}
