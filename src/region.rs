use std::{io, ptr::NonNull};

use crate::{
    block::{BLOCK_ALIGN, Block, HEADER_SIZE},
    error::AllocError,
    kernel,
    list::Node,
    utils::checked_align,
};

/// The address space the heap lives in.
///
/// One contiguous region is reserved up front and then consumed from the
/// bottom by bumping `next_free`. Memory below `next_free` is carved into
/// blocks; memory above it has never been handed out.
///
/// ```text
///  start                       next_free                          end
///    |                             |                               |
///    v                             v                               v
///    +--------+------+--------+----+-------------------------------+
///    | header | data | header |data|        never touched          |
///    +--------+------+--------+----+-------------------------------+
/// ```
///
/// `start <= next_free <= committed <= end` always holds and `next_free`
/// never goes down: blocks are recycled through the free list, never given
/// back to the region.
pub(crate) struct Region {
    /// First byte of the reservation.
    start: NonNull<u8>,
    /// One past the last byte of the reservation.
    end: usize,
    /// Bump pointer.
    next_free: usize,
    /// Page boundary up to which the kernel has been asked to back memory.
    committed: usize,
    page_size: usize,
}

impl Region {
    /// Reserves a new region of at least `size` bytes, rounded up to whole
    /// pages.
    pub fn reserve(size: usize) -> Result<Self, AllocError> {
        let page_size = kernel::page_size();

        let size = checked_align(size.max(1), page_size).ok_or_else(|| AllocError::Reservation {
            size,
            source: io::ErrorKind::OutOfMemory.into(),
        })?;

        let start = unsafe { kernel::reserve(size) }
            .map_err(|source| AllocError::Reservation { size, source })?;

        let base = start.as_ptr() as usize;

        log::debug!("[bfalloc] reserved heap region {base:#x}..{:#x} ({size} bytes)", base + size);

        Ok(Self {
            start,
            end: base + size,
            next_free: base,
            committed: base,
            page_size,
        })
    }

    #[inline]
    pub fn start(&self) -> usize {
        self.start.as_ptr() as usize
    }

    #[inline]
    pub fn next_free(&self) -> usize {
        self.next_free
    }

    /// Total bytes reserved.
    #[inline]
    pub fn size(&self) -> usize {
        self.end - self.start()
    }

    /// Bytes not yet consumed by the bump pointer.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.end - self.next_free
    }

    #[inline]
    pub fn committed(&self) -> usize {
        self.committed
    }

    /// Whether `addr` lies in the part of the region that has been carved
    /// into blocks.
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        (self.start()..self.next_free).contains(&addr)
    }

    /// Carves a new block with `size` usable bytes at the top of the used
    /// part of the region and returns the place where its header goes.
    ///
    /// The header is put on a [`BLOCK_ALIGN`] boundary chosen so that the
    /// payload right after it is aligned to `align`. Bytes skipped to get
    /// there are simply left unused. Nothing is committed unless the whole
    /// block fits below `end`.
    pub fn bump(&mut self, size: usize, align: usize) -> Result<NonNull<Node<Block>>, AllocError> {
        let exhausted = || AllocError::Exhausted {
            requested: size,
            remaining: self.remaining(),
        };

        let header_addr = self
            .next_free
            .checked_add(HEADER_SIZE)
            .and_then(|payload| checked_align(payload, align.max(BLOCK_ALIGN)))
            .map(|payload| payload - HEADER_SIZE)
            .ok_or_else(exhausted)?;

        let new_free = header_addr
            .checked_add(HEADER_SIZE)
            .and_then(|addr| addr.checked_add(size))
            .filter(|&addr| addr <= self.end)
            .ok_or_else(exhausted)?;

        self.commit_up_to(new_free)?;

        // Derive the header pointer from `start` to keep the region's provenance.
        let header = unsafe { self.start.add(header_addr - self.start()) };

        self.next_free = new_free;

        Ok(header.cast())
    }

    /// Makes sure every page below `addr` is backed. `end` is page aligned,
    /// so rounding `addr` up never leaves the reservation.
    fn commit_up_to(&mut self, addr: usize) -> Result<(), AllocError> {
        let target = checked_align(addr, self.page_size).map_or(self.end, |page| page.min(self.end));

        if target <= self.committed {
            return Ok(());
        }

        let len = target - self.committed;
        let from = unsafe { self.start.add(self.committed - self.start()) };

        unsafe { kernel::commit(from, len) }.map_err(|source| AllocError::Commit {
            addr: self.committed,
            len,
            source,
        })?;

        self.committed = target;

        Ok(())
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        unsafe { kernel::release(self.start, self.size()) }
    }
}
