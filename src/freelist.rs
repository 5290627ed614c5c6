use std::ptr::NonNull;

use crate::{
    block::{self, BLOCK_ALIGN, Block},
    error::CorruptionError,
    list::{Link, List, Node},
};

/// Linked list to keep track of free [`Block`]s.
///
/// Free blocks keep the exact size they were carved with. The list is not
/// sorted; a freed block is pushed to the head, so among equally good
/// candidates the most recently freed one is picked.
///
/// ```text
///          Free List                          Region
///
///  head -----------------------+
///                              |
///  +--------+------+--------+--v---+--------+------+--------+------+
///  | Header | used | Header | free | Header | used | Header | free |
///  +--------+------+--------+------+--------+------+--------+--^---+
///                              |                               |
///                              +------------ next -------------+
/// ```
pub(crate) struct FreeList {
    pub items: List<Block>,
}

impl FreeList {
    /// Creates a new empty List
    pub const fn new() -> Self {
        Self { items: List::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Puts `block` at the head of the FreeList and marks it free.
    ///
    /// **SAFETY**: `block` must be a valid header not linked in any list.
    pub unsafe fn insert_free_block(&mut self, mut block: NonNull<Node<Block>>) {
        unsafe {
            block.as_mut().data.allocated = false;
            self.items.push_front(block);
        }
    }

    /// Unlinks `block` from the FreeList. The caller decides what the block
    /// becomes next.
    ///
    /// **SAFETY**: `block` must be a member of this list.
    pub unsafe fn remove_free_block(&mut self, block: NonNull<Node<Block>>) {
        unsafe { self.items.remove(block) }
    }

    /// Returns the [`Block`] that best fits `size` bytes.
    ///
    /// This is a best-fit search: the whole list is walked from head to tail,
    /// keeping the smallest block that can hold `size`. The first block seen
    /// wins ties, and an exact match ends the walk early since nothing can
    /// beat it.
    ///
    /// Every payload sits on a [`BLOCK_ALIGN`] boundary. For a larger `align`
    /// blocks whose payload is not aligned enough are skipped.
    ///
    /// A block marked as allocated on this list means the heap is corrupted.
    pub fn find_best_fit(&self, size: usize, align: usize) -> Result<Link<Node<Block>>, CorruptionError> {
        if self.is_empty() {
            return Ok(None);
        }

        let mut best: Link<Node<Block>> = None;
        let mut best_size = usize::MAX;

        for node in &self.items {
            let block = unsafe { &node.as_ref().data };

            if block.allocated {
                return Err(CorruptionError::AllocatedOnFreeList {
                    addr: node.as_ptr() as usize,
                });
            }

            let aligned = align <= BLOCK_ALIGN || block::payload(node).as_ptr() as usize % align == 0;

            if aligned && block.size >= size && (best.is_none() || block.size < best_size) {
                best = Some(node);
                best_size = block.size;

                if best_size == size {
                    break;
                }
            }
        }

        Ok(best)
    }
}
