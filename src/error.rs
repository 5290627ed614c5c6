//! Error types of the allocator.
//!
//! There are two families. [`AllocError`] covers requests the allocator can
//! simply refuse: the caller gets `None` back and carries on. [`CorruptionError`]
//! means one of the heap's structural invariants is broken. There is no way to
//! recover from that, so those errors go through [`fatal`] and stop the process.

use std::io;

use thiserror::Error;

/// A request that could not be satisfied.
#[derive(Debug, Error)]
pub enum AllocError {
    /// The bump pointer would run past the end of the reserved region and no
    /// free block was large enough.
    #[error("heap exhausted: requested {requested} bytes, {remaining} left in the region")]
    Exhausted { requested: usize, remaining: usize },

    /// The OS refused to reserve the heap region.
    #[error("could not reserve a heap region of {size} bytes")]
    Reservation {
        size: usize,
        #[source]
        source: io::Error,
    },

    /// The OS refused to back pages of an already reserved region.
    #[error("could not commit {len} bytes at {addr:#x}")]
    Commit {
        addr: usize,
        len: usize,
        #[source]
        source: io::Error,
    },

    /// Zero-byte requests never produce a block.
    #[error("zero-sized allocation request")]
    ZeroSized,

    /// `count * element_size` does not fit in a `usize`.
    #[error("zero-allocation of {count} elements of {element_size} bytes overflows")]
    Overflow { count: usize, element_size: usize },

    /// Alignments must be powers of two.
    #[error("alignment of {align} bytes is not a power of two")]
    UnsupportedAlignment { align: usize },
}

/// Name of one of the two block lists, used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Free,
    Allocated,
}

impl std::fmt::Display for ListKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => f.write_str("free list"),
            Self::Allocated => f.write_str("allocated list"),
        }
    }
}

/// A broken heap invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorruptionError {
    #[error("double free of block at {addr:#x}")]
    DoubleFree { addr: usize },

    #[error("allocated block at {addr:#x} found on the free list")]
    AllocatedOnFreeList { addr: usize },

    #[error("pointer {addr:#x} was not handed out by this allocator")]
    ForeignPointer { addr: usize },

    #[error("{list} has a broken link at header {addr:#x}")]
    BrokenLink { list: ListKind, addr: usize },

    #[error("header {addr:#x} on the {list} has the wrong allocation flag")]
    MembershipMismatch { list: ListKind, addr: usize },

    #[error("block at {first:#x} overlaps block at {second:#x}")]
    Overlap { first: usize, second: usize },

    #[error("{list} holds {counted} headers but records {expected}")]
    LengthMismatch {
        list: ListKind,
        counted: usize,
        expected: usize,
    },
}

/// Logs `err` and panics. Used for errors the heap cannot survive.
///
/// When the allocator is installed as the global allocator the panic happens
/// inside `GlobalAlloc`, which the runtime turns into an abort.
#[cold]
#[track_caller]
pub(crate) fn fatal(err: impl std::error::Error) -> ! {
    log::error!("[bfalloc] fatal: {err}");
    panic!("{err}");
}
