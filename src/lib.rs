//! # bfalloc - a best-fit heap allocator
//!
//! This crate manages its own address space instead of delegating to
//! another allocator. One large region of virtual memory is reserved up front,
//! blocks are bumped out of it, and freed blocks are recycled through a
//! doubly-linked free list searched with a best-fit linear scan.
//!
//! ```text
//!   Heap region:
//!
//!   start                                   next_free                end
//!     |                                         |                     |
//!     v                                         v                     v
//!     +--------+----+--------+------+--------+--+---------------------+
//!     | Header | A  | Header | free | Header |C |      untouched      |
//!     +--------+----+--------+------+--------+--+---------------------+
//!
//!   allocated list: C -> A            free list: B
//! ```
//!
//! Every header lives right in front of the block it describes and belongs to
//! exactly one of the two lists. Allocation picks the smallest free block
//! that fits and falls back to bumping `next_free` when none does.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use bfalloc::BestFit;
//!
//! let mut heap = BestFit::new();
//!
//! let x = heap.allocate(24).unwrap();
//! let x = unsafe { heap.resize(Some(x), 64) };
//! unsafe { heap.deallocate(x) };
//! ```
//!
//! To replace the system allocator, install a [`BfAlloc`] as the
//! `#[global_allocator]`.
//!
//! ## Limitations
//!
//! - **No coalescing**: adjacent free blocks are never merged and blocks are
//!   never split, so fragmentation grows over long allocate/free cycles.
//! - **Linear search**: every allocation walks the whole free list.
//! - **Over-aligned requests waste space**: payloads sit on 16-byte
//!   boundaries. Larger alignments are honoured by skipping free blocks that
//!   are not aligned enough and by leaving a gap in front of new blocks.
//! - **The region never shrinks**: memory is recycled, not returned to the OS.
//!
//! ## Errors
//!
//! Exhaustion and degenerate requests return `None`. Double frees, foreign
//! pointers, a corrupted free list, or failing to reserve the region are
//! fatal and panic (abort, when running as the global allocator).

mod bestfit;
mod block;
mod config;
mod error;
mod freelist;
mod global;
mod kernel;
mod list;
mod region;
mod utils;

pub use bestfit::{BestFit, BlockInfo, HeapStats};
pub use block::BLOCK_ALIGN;
pub use config::{Config, DEFAULT_REGION_SIZE};
pub use error::{AllocError, CorruptionError, ListKind};
pub use global::{BfAlloc, allocate, deallocate, resize, stats, zero_allocate};
