//! Installs `BfAlloc` as the global allocator and watches the best-fit heap
//! serve the standard library.

use std::{sync::mpsc, thread};

use bfalloc::{BfAlloc, BlockInfo};

#[global_allocator]
static ALLOCATOR: BfAlloc = BfAlloc::new();

#[repr(align(128))]
struct Aligned([u8; 256]);

/// Copies up to `N` free blocks out of the heap. Printing allocates, so it
/// has to happen after the lock is released.
fn free_list_snapshot<const N: usize>() -> ([Option<BlockInfo>; N], usize) {
    ALLOCATOR.with_heap(|heap| {
        let mut blocks = [None; N];
        for (slot, block) in blocks.iter_mut().zip(heap.free_blocks()) {
            *slot = Some(block);
        }
        (blocks, heap.free_blocks().count())
    })
}

fn print_free_list() {
    let (blocks, total) = free_list_snapshot::<8>();

    println!("free list ({total} blocks, most recently freed first):");
    for block in blocks.iter().flatten() {
        println!("  {:p} {:>5} bytes", block.addr, block.size);
    }
}

fn main() {
    println!("bfalloc as the global allocator\n");

    // Three differently sized blocks, freed in order of size.
    let small = Box::new([1u8; 40]);
    let large = Box::new([2u8; 200]);
    let medium = Box::new([3u8; 96]);
    let (small_at, large_at, medium_at) = (small.as_ptr(), large.as_ptr(), medium.as_ptr());

    drop(small);
    drop(large);
    drop(medium);

    // Only the 96 byte block is big enough without being wasteful.
    let fit = Box::new([4u8; 90]);
    println!("40 bytes at {small_at:p}, 200 at {large_at:p}, 96 at {medium_at:p}");
    println!("90 bytes went to {:p} (best fit: {})\n", fit.as_ptr(), fit.as_ptr() == medium_at);

    print_free_list();

    // No coalescing: two freed neighbours never make room for a bigger block.
    let a = Box::new([0u8; 64]);
    let b = Box::new([0u8; 64]);
    let a_at = a.as_ptr();
    drop(a);
    drop(b);

    let c = Box::new([0u8; 128]);
    println!("\n128 bytes after freeing two 64 byte neighbours: {:p} (reused: {})", c.as_ptr(), c.as_ptr() == a_at);

    // Over-aligned values get a padded block.
    let aligned = Box::new(Aligned([9; 256]));
    let aligned_at = &*aligned as *const Aligned;
    println!("align(128) value at {aligned_at:p}, offset {}", aligned_at as usize % 128);

    // std channels allocate their slots with cache line alignment.
    let (sender, receiver) = mpsc::channel();
    let workers: Vec<_> = (0..4)
        .map(|id| {
            let sender = sender.clone();
            thread::spawn(move || sender.send(vec![id; 16]).unwrap())
        })
        .collect();
    drop(sender);

    let total: usize = receiver.iter().map(|v| v.iter().sum::<usize>()).sum();
    for worker in workers {
        worker.join().unwrap();
    }
    println!("workers sent {total}\n");

    print_free_list();

    let stats = ALLOCATOR.stats();
    println!(
        "\n{} live blocks ({} bytes), {} free blocks ({} bytes), {} of {} bytes used",
        stats.allocated_blocks,
        stats.allocated_bytes,
        stats.free_blocks,
        stats.free_bytes,
        stats.used_bytes,
        stats.reserved_bytes
    );

    ALLOCATOR
        .with_heap(|heap| heap.check_integrity())
        .expect("heap is consistent");
}
