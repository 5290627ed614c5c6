//! Drives the allocator through a short allocate / write / resize / free
//! session and prints every address so reuse can be eyeballed.

use std::ptr::NonNull;

use bfalloc::BestFit;

fn show(name: &str, ptr: Option<NonNull<u8>>) {
    match ptr {
        Some(ptr) => println!("{name} = {ptr:p}"),
        None => println!("{name} = (none)"),
    }
}

unsafe fn first_two(ptr: Option<NonNull<u8>>) -> (char, char) {
    let ptr = ptr.expect("block").as_ptr();
    unsafe { (*ptr as char, *ptr.add(1) as char) }
}

unsafe fn write_two(ptr: Option<NonNull<u8>>, bytes: &[u8; 2]) {
    let ptr = ptr.expect("block").as_ptr();
    unsafe { ptr.copy_from_nonoverlapping(bytes.as_ptr(), 2) };
}

fn main() {
    let mut heap = BestFit::new();

    unsafe {
        println!("Resizing:");
        let mut x = heap.allocate(24);
        let y = heap.allocate(19);
        let z = heap.allocate(32);
        write_two(x, b"ab");
        show("x", x);
        show("y", y);
        show("z", z);

        x = heap.resize(x, 26);
        show("x after growing to 26", x);
        println!("x[0..2] = {:?}", first_two(x));

        x = heap.resize(x, 10);
        show("x after shrinking to 10 (same address)", x);
        println!("x[0..2] = {:?}\n", first_two(x));

        heap.deallocate(x);
        heap.deallocate(y);
        heap.deallocate(z);

        println!("Reuse:");
        let mut a = heap.allocate(24);
        let b = heap.allocate(19);
        let mut c = heap.allocate(32);
        write_two(a, b"hi");
        write_two(c, b"yo");
        show("a", a);
        show("b", b);
        show("c", c);

        heap.deallocate(b);
        let d = heap.allocate(10);
        show("d (reuses b)", d);

        a = heap.resize(a, 40);
        show("a after growing to 40", a);
        println!("a[0..2] = {:?}", first_two(a));

        c = heap.resize(c, 16);
        show("c after shrinking to 16 (same address)", c);
        println!("c[0..2] = {:?}\n", first_two(c));

        let e = heap.allocate(28);
        show("e", e);

        for ptr in [a, c, d, e] {
            heap.deallocate(ptr);
        }
    }

    println!("Free list, most recently freed first:");
    for block in heap.free_blocks() {
        println!("  {:p} ({} bytes)", block.addr, block.size);
    }

    let stats = heap.stats();
    println!(
        "\n{} free blocks ({} bytes), {} bytes of the region used",
        stats.free_blocks, stats.free_bytes, stats.used_bytes
    );

    heap.check_integrity().expect("heap is consistent");
}
