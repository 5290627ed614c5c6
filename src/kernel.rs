use std::{io, ptr::NonNull};

/// The only OS service the heap consumes: a large, private, anonymous,
/// read-write region of virtual memory.
///
/// The allocator never touches platform APIs directly. Everything that is
/// kernel specific sits behind this trait so the rest of the crate only
/// deals with addresses.
trait PlatformMemory {
    /// Reserves `len` bytes of read-write address space not backed by any
    /// file and private to this process.
    unsafe fn reserve(len: usize) -> io::Result<NonNull<u8>>;

    /// Makes `len` bytes at `addr`, inside a reservation, usable. Kernels
    /// that back reserved pages on first touch have nothing to do here.
    unsafe fn commit(addr: NonNull<u8>, len: usize) -> io::Result<()>;

    /// Gives the region of `len` bytes starting at `addr` back to the kernel.
    unsafe fn release(addr: NonNull<u8>, len: usize);

    /// Virtual memory page size in bytes.
    fn page_size() -> usize;
}

/// Zero sized handle implementing [`PlatformMemory`] for the current target.
pub(crate) struct Kernel;

/// Wrapper to use [`PlatformMemory::reserve`].
#[inline]
pub(crate) unsafe fn reserve(len: usize) -> io::Result<NonNull<u8>> {
    unsafe { Kernel::reserve(len) }
}

/// Wrapper to use [`PlatformMemory::commit`].
#[inline]
pub(crate) unsafe fn commit(addr: NonNull<u8>, len: usize) -> io::Result<()> {
    unsafe { Kernel::commit(addr, len) }
}

/// Wrapper to use [`PlatformMemory::release`].
#[inline]
pub(crate) unsafe fn release(addr: NonNull<u8>, len: usize) {
    unsafe { Kernel::release(addr, len) }
}

/// Wrapper to use [`PlatformMemory::page_size`].
#[inline]
pub(crate) fn page_size() -> usize {
    Kernel::page_size()
}

#[cfg(unix)]
mod unix {
    use super::{Kernel, PlatformMemory};

    use libc::{mmap, munmap, off_t, size_t};

    use std::{
        io,
        os::raw::{c_int, c_void},
        ptr::NonNull,
    };

    #[cfg(any(target_os = "linux", target_os = "android"))]
    const NORESERVE: c_int = libc::MAP_NORESERVE;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    const NORESERVE: c_int = 0;

    impl PlatformMemory for Kernel {
        unsafe fn reserve(len: usize) -> io::Result<NonNull<u8>> {
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            // Pages are only backed once touched, so a huge region costs
            // nothing up front.
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | NORESERVE;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                match mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET) {
                    libc::MAP_FAILED => Err(io::Error::last_os_error()),
                    addr => NonNull::new(addr.cast::<u8>())
                        .ok_or_else(|| io::Error::from(io::ErrorKind::OutOfMemory)),
                }
            }
        }

        unsafe fn commit(_addr: NonNull<u8>, _len: usize) -> io::Result<()> {
            Ok(())
        }

        unsafe fn release(addr: NonNull<u8>, len: usize) {
            unsafe {
                munmap(addr.as_ptr().cast::<c_void>(), len as size_t);
            }
        }

        fn page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::{io, mem::MaybeUninit, os::raw::c_void, ptr::NonNull};

    use super::{Kernel, PlatformMemory};

    use windows::Win32::System::{Memory, SystemInformation};

    impl PlatformMemory for Kernel {
        unsafe fn reserve(len: usize) -> io::Result<NonNull<u8>> {
            // Address space only: pages are committed as the bump pointer
            // reaches them, so the region doesn't count against the commit
            // limit up front.
            unsafe {
                let addr = Memory::VirtualAlloc(None, len, Memory::MEM_RESERVE, Memory::PAGE_NOACCESS);

                NonNull::new(addr.cast::<u8>()).ok_or_else(io::Error::last_os_error)
            }
        }

        unsafe fn commit(addr: NonNull<u8>, len: usize) -> io::Result<()> {
            unsafe {
                let addr = Memory::VirtualAlloc(
                    Some(addr.as_ptr().cast_const().cast::<c_void>()),
                    len,
                    Memory::MEM_COMMIT,
                    Memory::PAGE_READWRITE,
                );

                if addr.is_null() {
                    return Err(io::Error::last_os_error());
                }
            }

            Ok(())
        }

        unsafe fn release(addr: NonNull<u8>, _len: usize) {
            unsafe {
                let _ = Memory::VirtualFree(addr.as_ptr().cast::<c_void>(), 0, Memory::MEM_RELEASE);
            }
        }

        fn page_size() -> usize {
            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

                system_info.assume_init().dwPageSize as usize
            }
        }
    }
}
