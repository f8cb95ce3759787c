use std::ptr::NonNull;

#[cfg_attr(target_arch = "x86_64", path = "x86_64.rs")]
#[cfg_attr(target_arch = "x86", path = "x86.rs")]
#[cfg_attr(target_arch = "aarch64", path = "aarch64.rs")]
pub(crate) mod asm;

#[cfg(not(any(target_arch = "x86_64", target_arch = "x86", target_arch = "aarch64")))]
compile_error!("ucontext only supports x86, x86_64 and aarch64");

cfg_if::cfg_if! {
    if #[cfg(any(
        target_os = "linux",
        target_os = "freebsd",
        target_os = "openbsd"
    ))] {
        const MMAP_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANON | libc::MAP_STACK;
    } else {
        const MMAP_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANON;
    }
}
const MMAP_PROT: libc::c_int = libc::PROT_READ | libc::PROT_WRITE;

pub(crate) fn stack_alloc(total_size: usize) -> Option<NonNull<u8>> {
    let base = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            total_size,
            MMAP_PROT,
            MMAP_FLAGS,
            -1,
            0,
        )
    };

    if base == libc::MAP_FAILED {
        log::debug!(
            "mmap({total_size}) failed: {}",
            std::io::Error::last_os_error()
        );
        None
    } else {
        NonNull::new(base as *mut u8)
    }
}

pub(crate) fn stack_dealloc(total_size: usize, base: NonNull<u8>) {
    if unsafe { libc::munmap(base.as_ptr() as _, total_size) } < 0 {
        crate::die("Failed to unmap a stack block");
    }
}
