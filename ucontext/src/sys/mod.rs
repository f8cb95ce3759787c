extern crate page_size;

cfg_if::cfg_if! {
    if #[cfg(target_family = "unix")] {
        mod unix;
        pub(crate) use unix::*;
    } else {
        compile_error!("ucontext only supports unix targets");
    }
}

use std::ptr::NonNull;

/// A single mapping holding `len()` coroutine stacks of `stack_size()` bytes each.
///
/// Stacks are contiguous and have no guard pages: a flow overflowing its stack
/// writes into the neighbouring one.
pub struct StackBlock {
    /// First byte of the mapping
    base: NonNull<u8>,
    /// Size of one stack, a multiple of the page granularity
    stack_size: usize,
    /// Number of stacks
    count: usize,
}

impl Drop for StackBlock {
    fn drop(&mut self) {
        log::debug!(
            "StackBlock: unmapping {} stacks at {:?}",
            self.count,
            self.base
        );
        stack_dealloc(self.total_size(), self.base);
    }
}

impl StackBlock {
    pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

    /// Returns the system page allocation granularity
    #[inline(always)]
    pub fn page_size() -> usize {
        page_size::get_granularity()
    }

    /// Rounds `size_hint` up to a non-zero multiple of the page granularity
    pub fn round_size(size_hint: usize) -> usize {
        let page_align_mask = Self::page_size() - 1;
        let size_hint = size_hint + (size_hint == 0) as usize;
        size_hint.saturating_add(page_align_mask) & !page_align_mask
    }

    /// Maps `count` zeroed stacks of at least `stack_size_hint` bytes each.
    ///
    /// Returns `None` when `count` is zero, the total size overflows or the system
    /// is out of memory.
    pub fn allocate(count: usize, stack_size_hint: usize) -> Option<Self> {
        let stack_size = Self::round_size(stack_size_hint);
        let total_size = stack_size.checked_mul(count).filter(|size| *size > 0)?;
        let base = stack_alloc(total_size)?;
        log::debug!(
            "StackBlock: mapped {count} stacks of {stack_size} bytes at {:?}",
            base
        );
        Some(Self {
            base,
            stack_size,
            count,
        })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline(always)]
    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    #[inline(always)]
    pub fn total_size(&self) -> usize {
        self.stack_size * self.count
    }

    /// Lowest address of the stack `index`
    #[inline(always)]
    pub fn bottom(&self, index: usize) -> *mut u8 {
        assert!(index < self.count);
        unsafe { self.base.as_ptr().add(index * self.stack_size) }
    }

    /// Address the stack `index` starts from, aligned on 16 bytes
    #[inline(always)]
    pub fn top(&self, index: usize) -> *mut u8 {
        let bottom = self.bottom(index);
        if stack_growth_downward() {
            let end = bottom as usize + self.stack_size;
            (end & !15usize) as *mut u8
        } else {
            ((bottom as usize + 15) & !15usize) as *mut u8
        }
    }

    /// Zero-fills the stack `index`.
    ///
    /// # Safety
    /// No live flow may be running on, or suspended on, that stack.
    pub unsafe fn clear(&mut self, index: usize) {
        unsafe { std::ptr::write_bytes(self.bottom(index), 0, self.stack_size) };
    }

    /// Returns the raw content of the stack `index`.
    ///
    /// # Safety
    /// No flow may run on that stack while the slice is alive.
    pub unsafe fn bytes(&self, index: usize) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.bottom(index), self.stack_size) }
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(target_arch="x86", target_arch="x86_64", target_arch="aarch64"))] {
        /// Returns `true` when the stack growth downward
        #[inline(always)]
        pub const fn stack_growth_downward() -> bool {
            true
        }
    } else {
        #[inline(never)]
        fn __get_stack_growth_downward(prev_stack_data: *mut u8) -> bool {
            let mut data_on_stack = 0u8;
            (&mut data_on_stack as *mut u8 as usize) < (prev_stack_data as usize)
        }
        /// Returns `true` when the stack growth downward
        #[inline(never)]
        pub fn stack_growth_downward() -> bool {
            let mut data_on_stack = 0u8;
            __get_stack_growth_downward(&mut data_on_stack as _)
        }
    }
}
