use crate::{CompletionCb, EntryCb};

unsafe extern "C" {
    unsafe fn __coropool_uctx_asm_boot();
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "macos")] {
        compile_error!("ucontext does not support Mach-O targets yet");
    } else {
        // System V: rbx, rbp, r12-r15 are callee-saved.
        // The boot trampoline finds `arg` in r12, `entry` in r13 and `completion` in r14,
        // they survive the call to `entry` since it must preserve them.
        std::arch::global_asm!(
            ".text",
            ".global __coropool_uctx_asm_swap",
            ".type __coropool_uctx_asm_swap,@function",
            ".p2align 4",
            "__coropool_uctx_asm_swap:",
            "    push rbp",
            "    push rbx",
            "    push r12",
            "    push r13",
            "    push r14",
            "    push r15",
            "    mov [rdi], rsp",
            "    mov rsp, rsi",
            "    pop r15",
            "    pop r14",
            "    pop r13",
            "    pop r12",
            "    pop rbx",
            "    pop rbp",
            "    ret",
            ".size __coropool_uctx_asm_swap,.-__coropool_uctx_asm_swap",
            "",
            ".global __coropool_uctx_asm_boot",
            ".type __coropool_uctx_asm_boot,@function",
            ".p2align 4",
            "__coropool_uctx_asm_boot:",
            "    mov rdi, r12",
            "    call r13",
            "    mov rdi, r12",
            "    call r14",
            "    ud2",
            ".size __coropool_uctx_asm_boot,.-__coropool_uctx_asm_boot",
        );

        /// Writes the frame the first swap to the returned stack pointer pops.
        ///
        /// # Safety
        /// `stack_top` must be the upper end of a writable region of at least 80 bytes.
        pub(crate) unsafe fn setup_coroutine_on_stack(
            stack_top: *mut u8,
            entry: EntryCb,
            completion: CompletionCb,
            arg: *mut (),
        ) -> *mut () {
            unsafe {
                let mut sp = ((stack_top as usize) & !15usize) as *mut usize;
                // Null return address and frame, ends backtraces
                sp = sp.sub(1);
                sp.write(0);
                sp = sp.sub(1);
                sp.write(0);
                // Popped by `ret` in the swap, rsp is then 16-byte aligned
                sp = sp.sub(1);
                sp.write(__coropool_uctx_asm_boot as *const () as usize);
                // rbp, rbx, r12, r13, r14, r15 in push order
                sp = sp.sub(1);
                sp.write(0);
                sp = sp.sub(1);
                sp.write(0);
                sp = sp.sub(1);
                sp.write(arg as usize);
                sp = sp.sub(1);
                sp.write(entry as usize);
                sp = sp.sub(1);
                sp.write(completion as usize);
                sp = sp.sub(1);
                sp.write(0);
                debug_assert_eq!((sp as usize) % 16, 8);
                sp as *mut ()
            }
        }
    }
}
