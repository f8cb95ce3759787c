use crate::{CompletionCb, EntryCb};

unsafe extern "C" {
    unsafe fn __coropool_uctx_asm_boot();
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "macos")] {
        compile_error!("ucontext does not support Mach-O targets yet");
    } else {
        // AAPCS64: x19-x29, the link register and d8-d15 are preserved across calls.
        // The boot trampoline finds `arg` in x19, `entry` in x20 and `completion` in x21.
        std::arch::global_asm!(
            ".text",
            ".global __coropool_uctx_asm_swap",
            ".type __coropool_uctx_asm_swap,%function",
            ".p2align 4",
            "__coropool_uctx_asm_swap:",
            "    sub sp, sp, #160",
            "    stp x19, x20, [sp, #0]",
            "    stp x21, x22, [sp, #16]",
            "    stp x23, x24, [sp, #32]",
            "    stp x25, x26, [sp, #48]",
            "    stp x27, x28, [sp, #64]",
            "    stp x29, x30, [sp, #80]",
            "    stp d8, d9, [sp, #96]",
            "    stp d10, d11, [sp, #112]",
            "    stp d12, d13, [sp, #128]",
            "    stp d14, d15, [sp, #144]",
            "    mov x9, sp",
            "    str x9, [x0]",
            "    mov sp, x1",
            "    ldp x19, x20, [sp, #0]",
            "    ldp x21, x22, [sp, #16]",
            "    ldp x23, x24, [sp, #32]",
            "    ldp x25, x26, [sp, #48]",
            "    ldp x27, x28, [sp, #64]",
            "    ldp x29, x30, [sp, #80]",
            "    ldp d8, d9, [sp, #96]",
            "    ldp d10, d11, [sp, #112]",
            "    ldp d12, d13, [sp, #128]",
            "    ldp d14, d15, [sp, #144]",
            "    add sp, sp, #160",
            "    ret",
            ".size __coropool_uctx_asm_swap,.-__coropool_uctx_asm_swap",
            "",
            ".global __coropool_uctx_asm_boot",
            ".type __coropool_uctx_asm_boot,%function",
            ".p2align 4",
            "__coropool_uctx_asm_boot:",
            "    mov x0, x19",
            "    blr x20",
            "    mov x0, x19",
            "    blr x21",
            "    brk #1",
            ".size __coropool_uctx_asm_boot,.-__coropool_uctx_asm_boot",
        );

        /// Writes the frame the first swap to the returned stack pointer loads.
        ///
        /// # Safety
        /// `stack_top` must be the upper end of a writable region of at least 160 bytes.
        pub(crate) unsafe fn setup_coroutine_on_stack(
            stack_top: *mut u8,
            entry: EntryCb,
            completion: CompletionCb,
            arg: *mut (),
        ) -> *mut () {
            unsafe {
                let sp = (((stack_top as usize) & !15usize) - 160) as *mut usize;
                std::ptr::write_bytes(sp, 0, 20);
                // x19, x20, x21
                sp.add(0).write(arg as usize);
                sp.add(1).write(entry as usize);
                sp.add(2).write(completion as usize);
                // x29 stays null, x30 is the address `ret` jumps to
                sp.add(11).write(__coropool_uctx_asm_boot as *const () as usize);
                sp as *mut ()
            }
        }
    }
}
