use crate::{CompletionCb, EntryCb};

unsafe extern "C" {
    unsafe fn __coropool_uctx_asm_boot();
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "macos")] {
        compile_error!("ucontext does not support Mach-O targets yet");
    } else {
        // cdecl: ebx, esi, edi, ebp are callee-saved, arguments are on the stack.
        // The boot trampoline finds `entry` in edi, `arg` in esi and `completion` in ebx.
        // `entry` may clobber its argument slot, so `arg` is stored again before `completion`.
        std::arch::global_asm!(
            ".text",
            ".global __coropool_uctx_asm_swap",
            ".type __coropool_uctx_asm_swap,@function",
            ".p2align 4",
            "__coropool_uctx_asm_swap:",
            "    mov eax, dword ptr [esp + 4]",
            "    mov edx, dword ptr [esp + 8]",
            "    push ebp",
            "    push ebx",
            "    push esi",
            "    push edi",
            "    mov dword ptr [eax], esp",
            "    mov esp, edx",
            "    pop edi",
            "    pop esi",
            "    pop ebx",
            "    pop ebp",
            "    ret",
            ".size __coropool_uctx_asm_swap,.-__coropool_uctx_asm_swap",
            "",
            ".global __coropool_uctx_asm_boot",
            ".type __coropool_uctx_asm_boot,@function",
            ".p2align 4",
            "__coropool_uctx_asm_boot:",
            "    push esi",
            "    call edi",
            "    mov dword ptr [esp], esi",
            "    call ebx",
            "    ud2",
            ".size __coropool_uctx_asm_boot,.-__coropool_uctx_asm_boot",
        );

        /// Writes the frame the first swap to the returned stack pointer pops.
        ///
        /// # Safety
        /// `stack_top` must be the upper end of a writable region of at least 48 bytes.
        pub(crate) unsafe fn setup_coroutine_on_stack(
            stack_top: *mut u8,
            entry: EntryCb,
            completion: CompletionCb,
            arg: *mut (),
        ) -> *mut () {
            unsafe {
                let mut sp = ((stack_top as usize) & !15usize) as *mut usize;
                // Padding, `push esi` in the trampoline then leaves esp 16-byte aligned
                for _ in 0..3 {
                    sp = sp.sub(1);
                    sp.write(0);
                }
                sp = sp.sub(1);
                sp.write(__coropool_uctx_asm_boot as *const () as usize);
                // ebp, ebx, esi, edi in push order
                sp = sp.sub(1);
                sp.write(0);
                sp = sp.sub(1);
                sp.write(completion as usize);
                sp = sp.sub(1);
                sp.write(arg as usize);
                sp = sp.sub(1);
                sp.write(entry as usize);
                debug_assert_eq!((sp as usize) % 16, 0);
                sp as *mut ()
            }
        }
    }
}
