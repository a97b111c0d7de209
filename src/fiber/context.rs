//! Per-architecture assembly stack swap, in the shape of Boost.Context's
//! `fcontext`: save the callee-saved registers and the stack pointer of
//! the outgoing context, load them for the incoming one. There is no
//! signal-safety or FPU-control-word handling here — cooperative fibers
//! only ever switch at explicit, C-ABI-compatible call sites.

/// An opaque saved machine context: just the stack pointer at the moment
/// of the switch. Everything else lives on the stack itself.
#[repr(transparent)]
#[derive(Clone, Copy)]
pub struct Context(pub *mut u8);

unsafe extern "C" {
    /// Switches from the currently running context to `to`, saving the
    /// current stack pointer into `*from_out`. `arg` is passed through to
    /// whichever trampoline is entered on the other side (available in a
    /// register on fiber first-entry; ignored on every later resume).
    ///
    /// # Safety
    /// `to` must be a context previously produced by
    /// [`make_initial_context`] or by a prior `swap_into` on the same
    /// stack; `from_out` must be a valid, writable location that outlives
    /// the switched-away context (it is read back once control returns).
    fn cordrt_swap_context(from_out: *mut *mut u8, to: *mut u8, arg: usize) -> usize;
}

/// Prepares a fresh stack so that resuming it for the first time calls
/// `entry(arg)`. `stack_top` must be the highest address of the stack
/// (stacks grow down on every architecture this crate supports).
pub unsafe fn make_initial_context(
    stack_top: *mut u8,
    entry: unsafe extern "C" fn(usize) -> !,
) -> Context {
    unsafe { arch::make_initial_context(stack_top, entry) }
}

/// Switches execution to `to`, storing the caller's own resume point into
/// `*from_slot` so a later switch back into this stack can find it.
///
/// # Safety
/// See `cordrt_swap_context`. `from_slot` must remain valid for as long as
/// `to`'s context (or anything it switches to) might switch back here.
pub unsafe fn swap_into(from_slot: &mut *mut u8, to: *mut u8, arg: usize) -> usize {
    unsafe { cordrt_swap_context(from_slot as *mut *mut u8, to, arg) }
}

#[cfg(target_arch = "x86_64")]
mod arch {
    use super::Context;
    use core::arch::global_asm;

    global_asm!(
        r#"
        .text
        .globl cordrt_swap_context
        .p2align 4
        cordrt_swap_context:
            // rdi = from_out, rsi = to, rdx = arg
            push rbp
            push rbx
            push r12
            push r13
            push r14
            push r15
            mov [rdi], rsp

            mov rsp, rsi
            pop r15
            pop r14
            pop r13
            pop r12
            pop rbx
            pop rbp

            mov rdi, rdx
            ret
        "#
    );

    pub unsafe fn make_initial_context(
        stack_top: *mut u8,
        entry: unsafe extern "C" fn(usize) -> !,
    ) -> Context {
        // Build a stack frame that, once popped by `cordrt_swap_context`'s
        // epilogue, leaves `entry` as the return address and `arg` in rdi
        // via the `mov rdi, rdx` / `ret` tail above.
        //
        // The SysV ABI guarantees rsp ≡ 8 (mod 16) on entry to a normally
        // called function (the `call` instruction's return-address push
        // knocks a 16-aligned caller stack out of alignment by one word).
        // The extra `- 8` below reproduces that offset: without it, `ret`
        // lands `entry` on a 16-aligned rsp instead, which any callee that
        // assumes standard ABI alignment (spilled SSE registers, libc
        // routines using `movaps`) can fault on.
        let mut sp = ((stack_top as usize) & !0xf) - 8;
        unsafe {
            sp -= 8;
            *(sp as *mut usize) = entry as usize; // return address for `ret`
            sp -= 8 * 6; // r15 r14 r13 r12 rbx rbp, all zeroed
            core::ptr::write_bytes(sp as *mut u8, 0, 8 * 6);
        }
        Context(sp as *mut u8)
    }
}

#[cfg(target_arch = "aarch64")]
mod arch {
    use super::Context;
    use core::arch::global_asm;

    global_asm!(
        r#"
        .text
        .globl cordrt_swap_context
        .p2align 2
        cordrt_swap_context:
            // x0 = from_out, x1 = to, x2 = arg
            stp x19, x20, [sp, #-0x70]!
            stp x21, x22, [sp, #0x10]
            stp x23, x24, [sp, #0x20]
            stp x25, x26, [sp, #0x30]
            stp x27, x28, [sp, #0x40]
            stp x29, x30, [sp, #0x50]
            mov x3, sp
            str x3, [x0]

            mov sp, x1
            ldp x21, x22, [sp, #0x10]
            ldp x23, x24, [sp, #0x20]
            ldp x25, x26, [sp, #0x30]
            ldp x27, x28, [sp, #0x40]
            ldp x29, x30, [sp, #0x50]
            ldp x19, x20, [sp], #0x70

            mov x0, x2
            ret
        "#
    );

    pub unsafe fn make_initial_context(
        stack_top: *mut u8,
        entry: unsafe extern "C" fn(usize) -> !,
    ) -> Context {
        let mut sp = (stack_top as usize) & !0xf;
        sp -= 0x70;
        unsafe {
            core::ptr::write_bytes(sp as *mut u8, 0, 0x70);
            // x29/x30 pair lives at offset 0x50; x30 (the link register
            // slot) is the second word, restored into `ret`'s target.
            *((sp + 0x58) as *mut usize) = entry as usize;
        }
        Context(sp as *mut u8)
    }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
mod arch {
    compile_error!(
        "cordrt has no fiber context-switch implementation for this target architecture"
    );
}
