//! x86_64 context switching implementation
//!
//! System V AMD64: rbx, rbp, r12-r15 and rsp are callee-saved. Everything
//! else is clobbered by the `extern "C"` call into `context_switch`, so the
//! compiler already spills it.

use std::arch::naked_asm;

use wire_core::constants::STACK_ALIGN;

/// Callee-saved registers of a suspended context
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SavedRegs {
    pub rsp: u64, // 0x00
    pub rip: u64, // 0x08
    pub rbx: u64, // 0x10
    pub rbp: u64, // 0x18
    pub r12: u64, // 0x20
    pub r13: u64, // 0x28
    pub r14: u64, // 0x30
    pub r15: u64, // 0x38
}

impl SavedRegs {
    #[inline]
    pub fn stack_pointer(&self) -> u64 {
        self.rsp
    }
}

/// Initialize a new context
///
/// When first switched to, execution begins in the trampoline, which calls
/// `entry_fn(entry_arg)`.
///
/// # Safety
///
/// `regs` must point to valid `SavedRegs` memory.
/// `stack_top` must be the high end of a mapped, writable stack.
#[inline]
pub unsafe fn init_context(
    regs: *mut SavedRegs,
    stack_top: *mut u8,
    entry_fn: usize,
    entry_arg: usize,
) {
    // rsp is 16-aligned here; the trampoline's `call` pushes the return
    // address, leaving rsp + 8 aligned at entry as the ABI requires.
    let aligned_sp = (stack_top as usize) & !(STACK_ALIGN - 1);

    let regs = &mut *regs;
    regs.rsp = aligned_sp as u64;
    regs.rip = wire_entry_trampoline as usize as u64;
    regs.rbx = 0;
    regs.rbp = 0;
    regs.r12 = entry_fn as u64;
    regs.r13 = entry_arg as u64;
    regs.r14 = 0;
    regs.r15 = 0;
}

/// Trampoline that calls the entry function with its argument
#[unsafe(naked)]
unsafe extern "C" fn wire_entry_trampoline() {
    naked_asm!(
        "mov rdi, r13",
        "call r12",
        // Entry functions never return
        "ud2",
    );
}

/// Save callee-saved registers to `old_regs`, load from `new_regs`
///
/// Returns when something switches back into `old_regs`.
///
/// # Safety
///
/// `new_regs` must hold a context produced by `init_context` or by an
/// earlier `context_switch`, whose stack is still mapped.
#[unsafe(naked)]
pub unsafe extern "C" fn context_switch(_old_regs: *mut SavedRegs, _new_regs: *const SavedRegs) {
    naked_asm!(
        // Save to old_regs (RDI)
        "mov [rdi + 0x00], rsp",
        "lea rax, [rip + 2f]",
        "mov [rdi + 0x08], rax",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], rbp",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x28], r13",
        "mov [rdi + 0x30], r14",
        "mov [rdi + 0x38], r15",
        // Load from new_regs (RSI)
        "mov rsp, [rsi + 0x00]",
        "mov rax, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov rbp, [rsi + 0x18]",
        "mov r12, [rsi + 0x20]",
        "mov r13, [rsi + 0x28]",
        "mov r14, [rsi + 0x30]",
        "mov r15, [rsi + 0x38]",
        "jmp rax",
        // Resume point of a saved context
        "2:",
        "ret",
    );
}
