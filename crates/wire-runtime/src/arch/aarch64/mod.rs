//! aarch64 context switching implementation
//!
//! AAPCS64: x19-x28, the frame pointer (x29), the link register (x30), sp
//! and the low halves of v8-v15 (d8-d15) are callee-saved.

use std::arch::naked_asm;

use wire_core::constants::STACK_ALIGN;

/// Callee-saved registers of a suspended context
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SavedRegs {
    pub sp: u64,       // 0x00
    pub pc: u64,       // 0x08
    pub x: [u64; 10],  // 0x10 x19..x28
    pub fp: u64,       // 0x60 x29
    pub lr: u64,       // 0x68 x30
    pub d: [u64; 8],   // 0x70 d8..d15
}

impl SavedRegs {
    #[inline]
    pub fn stack_pointer(&self) -> u64 {
        self.sp
    }
}

/// Initialize a new context
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
    let regs = &mut *regs;
    *regs = SavedRegs::default();
    regs.sp = ((stack_top as usize) & !(STACK_ALIGN - 1)) as u64;
    regs.pc = wire_entry_trampoline as usize as u64;
    regs.x[0] = entry_fn as u64; // x19
    regs.x[1] = entry_arg as u64; // x20
}

/// Trampoline that calls the entry function with its argument
#[unsafe(naked)]
unsafe extern "C" fn wire_entry_trampoline() {
    naked_asm!(
        "mov x0, x20",
        "blr x19",
        // Entry functions never return
        "brk #0",
    );
}

/// Save callee-saved registers to `old_regs`, load from `new_regs`
///
/// # Safety
///
/// Same contract as the x86_64 backend.
#[unsafe(naked)]
pub unsafe extern "C" fn context_switch(_old_regs: *mut SavedRegs, _new_regs: *const SavedRegs) {
    naked_asm!(
        // Save to old_regs (x0)
        "mov x9, sp",
        "str x9, [x0, #0x00]",
        "adr x10, 2f",
        "str x10, [x0, #0x08]",
        "stp x19, x20, [x0, #0x10]",
        "stp x21, x22, [x0, #0x20]",
        "stp x23, x24, [x0, #0x30]",
        "stp x25, x26, [x0, #0x40]",
        "stp x27, x28, [x0, #0x50]",
        "stp x29, x30, [x0, #0x60]",
        "stp d8, d9, [x0, #0x70]",
        "stp d10, d11, [x0, #0x80]",
        "stp d12, d13, [x0, #0x90]",
        "stp d14, d15, [x0, #0xa0]",
        // Load from new_regs (x1)
        "ldr x9, [x1, #0x00]",
        "mov sp, x9",
        "ldr x10, [x1, #0x08]",
        "ldp x19, x20, [x1, #0x10]",
        "ldp x21, x22, [x1, #0x20]",
        "ldp x23, x24, [x1, #0x30]",
        "ldp x25, x26, [x1, #0x40]",
        "ldp x27, x28, [x1, #0x50]",
        "ldp x29, x30, [x1, #0x60]",
        "ldp d8, d9, [x1, #0x70]",
        "ldp d10, d11, [x1, #0x80]",
        "ldp d12, d13, [x1, #0x90]",
        "ldp d14, d15, [x1, #0xa0]",
        "br x10",
        // Resume point of a saved context; lr was restored above
        "2:",
        "ret",
    );
}
