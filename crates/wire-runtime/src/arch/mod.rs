//! Architecture-specific context switching
//!
//! Each backend exports the same three items:
//! - `SavedRegs` - callee-saved register block of a suspended context
//! - `init_context` - prepare a fresh context that enters `entry(arg)`
//! - `context_switch` - save the current context, resume another
//!
//! A context is resumed exactly where it last called `context_switch`.
//! Entry functions never return; they must switch away for the last time.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        pub mod x86_64;
        pub use self::x86_64::{context_switch, init_context, SavedRegs};
    } else if #[cfg(target_arch = "aarch64")] {
        pub mod aarch64;
        pub use self::aarch64::{context_switch, init_context, SavedRegs};
    } else {
        compile_error!("wire supports x86_64 and aarch64 only");
    }
}

/// Signature of a context entry point
pub type EntryFn = extern "C" fn(usize) -> !;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Stack;
    use std::cell::{Cell, UnsafeCell};

    struct PingPong {
        main: UnsafeCell<SavedRegs>,
        task: UnsafeCell<SavedRegs>,
        hits: Cell<u32>,
    }

    extern "C" fn pong(arg: usize) -> ! {
        let pp = unsafe { &*(arg as *const PingPong) };
        loop {
            pp.hits.set(pp.hits.get() + 1);
            unsafe { context_switch(pp.task.get(), pp.main.get()) };
        }
    }

    #[test]
    fn test_ping_pong() {
        let stack = Stack::new(16 * 1024).unwrap();
        let pp = PingPong {
            main: UnsafeCell::new(SavedRegs::default()),
            task: UnsafeCell::new(SavedRegs::default()),
            hits: Cell::new(0),
        };

        unsafe {
            init_context(
                pp.task.get(),
                stack.top(),
                pong as EntryFn as usize,
                &pp as *const PingPong as usize,
            );
        }

        for round in 1..=3 {
            unsafe { context_switch(pp.main.get(), pp.task.get()) };
            assert_eq!(pp.hits.get(), round);
        }
    }

    #[test]
    fn test_initial_sp_aligned() {
        let stack = Stack::new(8 * 1024).unwrap();
        let mut regs = SavedRegs::default();
        unsafe { init_context(&mut regs, stack.top(), pong as EntryFn as usize, 0) };
        assert_eq!(regs.stack_pointer() as usize % wire_core::constants::STACK_ALIGN, 0);
        assert!(stack.contains(regs.stack_pointer() as usize - 1));
    }
}
