//! Task stacks
//!
//! Each stack is its own anonymous mapping with one PROT_NONE guard page at
//! the low end. Stacks grow down, so running off the end faults instead of
//! scribbling over a neighbour.
//!
//! ```text
//! base                   base + guard                        top
//! |  guard (PROT_NONE)   |  usable (RW)  <---- grows down     |
//! ```

mod unix;

/// An owned, mapped task stack. Unmapped on drop.
pub struct Stack {
    base: *mut u8,
    total: usize,
    guard: usize,
}

impl Stack {
    /// Highest address of the stack (exclusive), where execution starts
    #[inline]
    pub fn top(&self) -> *mut u8 {
        // SAFETY: base..base+total is one mapping
        unsafe { self.base.add(self.total) }
    }

    /// Lowest usable address, just above the guard page
    #[inline]
    pub fn bottom(&self) -> *mut u8 {
        unsafe { self.base.add(self.guard) }
    }

    /// Usable bytes, excluding the guard page
    #[inline]
    pub fn usable_size(&self) -> usize {
        self.total - self.guard
    }

    /// Whether `addr` falls in the usable part of this stack
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.bottom() as usize && addr < self.top() as usize
    }
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("bottom", &self.bottom())
            .field("top", &self.top())
            .field("usable", &self.usable_size())
            .finish()
    }
}
