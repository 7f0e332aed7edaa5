//! Unix stack allocation using mmap

use super::Stack;
use nix::errno::Errno;
use wire_core::constants::{GUARD_SIZE, MIN_STACK_SIZE};
use wire_core::kerror;
use wire_core::StackError;

pub(super) fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        4096
    } else {
        size as usize
    }
}

impl Stack {
    /// Map a stack with at least `size` usable bytes plus a guard page
    ///
    /// `size` is rounded up to whole pages.
    pub fn new(size: usize) -> Result<Stack, StackError> {
        if size < MIN_STACK_SIZE {
            return Err(StackError::TooSmall {
                requested: size,
                minimum: MIN_STACK_SIZE,
            });
        }

        let page = page_size();
        let guard = GUARD_SIZE.max(page);
        let total = size
            .checked_add(page - 1)
            .map(|s| s & !(page - 1))
            .and_then(|usable| usable.checked_add(guard))
            .ok_or(StackError::TooLarge(size))?;

        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                total,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_STACK | libc::MAP_NORESERVE,
                -1,
                0,
            )
        };

        if base == libc::MAP_FAILED {
            return Err(StackError::AllocationFailed(Errno::last() as i32));
        }

        // Guard page at the low end; overflow faults here
        let ret = unsafe { libc::mprotect(base, guard, libc::PROT_NONE) };
        if ret != 0 {
            let errno = Errno::last() as i32;
            unsafe { libc::munmap(base, total) };
            return Err(StackError::ProtectionFailed(errno));
        }

        Ok(Stack {
            base: base as *mut u8,
            total,
            guard,
        })
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        let ret = unsafe { libc::munmap(self.base as *mut libc::c_void, self.total) };
        if ret != 0 {
            kerror!("munmap of stack {:p} failed: {}", self.base, Errno::last());
        }
    }
}
