//! Task identifier type

use core::fmt;

/// Unique identifier for a task
///
/// The slot indexes into the scheduler's task table. The generation is
/// bumped every time a slot is reused, so an id held by the poller or a
/// timer after its task finished never matches the slot's new occupant.
/// A slot of `u32::MAX` is reserved as a sentinel for "no task".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId {
    slot: u32,
    generation: u32,
}

impl TaskId {
    /// Sentinel value indicating no task
    pub const NONE: TaskId = TaskId { slot: u32::MAX, generation: 0 };

    /// Create a new TaskId from a slot and generation
    #[inline]
    pub const fn new(slot: u32, generation: u32) -> Self {
        TaskId { slot, generation }
    }

    /// Get the slot index
    #[inline]
    pub const fn slot(self) -> u32 {
        self.slot
    }

    /// Get the slot as usize for indexing
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.slot as usize
    }

    /// Get the generation of the slot this id was issued for
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Check if this is the NONE sentinel
    #[inline]
    pub const fn is_none(self) -> bool {
        self.slot == u32::MAX
    }

    /// Check if this is a valid task ID
    #[inline]
    pub const fn is_some(self) -> bool {
        self.slot != u32::MAX
    }

    /// Convert to Option
    #[inline]
    pub const fn to_option(self) -> Option<TaskId> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }

    /// Pack into a u64 (generation in the high half).
    ///
    /// Used as epoll user data and anywhere an id must cross a C boundary.
    #[inline]
    pub const fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.slot as u64
    }

    /// Inverse of [`TaskId::to_bits`]
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        TaskId {
            slot: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "TaskId(NONE)")
        } else {
            write!(f, "TaskId({}g{})", self.slot, self.generation)
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.slot)
        }
    }
}

impl Default for TaskId {
    fn default() -> Self {
        TaskId::NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_basics() {
        let id = TaskId::new(42, 3);
        assert_eq!(id.slot(), 42);
        assert_eq!(id.as_usize(), 42);
        assert_eq!(id.generation(), 3);
        assert!(!id.is_none());
        assert!(id.is_some());
    }

    #[test]
    fn test_task_id_none() {
        let none = TaskId::NONE;
        assert!(none.is_none());
        assert!(!none.is_some());
        assert_eq!(none.to_option(), None);
        assert_eq!(TaskId::default(), TaskId::NONE);
    }

    #[test]
    fn test_task_id_bits() {
        let id = TaskId::new(7, 0xdead);
        assert_eq!(TaskId::from_bits(id.to_bits()), id);
        assert_ne!(TaskId::new(7, 1), TaskId::new(7, 2));
    }

    #[test]
    fn test_task_id_display() {
        assert_eq!(format!("{}", TaskId::new(5, 9)), "5");
        assert_eq!(format!("{:?}", TaskId::new(5, 9)), "TaskId(5g9)");
        assert_eq!(format!("{}", TaskId::NONE), "none");
    }
}
