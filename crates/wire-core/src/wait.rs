//! Wait records
//!
//! A wait record ties a blocked task to the one condition that will make it
//! ready again. The poller and the timer queue only ever see task ids; they
//! never own the task.

use core::fmt;
use std::os::raw::c_int;
use std::time::Instant;

/// Direction of readiness a task waits for on a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interest {
    Readable,
    Writable,
}

impl Interest {
    /// Index for two-slot tables (read = 0, write = 1)
    #[inline]
    pub const fn as_index(self) -> usize {
        match self {
            Interest::Readable => 0,
            Interest::Writable => 1,
        }
    }
}

impl fmt::Display for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interest::Readable => write!(f, "read"),
            Interest::Writable => write!(f, "write"),
        }
    }
}

/// What a blocked task is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    /// Descriptor readiness in one direction
    Fd { fd: c_int, interest: Interest },
    /// Nothing but the deadline (sleep)
    Timer,
}

/// Outstanding wait of one task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitRecord {
    pub condition: WaitCondition,
    /// Optional deadline after which the task is woken with `TimedOut`
    pub deadline: Option<Instant>,
    /// Sequence number, lets the timer queue discard stale entries
    pub seq: u64,
}

impl WaitRecord {
    pub fn fd(fd: c_int, interest: Interest, deadline: Option<Instant>, seq: u64) -> Self {
        Self {
            condition: WaitCondition::Fd { fd, interest },
            deadline,
            seq,
        }
    }

    pub fn timer(deadline: Instant, seq: u64) -> Self {
        Self {
            condition: WaitCondition::Timer,
            deadline: Some(deadline),
            seq,
        }
    }

    /// The descriptor half of the record, if any
    pub fn fd_interest(&self) -> Option<(c_int, Interest)> {
        match self.condition {
            WaitCondition::Fd { fd, interest } => Some((fd, interest)),
            WaitCondition::Timer => None,
        }
    }
}

/// Why a blocked task was made ready again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The poller reported the condition satisfied
    Ready,
    /// The deadline passed first
    TimedOut,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_interest_index() {
        assert_eq!(Interest::Readable.as_index(), 0);
        assert_eq!(Interest::Writable.as_index(), 1);
    }

    #[test]
    fn test_wait_record_kinds() {
        let rec = WaitRecord::fd(4, Interest::Writable, None, 1);
        assert_eq!(rec.fd_interest(), Some((4, Interest::Writable)));

        let at = Instant::now() + Duration::from_millis(5);
        let rec = WaitRecord::timer(at, 2);
        assert_eq!(rec.fd_interest(), None);
        assert_eq!(rec.deadline, Some(at));
    }
}
