//! Error types for the wire runtime

use core::fmt;

use crate::id::TaskId;
use crate::state::TaskState;

/// Result type for runtime operations
pub type WireResult<T> = Result<T, WireError>;

/// Errors that can occur in runtime operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// `run()` called on a context that is already running
    AlreadyRunning,

    /// Every remaining task is blocked and nothing can ever wake them
    Deadlock { blocked: usize },

    /// The run loop was about to switch into a finished task
    ResumedFinished(TaskId),

    /// A task came back to the scheduler in a state it cannot be in
    InvalidState(TaskId, TaskState),

    /// Configuration rejected by `validate()`
    InvalidConfig(&'static str),

    /// Stack allocation or protection failed
    Stack(StackError),

    /// The poller failed (raw errno)
    Poll(i32),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::AlreadyRunning => write!(f, "scheduler already running"),
            WireError::Deadlock { blocked } => {
                write!(f, "deadlock: {} task(s) blocked with no pending events", blocked)
            }
            WireError::ResumedFinished(id) => write!(f, "attempt to resume finished task {}", id),
            WireError::InvalidState(id, state) => {
                write!(f, "task {} returned to scheduler in state {}", id, state)
            }
            WireError::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
            WireError::Stack(e) => write!(f, "stack error: {}", e),
            WireError::Poll(errno) => write!(f, "poller error: errno {}", errno),
        }
    }
}

impl std::error::Error for WireError {}

/// Stack-related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackError {
    /// Requested size below the allocator minimum
    TooSmall { requested: usize, minimum: usize },

    /// Size overflowed when rounding up to pages
    TooLarge(usize),

    /// mmap failed (errno)
    AllocationFailed(i32),

    /// mprotect on the guard page failed (errno)
    ProtectionFailed(i32),
}

impl fmt::Display for StackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackError::TooSmall { requested, minimum } => {
                write!(f, "stack of {} bytes is below minimum {}", requested, minimum)
            }
            StackError::TooLarge(size) => write!(f, "stack of {} bytes is too large", size),
            StackError::AllocationFailed(errno) => write!(f, "stack mmap failed: errno {}", errno),
            StackError::ProtectionFailed(errno) => {
                write!(f, "guard page mprotect failed: errno {}", errno)
            }
        }
    }
}

impl std::error::Error for StackError {}

impl From<StackError> for WireError {
    fn from(e: StackError) -> Self {
        WireError::Stack(e)
    }
}
