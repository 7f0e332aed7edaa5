//! Task state type

use core::fmt;

/// State of a task
///
/// ```text
///   spawn ──► Ready ──dispatch──► Running ──entry returns──► Done
///               ▲                  │   │
///               └──── yield ───────┘   │ wait registered
///               ▲                      ▼
///               └──── woken ────── Blocked
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    /// Eligible to run, waiting in the ready queue
    Ready = 0,

    /// Currently executing (at most one task at a time)
    Running = 1,

    /// Suspended on a wait record, not in the ready queue
    Blocked = 2,

    /// Entry routine returned; never scheduled again
    Done = 3,
}

impl TaskState {
    /// Check if this state allows the task to be dispatched
    #[inline]
    pub const fn is_runnable(&self) -> bool {
        matches!(self, TaskState::Ready)
    }

    /// Check if this task has terminated
    #[inline]
    pub const fn is_terminated(&self) -> bool {
        matches!(self, TaskState::Done)
    }

    /// Check whether `self -> next` is a legal transition
    pub const fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Ready, TaskState::Running)
                | (TaskState::Running, TaskState::Ready)
                | (TaskState::Running, TaskState::Blocked)
                | (TaskState::Running, TaskState::Done)
                | (TaskState::Blocked, TaskState::Ready)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Ready => write!(f, "READY"),
            TaskState::Running => write!(f, "RUNNING"),
            TaskState::Blocked => write!(f, "BLOCKED"),
            TaskState::Done => write!(f, "DONE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(TaskState::Ready.is_runnable());
        assert!(!TaskState::Running.is_runnable());
        assert!(!TaskState::Blocked.is_runnable());

        assert!(TaskState::Done.is_terminated());
        assert!(!TaskState::Running.is_terminated());
    }

    #[test]
    fn test_state_transitions() {
        assert!(TaskState::Ready.can_transition_to(TaskState::Running));
        assert!(TaskState::Running.can_transition_to(TaskState::Ready));
        assert!(TaskState::Running.can_transition_to(TaskState::Blocked));
        assert!(TaskState::Running.can_transition_to(TaskState::Done));
        assert!(TaskState::Blocked.can_transition_to(TaskState::Ready));

        assert!(!TaskState::Done.can_transition_to(TaskState::Running));
        assert!(!TaskState::Done.can_transition_to(TaskState::Ready));
        assert!(!TaskState::Blocked.can_transition_to(TaskState::Running));
        assert!(!TaskState::Ready.can_transition_to(TaskState::Done));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(TaskState::Blocked.to_string(), "BLOCKED");
    }
}
