//! Readiness poller abstraction
//!
//! The scheduler only talks to a `Poller`: it registers one-shot interest
//! on behalf of a blocked task and later asks for the tasks whose
//! descriptors became ready. The poller never owns tasks, only ids.
//!
//! # Implementations
//! - `EpollPoller` - Linux epoll, level-triggered with manual one-shot

mod epoll;

pub use epoll::EpollPoller;

use std::os::fd::RawFd;
use std::time::Duration;

use wire_core::{Interest, TaskId, WireResult};

/// Result of one `run_once` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Returned from the wait; this many task ids were appended
    Events(usize),
    /// The timeout elapsed with nothing ready
    TimedOut,
    /// Nothing registered and no timeout: waiting would never return
    Exhausted,
}

/// Trait for readiness backends
pub trait Poller {
    /// Wake `task` once `fd` is ready for `interest`.
    ///
    /// Interest is one-shot: after the task is reported, the registration
    /// is gone. Several tasks may wait on the same descriptor and
    /// direction; all of them are reported together.
    fn register_interest(&mut self, fd: RawFd, interest: Interest, task: TaskId) -> WireResult<()>;

    /// Drop a registration that was never reported (timeout, cancel)
    fn deregister_interest(&mut self, fd: RawFd, interest: Interest, task: TaskId);

    /// Wait up to `timeout` (`None` = forever) and append woken task ids to `ready`
    fn run_once(&mut self, timeout: Option<Duration>, ready: &mut Vec<TaskId>) -> WireResult<PollOutcome>;

    /// Number of outstanding registrations
    fn pending(&self) -> usize;
}
