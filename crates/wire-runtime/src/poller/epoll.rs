//! epoll backend
//!
//! Descriptors are registered level-triggered and the one-shot behaviour is
//! done by hand: after waking the waiters of a direction, the registration
//! is narrowed (EPOLL_CTL_MOD) or removed (EPOLL_CTL_DEL). This keeps one
//! registration per descriptor even with readers and writers waiting on it
//! at the same time.

use std::collections::HashMap;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use nix::errno::Errno;
use wire_core::{kdebug, Interest, TaskId, WireError, WireResult};

use super::{PollOutcome, Poller};

const READ_EVENTS: u32 = (libc::EPOLLIN | libc::EPOLLRDHUP) as u32;
const WRITE_EVENTS: u32 = libc::EPOLLOUT as u32;
const HANGUP_EVENTS: u32 = (libc::EPOLLHUP | libc::EPOLLERR) as u32;

/// Waiters on one descriptor
#[derive(Debug, Default)]
struct FdWaiters {
    /// Indexed by `Interest::as_index`
    waiters: [Vec<TaskId>; 2],
    /// Event mask currently installed in the kernel (0 = not registered)
    registered: u32,
}

impl FdWaiters {
    fn wanted(&self) -> u32 {
        let mut mask = 0;
        if !self.waiters[Interest::Readable.as_index()].is_empty() {
            mask |= READ_EVENTS;
        }
        if !self.waiters[Interest::Writable.as_index()].is_empty() {
            mask |= WRITE_EVENTS;
        }
        mask
    }

    fn len(&self) -> usize {
        self.waiters[0].len() + self.waiters[1].len()
    }
}

pub struct EpollPoller {
    epfd: OwnedFd,
    events: Vec<libc::epoll_event>,
    fds: HashMap<RawFd, FdWaiters>,
    pending: usize,
}

impl EpollPoller {
    /// Create an epoll instance fetching up to `max_events` per wait
    pub fn new(max_events: usize) -> WireResult<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(WireError::Poll(Errno::last() as i32));
        }

        Ok(Self {
            // SAFETY: fresh descriptor owned by nobody else
            epfd: unsafe { OwnedFd::from_raw_fd(fd) },
            events: vec![libc::epoll_event { events: 0, u64: 0 }; max_events.max(1)],
            fds: HashMap::new(),
            pending: 0,
        })
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, mask: u32) -> Result<(), Errno> {
        let mut event = libc::epoll_event {
            events: mask,
            u64: fd as u64,
        };
        let ret = unsafe { libc::epoll_ctl(self.epfd.as_raw_fd(), op, fd, &mut event) };
        if ret < 0 {
            Err(Errno::last())
        } else {
            Ok(())
        }
    }

    /// Bring the kernel registration of `fd` in line with its waiters
    fn sync(&mut self, fd: RawFd) -> Result<(), Errno> {
        let Some(entry) = self.fds.get(&fd) else {
            return Ok(());
        };
        let (wanted, registered) = (entry.wanted(), entry.registered);

        if wanted == registered {
            return Ok(());
        }

        if wanted == 0 {
            // The descriptor may already be closed, which removed it
            let _ = self.ctl(libc::EPOLL_CTL_DEL, fd, 0);
            self.fds.remove(&fd);
            return Ok(());
        }

        let result = if registered == 0 {
            match self.ctl(libc::EPOLL_CTL_ADD, fd, wanted) {
                Err(Errno::EEXIST) => self.ctl(libc::EPOLL_CTL_MOD, fd, wanted),
                other => other,
            }
        } else {
            match self.ctl(libc::EPOLL_CTL_MOD, fd, wanted) {
                Err(Errno::ENOENT) => self.ctl(libc::EPOLL_CTL_ADD, fd, wanted),
                other => other,
            }
        };

        if result.is_ok() {
            if let Some(entry) = self.fds.get_mut(&fd) {
                entry.registered = wanted;
            }
        }
        result
    }

    fn timeout_ms(timeout: Option<Duration>) -> libc::c_int {
        match timeout {
            None => -1,
            // Round up so a short timer does not turn into a busy loop
            Some(d) => {
                let ms = d.as_nanos().div_ceil(1_000_000);
                ms.min(libc::c_int::MAX as u128) as libc::c_int
            }
        }
    }
}

impl Poller for EpollPoller {
    fn register_interest(&mut self, fd: RawFd, interest: Interest, task: TaskId) -> WireResult<()> {
        let list = &mut self.fds.entry(fd).or_default().waiters[interest.as_index()];
        if list.contains(&task) {
            return Ok(());
        }
        list.push(task);
        self.pending += 1;

        if let Err(errno) = self.sync(fd) {
            self.deregister_interest(fd, interest, task);
            return Err(WireError::Poll(errno as i32));
        }
        Ok(())
    }

    fn deregister_interest(&mut self, fd: RawFd, interest: Interest, task: TaskId) {
        let Some(entry) = self.fds.get_mut(&fd) else {
            return;
        };
        let list = &mut entry.waiters[interest.as_index()];
        let Some(pos) = list.iter().position(|t| *t == task) else {
            return;
        };
        list.swap_remove(pos);
        self.pending -= 1;

        if entry.len() == 0 && entry.registered == 0 {
            self.fds.remove(&fd);
        } else if let Err(errno) = self.sync(fd) {
            kdebug!("epoll: narrowing fd {} failed: {}", fd, errno);
        }
    }

    fn run_once(&mut self, timeout: Option<Duration>, ready: &mut Vec<TaskId>) -> WireResult<PollOutcome> {
        if self.fds.is_empty() && timeout.is_none() {
            return Ok(PollOutcome::Exhausted);
        }

        let n = unsafe {
            libc::epoll_wait(
                self.epfd.as_raw_fd(),
                self.events.as_mut_ptr(),
                self.events.len() as libc::c_int,
                Self::timeout_ms(timeout),
            )
        };

        if n < 0 {
            return match Errno::last() {
                Errno::EINTR => Ok(PollOutcome::Events(0)),
                errno => Err(WireError::Poll(errno as i32)),
            };
        }
        if n == 0 {
            return Ok(PollOutcome::TimedOut);
        }

        let before = ready.len();
        for i in 0..n as usize {
            // epoll_event is packed on x86_64; copy fields out by value
            let event = self.events[i];
            let bits = event.events;
            let fd = event.u64 as RawFd;

            let Some(entry) = self.fds.get_mut(&fd) else {
                continue;
            };
            let hangup = bits & HANGUP_EVENTS != 0;

            if hangup || bits & READ_EVENTS != 0 {
                let woken = &mut entry.waiters[Interest::Readable.as_index()];
                self.pending -= woken.len();
                ready.append(woken);
            }
            if hangup || bits & WRITE_EVENTS != 0 {
                let woken = &mut entry.waiters[Interest::Writable.as_index()];
                self.pending -= woken.len();
                ready.append(woken);
            }

            if let Err(errno) = self.sync(fd) {
                kdebug!("epoll: re-arming fd {} failed: {}", fd, errno);
            }
        }

        Ok(PollOutcome::Events(ready.len() - before))
    }

    fn pending(&self) -> usize {
        self.pending
    }
}
