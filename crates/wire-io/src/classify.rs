//! Outcome classification for native calls
//!
//! Every retrying shim runs the same loop:
//!
//! ```text
//! issue ──▶ classify ──Completed──▶ return value
//!   ▲          │ ──────Failed─────▶ return errno unchanged
//!   │          └──WouldBlock──▶ wait_fd(fd, interest) ──ready──┐
//!   └──────────────────────────────────────────────────────────┘
//! ```

use nix::errno::Errno;
use wire_core::Interest;

/// The wrapped calls that can report would-block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Read,
    Pread,
    Recv,
    Accept,
    Write,
    Pwrite,
    Send,
    Connect,
}

impl IoOp {
    /// Direction to wait for when this call would block
    pub const fn interest(self) -> Interest {
        match self {
            IoOp::Read | IoOp::Pread | IoOp::Recv | IoOp::Accept => Interest::Readable,
            IoOp::Write | IoOp::Pwrite | IoOp::Send | IoOp::Connect => Interest::Writable,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            IoOp::Read => "read",
            IoOp::Pread => "pread",
            IoOp::Recv => "recv",
            IoOp::Accept => "accept4",
            IoOp::Write => "write",
            IoOp::Pwrite => "pwrite",
            IoOp::Send => "send",
            IoOp::Connect => "connect",
        }
    }

    /// Errno meaning "not yet, try again when ready"
    const fn would_block_errno(self) -> Errno {
        match self {
            IoOp::Connect => Errno::EINPROGRESS,
            // EWOULDBLOCK == EAGAIN on Linux
            _ => Errno::EAGAIN,
        }
    }
}

/// How one native call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<T> {
    Completed(T),
    /// Suspend until `interest`; `errno` is what the call returned
    WouldBlock { interest: Interest, errno: Errno },
    /// EINTR and every other error; handed back as is
    Failed(Errno),
}

/// Classify the result of issuing `op` once
pub fn classify<T>(op: IoOp, result: nix::Result<T>) -> Outcome<T> {
    match result {
        Ok(value) => Outcome::Completed(value),
        Err(errno) if errno == op.would_block_errno() => Outcome::WouldBlock {
            interest: op.interest(),
            errno,
        },
        Err(errno) => Outcome::Failed(errno),
    }
}
