//! # wire-io
//!
//! Cooperative shims over blocking OS calls for wire tasks.
//!
//! Each shim keeps the native call's arguments, results and errors. When the
//! native call would block, the calling task is parked on the runtime's
//! poller and the call is issued again once the descriptor is ready, so the
//! other tasks keep running in the meantime.
//!
//! ## Modules
//!
//! - `syscall` - The shim catalogue (files, sockets, resolver, ioctl)
//! - `classify` - Would-block classification per call
//! - `net` - `WireListener` / `WireStream` over the socket shims
//! - `netdb` - Owned `getaddrinfo` / `getifaddrs` result lists
//! - `addr` - `SocketAddr` to and from native socket addresses

pub mod addr;
pub mod classify;
pub mod net;
pub mod netdb;
pub mod syscall;

pub use classify::{classify, IoOp, Outcome};
pub use net::{resolve, WireListener, WireStream};
pub use netdb::{AddrInfoList, GaiError, IfAddrList};
pub use syscall::{
    accept4, close, connect, fallocate, fstat, fstatfs, fsync, ftruncate, getaddrinfo, getifaddrs,
    ioctl, open, pread, pwrite, read, read_timeout, recv, send, send_all, set_nonblocking, stat,
    statfs, write, write_timeout, IoctlRequest,
};

// Native flag types the shims take
pub use nix::errno::Errno;
pub use nix::fcntl::{FallocateFlags, OFlag};
pub use nix::sys::stat::Mode;
