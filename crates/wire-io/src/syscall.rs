//! # Cooperative syscall shims
//!
//! One wrapper per wrapped OS call. From the task's point of view each is an
//! ordinary blocking call with native argument types and native errors;
//! under the hood a would-block result parks the task on the poller and the
//! call is issued again once the descriptor is ready.
//!
//! ```ignore
//! // Inside a task:
//! let n = wire_io::read(w, fd, &mut buf)?;
//! wire_io::send_all(w, sock, b"pong")?;
//! ```
//!
//! Descriptors must be non-blocking for the retrying calls to cooperate. A
//! blocking descriptor stalls the whole thread, exactly as the native call
//! would. Every shim panics when called outside a running task.

use std::ffi::CStr;
use std::mem::{self, MaybeUninit};
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::ptr;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::fcntl::{FallocateFlags, OFlag};
use nix::sys::stat::Mode;
use nix::NixPath;
use wire_core::{ktrace, kwarn, Readiness};
use wire_runtime::Wire;

use crate::addr;
use crate::classify::{classify, IoOp, Outcome};
use crate::netdb::{AddrInfoList, GaiError, IfAddrList};

/// Request type of `ioctl(2)` for the target C library
#[cfg(target_env = "musl")]
pub type IoctlRequest = libc::c_int;
#[cfg(not(target_env = "musl"))]
pub type IoctlRequest = libc::c_ulong;

#[inline]
fn enter(wire: &Wire, op: &str) {
    if wire.current().is_none() {
        panic!("{} called outside a running task", op);
    }
}

/// Issue `call` until it stops reporting would-block.
///
/// With a `timeout`, gives up with `ETIMEDOUT` once it has elapsed.
fn cooperate<T>(
    wire: &Wire,
    op: IoOp,
    fd: RawFd,
    timeout: Option<Duration>,
    mut call: impl FnMut() -> nix::Result<T>,
) -> nix::Result<T> {
    enter(wire, op.name());
    let deadline = timeout.map(|t| Instant::now() + t);

    loop {
        let (interest, errno) = match classify(op, call()) {
            Outcome::Completed(value) => return Ok(value),
            Outcome::Failed(errno) => return Err(errno),
            Outcome::WouldBlock { interest, errno } => (interest, errno),
        };

        let remaining = match deadline {
            None => None,
            Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                Some(left) if !left.is_zero() => Some(left),
                _ => return Err(Errno::ETIMEDOUT),
            },
        };

        match wire.wait_fd(fd, interest, remaining) {
            Ok(Readiness::Ready) => ktrace!("{}: fd {} ready, reissuing", op.name(), fd),
            Ok(Readiness::TimedOut) => return Err(Errno::ETIMEDOUT),
            Err(e) => {
                kwarn!("{}: cannot wait on fd {} ({}), returning {}", op.name(), fd, e, errno);
                return Err(errno);
            }
        }
    }
}

#[inline]
fn len_result(ret: isize) -> nix::Result<usize> {
    Errno::result(ret).map(|n| n as usize)
}

// ============================================================================
// Files
// ============================================================================

/// `open(2)`; pass-through
pub fn open<P: ?Sized + NixPath>(wire: &Wire, path: &P, flags: OFlag, mode: Mode) -> nix::Result<RawFd> {
    enter(wire, "open");
    let fd = path.with_nix_path(|p| unsafe {
        libc::open(p.as_ptr(), flags.bits(), mode.bits() as libc::c_uint)
    })?;
    Errno::result(fd)
}

/// `close(2)`; pass-through
pub fn close(wire: &Wire, fd: RawFd) -> nix::Result<()> {
    enter(wire, "close");
    Errno::result(unsafe { libc::close(fd) }).map(drop)
}

/// `read(2)`; parks on `Readable` while the descriptor has nothing
pub fn read(wire: &Wire, fd: RawFd, buf: &mut [u8]) -> nix::Result<usize> {
    cooperate(wire, IoOp::Read, fd, None, || {
        len_result(unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) })
    })
}

/// `read` that gives up with `ETIMEDOUT` after `timeout`
pub fn read_timeout(wire: &Wire, fd: RawFd, buf: &mut [u8], timeout: Duration) -> nix::Result<usize> {
    cooperate(wire, IoOp::Read, fd, Some(timeout), || {
        len_result(unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) })
    })
}

/// `write(2)`; parks on `Writable` while the descriptor is full
pub fn write(wire: &Wire, fd: RawFd, buf: &[u8]) -> nix::Result<usize> {
    cooperate(wire, IoOp::Write, fd, None, || {
        len_result(unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) })
    })
}

/// `write` that gives up with `ETIMEDOUT` after `timeout`
pub fn write_timeout(wire: &Wire, fd: RawFd, buf: &[u8], timeout: Duration) -> nix::Result<usize> {
    cooperate(wire, IoOp::Write, fd, Some(timeout), || {
        len_result(unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) })
    })
}

/// `pread(2)`
pub fn pread(wire: &Wire, fd: RawFd, buf: &mut [u8], offset: libc::off_t) -> nix::Result<usize> {
    cooperate(wire, IoOp::Pread, fd, None, || {
        len_result(unsafe { libc::pread(fd, buf.as_mut_ptr().cast(), buf.len(), offset) })
    })
}

/// `pwrite(2)`
pub fn pwrite(wire: &Wire, fd: RawFd, buf: &[u8], offset: libc::off_t) -> nix::Result<usize> {
    cooperate(wire, IoOp::Pwrite, fd, None, || {
        len_result(unsafe { libc::pwrite(fd, buf.as_ptr().cast(), buf.len(), offset) })
    })
}

/// `fstat(2)`; pass-through
pub fn fstat(wire: &Wire, fd: RawFd) -> nix::Result<libc::stat> {
    enter(wire, "fstat");
    let mut st = MaybeUninit::<libc::stat>::uninit();
    Errno::result(unsafe { libc::fstat(fd, st.as_mut_ptr()) })?;
    Ok(unsafe { st.assume_init() })
}

/// `stat(2)`; pass-through
pub fn stat<P: ?Sized + NixPath>(wire: &Wire, path: &P) -> nix::Result<libc::stat> {
    enter(wire, "stat");
    let mut st = MaybeUninit::<libc::stat>::uninit();
    let ret = path.with_nix_path(|p| unsafe { libc::stat(p.as_ptr(), st.as_mut_ptr()) })?;
    Errno::result(ret)?;
    Ok(unsafe { st.assume_init() })
}

/// `ftruncate(2)`; pass-through
pub fn ftruncate(wire: &Wire, fd: RawFd, length: libc::off_t) -> nix::Result<()> {
    enter(wire, "ftruncate");
    Errno::result(unsafe { libc::ftruncate(fd, length) }).map(drop)
}

/// `fallocate(2)`; pass-through
pub fn fallocate(
    wire: &Wire,
    fd: RawFd,
    mode: FallocateFlags,
    offset: libc::off_t,
    len: libc::off_t,
) -> nix::Result<()> {
    enter(wire, "fallocate");
    Errno::result(unsafe { libc::fallocate(fd, mode.bits(), offset, len) }).map(drop)
}

/// `fsync(2)`; pass-through
pub fn fsync(wire: &Wire, fd: RawFd) -> nix::Result<()> {
    enter(wire, "fsync");
    Errno::result(unsafe { libc::fsync(fd) }).map(drop)
}

/// `statfs(2)`; pass-through
pub fn statfs<P: ?Sized + NixPath>(wire: &Wire, path: &P) -> nix::Result<libc::statfs> {
    enter(wire, "statfs");
    let mut st = MaybeUninit::<libc::statfs>::uninit();
    let ret = path.with_nix_path(|p| unsafe { libc::statfs(p.as_ptr(), st.as_mut_ptr()) })?;
    Errno::result(ret)?;
    Ok(unsafe { st.assume_init() })
}

/// `fstatfs(2)`; pass-through
pub fn fstatfs(wire: &Wire, fd: RawFd) -> nix::Result<libc::statfs> {
    enter(wire, "fstatfs");
    let mut st = MaybeUninit::<libc::statfs>::uninit();
    Errno::result(unsafe { libc::fstatfs(fd, st.as_mut_ptr()) })?;
    Ok(unsafe { st.assume_init() })
}

/// `ioctl(2)`; pass-through
///
/// # Safety
///
/// `arg` must be what `request` expects on `fd`.
pub unsafe fn ioctl(wire: &Wire, fd: RawFd, request: IoctlRequest, arg: *mut libc::c_void) -> nix::Result<libc::c_int> {
    enter(wire, "ioctl");
    Errno::result(libc::ioctl(fd, request, arg))
}

// ============================================================================
// Name resolution and interfaces
// ============================================================================

/// `getaddrinfo(3)`; pass-through
pub fn getaddrinfo(
    wire: &Wire,
    node: Option<&CStr>,
    service: Option<&CStr>,
    hints: Option<&libc::addrinfo>,
) -> Result<AddrInfoList, GaiError> {
    enter(wire, "getaddrinfo");
    let mut res: *mut libc::addrinfo = ptr::null_mut();
    let code = unsafe {
        libc::getaddrinfo(
            node.map_or(ptr::null(), CStr::as_ptr),
            service.map_or(ptr::null(), CStr::as_ptr),
            hints.map_or(ptr::null(), |h| h as *const libc::addrinfo),
            &mut res,
        )
    };
    if code != 0 {
        return Err(GaiError::from_code(code));
    }
    Ok(unsafe { AddrInfoList::from_raw(res) })
}

/// `getifaddrs(3)`; pass-through
pub fn getifaddrs(wire: &Wire) -> nix::Result<IfAddrList> {
    enter(wire, "getifaddrs");
    let mut head: *mut libc::ifaddrs = ptr::null_mut();
    Errno::result(unsafe { libc::getifaddrs(&mut head) })?;
    Ok(unsafe { IfAddrList::from_raw(head) })
}

// ============================================================================
// Sockets
// ============================================================================

/// `accept4(2)`; parks on `Readable` until a connection is pending
///
/// Returns the new descriptor and the peer address when it is IPv4/IPv6.
pub fn accept4(wire: &Wire, fd: RawFd, flags: libc::c_int) -> nix::Result<(RawFd, Option<SocketAddr>)> {
    // SAFETY: all-zero is a valid sockaddr_storage
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = 0;

    let client = cooperate(wire, IoOp::Accept, fd, None, || {
        len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        Errno::result(unsafe {
            libc::accept4(fd, (&mut storage as *mut libc::sockaddr_storage).cast(), &mut len, flags)
        })
    })?;

    Ok((client, addr::from_storage(&storage, len)))
}

/// `connect(2)`; on `EINPROGRESS` parks on `Writable`, then reports the
/// socket's `SO_ERROR` as a blocking connect would have.
pub fn connect(wire: &Wire, fd: RawFd, addr: &SocketAddr) -> nix::Result<()> {
    enter(wire, "connect");
    let (storage, len) = addr::to_storage(addr);
    let ret = unsafe { libc::connect(fd, (&storage as *const libc::sockaddr_storage).cast(), len) };

    match classify(IoOp::Connect, Errno::result(ret).map(drop)) {
        Outcome::Completed(()) => Ok(()),
        Outcome::Failed(errno) => Err(errno),
        Outcome::WouldBlock { interest, errno } => {
            if let Err(e) = wire.wait_fd(fd, interest, None) {
                kwarn!("connect: cannot wait on fd {} ({}), returning {}", fd, e, errno);
                return Err(errno);
            }
            socket_error(fd)
        }
    }
}

fn socket_error(fd: RawFd) -> nix::Result<()> {
    let mut err: libc::c_int = 0;
    let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;
    Errno::result(unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            (&mut err as *mut libc::c_int).cast(),
            &mut len,
        )
    })?;
    match err {
        0 => Ok(()),
        err => Err(Errno::from_raw(err)),
    }
}

/// `recv(2)`
pub fn recv(wire: &Wire, fd: RawFd, buf: &mut [u8], flags: libc::c_int) -> nix::Result<usize> {
    cooperate(wire, IoOp::Recv, fd, None, || {
        len_result(unsafe { libc::recv(fd, buf.as_mut_ptr().cast(), buf.len(), flags) })
    })
}

/// `send(2)`
pub fn send(wire: &Wire, fd: RawFd, buf: &[u8], flags: libc::c_int) -> nix::Result<usize> {
    cooperate(wire, IoOp::Send, fd, None, || {
        len_result(unsafe { libc::send(fd, buf.as_ptr().cast(), buf.len(), flags) })
    })
}

/// Send every byte of `buf`, retrying partial sends and `EINTR`.
///
/// Uses `MSG_NOSIGNAL`, so a closed peer is `EPIPE` rather than `SIGPIPE`.
pub fn send_all(wire: &Wire, fd: RawFd, mut buf: &[u8]) -> nix::Result<usize> {
    let mut total = 0;
    while !buf.is_empty() {
        match send(wire, fd, buf, libc::MSG_NOSIGNAL) {
            Ok(n) => {
                total += n;
                buf = &buf[n..];
            }
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Put `fd` in non-blocking mode so the shims can park on it
pub fn set_nonblocking(fd: RawFd) -> nix::Result<()> {
    let flags = Errno::result(unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
    let flags = OFlag::from_bits_retain(flags) | OFlag::O_NONBLOCK;
    Errno::result(unsafe { libc::fcntl(fd, libc::F_SETFL, flags.bits()) }).map(drop)
}
