//! TCP listener and stream on top of the socket shims
//!
//! Thin owned-descriptor types for programs that would rather not juggle raw
//! fds. Sockets are created non-blocking with `TCP_NODELAY` set on every
//! connection.

use std::ffi::CString;
use std::mem;
use std::net::{Shutdown, SocketAddr};
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};

use nix::errno::Errno;
use wire_runtime::Wire;

use crate::addr;
use crate::netdb::GaiError;
use crate::syscall;

const LISTEN_BACKLOG: libc::c_int = 1024;

fn socket_for(addr: &SocketAddr) -> nix::Result<OwnedFd> {
    let domain = match addr {
        SocketAddr::V4(_) => libc::AF_INET,
        SocketAddr::V6(_) => libc::AF_INET6,
    };
    let fd = Errno::result(unsafe {
        libc::socket(domain, libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC, 0)
    })?;
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn set_opt(fd: RawFd, level: libc::c_int, name: libc::c_int, value: libc::c_int) -> nix::Result<()> {
    Errno::result(unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            (&value as *const libc::c_int).cast(),
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    })
    .map(drop)
}

type NameFn = unsafe extern "C" fn(libc::c_int, *mut libc::sockaddr, *mut libc::socklen_t) -> libc::c_int;

fn sock_name(fd: RawFd, f: NameFn) -> nix::Result<SocketAddr> {
    // SAFETY: all-zero is a valid sockaddr_storage
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    Errno::result(unsafe { f(fd, (&mut storage as *mut libc::sockaddr_storage).cast(), &mut len) })?;
    addr::from_storage(&storage, len).ok_or(Errno::EAFNOSUPPORT)
}

/// Resolve `host:port` to TCP addresses
pub fn resolve(wire: &Wire, host: &str, port: u16) -> Result<Vec<SocketAddr>, GaiError> {
    let node = CString::new(host).map_err(|_| GaiError::Eai(libc::EAI_NONAME))?;
    let service = CString::new(port.to_string()).map_err(|_| GaiError::Eai(libc::EAI_SERVICE))?;

    // SAFETY: all-zero is a valid addrinfo hint
    let mut hints: libc::addrinfo = unsafe { mem::zeroed() };
    hints.ai_socktype = libc::SOCK_STREAM;
    hints.ai_flags = libc::AI_NUMERICSERV;

    let list = syscall::getaddrinfo(wire, Some(&node), Some(&service), Some(&hints))?;
    Ok(list.socket_addrs())
}

// ============================================================================
// Listener
// ============================================================================

/// Listening TCP socket
#[derive(Debug)]
pub struct WireListener {
    fd: OwnedFd,
}

impl WireListener {
    /// Bind and listen with `SO_REUSEADDR`. Never blocks, so it may be
    /// called before the runtime starts.
    pub fn bind(addr: SocketAddr) -> nix::Result<Self> {
        let fd = socket_for(&addr)?;
        set_opt(fd.as_raw_fd(), libc::SOL_SOCKET, libc::SO_REUSEADDR, 1)?;

        let (storage, len) = addr::to_storage(&addr);
        Errno::result(unsafe {
            libc::bind(fd.as_raw_fd(), (&storage as *const libc::sockaddr_storage).cast(), len)
        })?;
        Errno::result(unsafe { libc::listen(fd.as_raw_fd(), LISTEN_BACKLOG) })?;

        Ok(Self { fd })
    }

    pub fn local_addr(&self) -> nix::Result<SocketAddr> {
        sock_name(self.fd.as_raw_fd(), libc::getsockname)
    }

    /// Wait for the next connection
    pub fn accept(&self, wire: &Wire) -> nix::Result<(WireStream, SocketAddr)> {
        let (client, peer) = syscall::accept4(
            wire,
            self.fd.as_raw_fd(),
            libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
        )?;
        let stream = WireStream {
            fd: unsafe { OwnedFd::from_raw_fd(client) },
        };
        let peer = match peer {
            Some(peer) => peer,
            None => stream.peer_addr()?,
        };
        stream.set_nodelay()?;
        Ok((stream, peer))
    }
}

impl AsRawFd for WireListener {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

// ============================================================================
// Stream
// ============================================================================

/// Connected TCP socket; closed on drop
#[derive(Debug)]
pub struct WireStream {
    fd: OwnedFd,
}

impl WireStream {
    /// Connect to `addr`, parking the task until the handshake finishes
    pub fn connect(wire: &Wire, addr: SocketAddr) -> nix::Result<Self> {
        let fd = socket_for(&addr)?;
        syscall::connect(wire, fd.as_raw_fd(), &addr)?;
        let stream = Self { fd };
        stream.set_nodelay()?;
        Ok(stream)
    }

    /// Try each resolved address of `host:port` in turn
    pub fn connect_host(wire: &Wire, host: &str, port: u16) -> nix::Result<Self> {
        let addrs = resolve(wire, host, port).map_err(|e| match e {
            GaiError::System(errno) => errno,
            GaiError::Eai(_) => Errno::EHOSTUNREACH,
        })?;

        let mut last = Errno::EHOSTUNREACH;
        for addr in addrs {
            match Self::connect(wire, addr) {
                Ok(stream) => return Ok(stream),
                Err(e) => last = e,
            }
        }
        Err(last)
    }

    pub fn read(&self, wire: &Wire, buf: &mut [u8]) -> nix::Result<usize> {
        syscall::recv(wire, self.fd.as_raw_fd(), buf, 0)
    }

    pub fn write(&self, wire: &Wire, buf: &[u8]) -> nix::Result<usize> {
        syscall::send(wire, self.fd.as_raw_fd(), buf, libc::MSG_NOSIGNAL)
    }

    pub fn write_all(&self, wire: &Wire, buf: &[u8]) -> nix::Result<()> {
        syscall::send_all(wire, self.fd.as_raw_fd(), buf).map(drop)
    }

    pub fn peer_addr(&self) -> nix::Result<SocketAddr> {
        sock_name(self.fd.as_raw_fd(), libc::getpeername)
    }

    pub fn local_addr(&self) -> nix::Result<SocketAddr> {
        sock_name(self.fd.as_raw_fd(), libc::getsockname)
    }

    pub fn shutdown(&self, how: Shutdown) -> nix::Result<()> {
        let how = match how {
            Shutdown::Read => libc::SHUT_RD,
            Shutdown::Write => libc::SHUT_WR,
            Shutdown::Both => libc::SHUT_RDWR,
        };
        Errno::result(unsafe { libc::shutdown(self.fd.as_raw_fd(), how) }).map(drop)
    }

    fn set_nodelay(&self) -> nix::Result<()> {
        set_opt(self.fd.as_raw_fd(), libc::IPPROTO_TCP, libc::TCP_NODELAY, 1)
    }
}

impl AsRawFd for WireStream {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl IntoRawFd for WireStream {
    fn into_raw_fd(self) -> RawFd {
        self.fd.into_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use wire_runtime::{Runtime, WireConfig};

    fn runtime() -> Runtime {
        Runtime::new(WireConfig::new().stack_size(256 * 1024)).unwrap()
    }

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn test_echo_roundtrip() {
        let rt = runtime();
        let listener = WireListener::bind(loopback()).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        rt.spawn_default("server", move |w| {
            let (stream, peer) = listener.accept(w).unwrap();
            assert!(peer.ip().is_loopback());
            let mut buf = [0u8; 64];
            loop {
                let n = stream.read(w, &mut buf).unwrap();
                if n == 0 {
                    break;
                }
                stream.write_all(w, &buf[..n]).unwrap();
            }
        })
        .unwrap();

        let echoed = Rc::new(RefCell::new(Vec::new()));
        let out = echoed.clone();
        rt.spawn_default("client", move |w| {
            let stream = WireStream::connect(w, addr).unwrap();
            assert_eq!(stream.peer_addr().unwrap(), addr);
            stream.write_all(w, b"ping").unwrap();

            let mut buf = [0u8; 64];
            while out.borrow().len() < 4 {
                let n = stream.read(w, &mut buf).unwrap();
                assert!(n > 0, "server closed early");
                out.borrow_mut().extend_from_slice(&buf[..n]);
            }
            stream.shutdown(Shutdown::Write).unwrap();
        })
        .unwrap();

        let stats = rt.run().unwrap();
        assert_eq!(*echoed.borrow(), b"ping");
        assert_eq!(stats.completed, 2);
        assert!(stats.blocks >= 1);
    }

    #[test]
    fn test_connect_refused() {
        // Grab a free port, then close it
        let addr = WireListener::bind(loopback()).unwrap().local_addr().unwrap();

        let rt = runtime();
        let result = Rc::new(RefCell::new(None));
        let out = result.clone();
        rt.spawn_default("client", move |w| {
            *out.borrow_mut() = Some(WireStream::connect(w, addr).map(drop));
        })
        .unwrap();
        rt.run().unwrap();

        assert_eq!(*result.borrow(), Some(Err(Errno::ECONNREFUSED)));
    }

    #[test]
    fn test_resolve_numeric() {
        let rt = runtime();
        let result = Rc::new(RefCell::new(Vec::new()));
        let out = result.clone();
        rt.spawn_default("resolver", move |w| {
            *out.borrow_mut() = resolve(w, "127.0.0.1", 80).unwrap();
        })
        .unwrap();
        rt.run().unwrap();

        let want: SocketAddr = "127.0.0.1:80".parse().unwrap();
        assert_eq!(*result.borrow(), vec![want]);
    }
}
