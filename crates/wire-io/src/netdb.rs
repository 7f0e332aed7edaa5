//! Owned wrappers over the native `getaddrinfo` and `getifaddrs` lists
//!
//! Both lists are allocated by libc as singly linked lists and must be
//! released with their matching free function; the wrappers do that on drop
//! and hand out borrowed nodes while alive.

use core::fmt;
use std::ffi::CStr;
use std::marker::PhantomData;
use std::net::SocketAddr;

use nix::errno::Errno;

use crate::addr;

// ============================================================================
// getaddrinfo
// ============================================================================

/// Failure of `getaddrinfo`: an `EAI_*` code, or errno for `EAI_SYSTEM`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GaiError {
    /// Resolver error code (`EAI_NONAME`, `EAI_AGAIN`, ...)
    Eai(libc::c_int),
    /// `EAI_SYSTEM`; the cause is in errno
    System(Errno),
}

impl GaiError {
    pub(crate) fn from_code(code: libc::c_int) -> Self {
        if code == libc::EAI_SYSTEM {
            GaiError::System(Errno::last())
        } else {
            GaiError::Eai(code)
        }
    }

    /// The raw `EAI_*` code
    pub fn code(&self) -> libc::c_int {
        match self {
            GaiError::Eai(code) => *code,
            GaiError::System(_) => libc::EAI_SYSTEM,
        }
    }
}

impl fmt::Display for GaiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GaiError::Eai(code) => {
                // SAFETY: gai_strerror returns a static string
                let msg = unsafe { CStr::from_ptr(libc::gai_strerror(*code)) };
                write!(f, "getaddrinfo: {} ({})", msg.to_string_lossy(), code)
            }
            GaiError::System(errno) => write!(f, "getaddrinfo: {}", errno),
        }
    }
}

impl std::error::Error for GaiError {}

/// Result list of `getaddrinfo`, freed with `freeaddrinfo` on drop
pub struct AddrInfoList {
    head: *mut libc::addrinfo,
}

impl AddrInfoList {
    /// # Safety
    ///
    /// `head` must come from a successful `getaddrinfo` and not be freed elsewhere.
    pub(crate) unsafe fn from_raw(head: *mut libc::addrinfo) -> Self {
        Self { head }
    }

    pub fn iter(&self) -> AddrInfoIter<'_> {
        AddrInfoIter {
            cur: self.head,
            _list: PhantomData,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// Addresses of the IPv4/IPv6 entries, in resolver order
    pub fn socket_addrs(&self) -> Vec<SocketAddr> {
        self.iter().filter_map(socket_addr).collect()
    }
}

impl Drop for AddrInfoList {
    fn drop(&mut self) {
        if !self.head.is_null() {
            unsafe { libc::freeaddrinfo(self.head) };
        }
    }
}

impl fmt::Debug for AddrInfoList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.socket_addrs()).finish()
    }
}

impl<'a> IntoIterator for &'a AddrInfoList {
    type Item = &'a libc::addrinfo;
    type IntoIter = AddrInfoIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct AddrInfoIter<'a> {
    cur: *const libc::addrinfo,
    _list: PhantomData<&'a AddrInfoList>,
}

impl<'a> Iterator for AddrInfoIter<'a> {
    type Item = &'a libc::addrinfo;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur.is_null() {
            return None;
        }
        // SAFETY: nodes live as long as the list borrow
        let node = unsafe { &*self.cur };
        self.cur = node.ai_next;
        Some(node)
    }
}

/// Socket address of one `addrinfo` node, if it is IPv4 or IPv6
pub fn socket_addr(info: &libc::addrinfo) -> Option<SocketAddr> {
    unsafe { addr::from_raw(info.ai_addr, info.ai_addrlen) }
}

// ============================================================================
// getifaddrs
// ============================================================================

/// Result list of `getifaddrs`, freed with `freeifaddrs` on drop
pub struct IfAddrList {
    head: *mut libc::ifaddrs,
}

impl IfAddrList {
    /// # Safety
    ///
    /// `head` must come from a successful `getifaddrs` and not be freed elsewhere.
    pub(crate) unsafe fn from_raw(head: *mut libc::ifaddrs) -> Self {
        Self { head }
    }

    pub fn iter(&self) -> IfAddrIter<'_> {
        IfAddrIter {
            cur: self.head,
            _list: PhantomData,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }
}

impl Drop for IfAddrList {
    fn drop(&mut self) {
        if !self.head.is_null() {
            unsafe { libc::freeifaddrs(self.head) };
        }
    }
}

impl<'a> IntoIterator for &'a IfAddrList {
    type Item = &'a libc::ifaddrs;
    type IntoIter = IfAddrIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct IfAddrIter<'a> {
    cur: *const libc::ifaddrs,
    _list: PhantomData<&'a IfAddrList>,
}

impl<'a> Iterator for IfAddrIter<'a> {
    type Item = &'a libc::ifaddrs;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur.is_null() {
            return None;
        }
        let node = unsafe { &*self.cur };
        self.cur = node.ifa_next;
        Some(node)
    }
}

/// Interface name of an `ifaddrs` node
pub fn if_name(ifa: &libc::ifaddrs) -> &CStr {
    // SAFETY: ifa_name is always a valid C string
    unsafe { CStr::from_ptr(ifa.ifa_name) }
}

/// Address of an `ifaddrs` node, if it has an IPv4/IPv6 one
pub fn if_addr(ifa: &libc::ifaddrs) -> Option<SocketAddr> {
    if ifa.ifa_addr.is_null() {
        return None;
    }
    // ifa_addr is sized for its family; from_raw reads no more than that
    let len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    unsafe { addr::from_raw(ifa.ifa_addr, len) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gai_error_display() {
        let err = GaiError::Eai(libc::EAI_NONAME);
        assert!(format!("{}", err).starts_with("getaddrinfo: "));
        assert_eq!(err.code(), libc::EAI_NONAME);

        let err = GaiError::System(Errno::ENOMEM);
        assert_eq!(err.code(), libc::EAI_SYSTEM);
    }

    #[test]
    fn test_empty_lists() {
        let list = unsafe { AddrInfoList::from_raw(std::ptr::null_mut()) };
        assert!(list.is_empty());
        assert_eq!(list.iter().count(), 0);

        let list = unsafe { IfAddrList::from_raw(std::ptr::null_mut()) };
        assert!(list.is_empty());
        assert_eq!(list.iter().count(), 0);
    }
}
