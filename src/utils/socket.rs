//! Raw socket syscalls.
//!
//! `sockaddr` pointers never leave this file: callers hand in and get back
//! `libc::sockaddr_in6` / `libc::sockaddr_storage` values by value.

use std::{fs, mem, os::fd::RawFd};

use lazy_static::lazy_static;

use crate::error::OsError;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Domain(pub libc::c_int);

impl Domain {
    pub const IPV6: Domain = Domain(libc::AF_INET6);
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Type(pub libc::c_int);

impl Type {
    pub const STREAM: Type = Type(libc::SOCK_STREAM);

    /// Sets close-on-exec atomically with creation where the platform allows.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub const fn cloexec(self) -> Type {
        Type(self.0 | libc::SOCK_CLOEXEC)
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    pub const fn cloexec(self) -> Type {
        self
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Protocol(pub libc::c_int);

impl Protocol {
    pub const TCP: Protocol = Protocol(libc::IPPROTO_TCP);
}

/// Path the kernel exposes its listen backlog ceiling on.
const SOMAXCONN_PATH: &str = "/proc/sys/net/core/somaxconn";

lazy_static! {
    /// Largest backlog the OS will honour, read once per process.
    static ref MAX_BACKLOG: libc::c_int = fs::read_to_string(SOMAXCONN_PATH)
        .ok()
        .and_then(|s| s.trim().parse::<libc::c_int>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(libc::SOMAXCONN);
}

/// The OS maximum listen backlog.
pub fn max_backlog() -> i32 {
    *MAX_BACKLOG
}

const SOCKADDR_IN6_LEN: libc::socklen_t =
    mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t;

pub(crate) fn socket(
    domain: Domain,
    ty: Type,
    protocol: Protocol,
) -> Result<RawFd, OsError> {
    let res = unsafe { libc::socket(domain.0, ty.0, protocol.0) };
    if res < 0 { Err(OsError::last()) } else { Ok(res) }
}

pub(crate) fn setsockopt_int(
    fd: RawFd,
    level: libc::c_int,
    name: libc::c_int,
    value: libc::c_int,
) -> Result<(), OsError> {
    let res = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            &value as *const libc::c_int as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if res < 0 { Err(OsError::last()) } else { Ok(()) }
}

pub(crate) fn getsockopt_int(
    fd: RawFd,
    level: libc::c_int,
    name: libc::c_int,
) -> Result<libc::c_int, OsError> {
    let mut value: libc::c_int = 0;
    let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;
    let res = unsafe {
        libc::getsockopt(
            fd,
            level,
            name,
            &mut value as *mut libc::c_int as *mut libc::c_void,
            &mut len,
        )
    };
    if res < 0 { Err(OsError::last()) } else { Ok(value) }
}

pub(crate) fn bind(fd: RawFd, addr: &libc::sockaddr_in6) -> Result<(), OsError> {
    let res = unsafe {
        libc::bind(
            fd,
            addr as *const libc::sockaddr_in6 as *const libc::sockaddr,
            SOCKADDR_IN6_LEN,
        )
    };
    if res < 0 { Err(OsError::last()) } else { Ok(()) }
}

pub(crate) fn listen(fd: RawFd, backlog: libc::c_int) -> Result<(), OsError> {
    let res = unsafe { libc::listen(fd, backlog) };
    if res < 0 { Err(OsError::last()) } else { Ok(()) }
}

/// Accepts one pending connection, returning the new descriptor and the
/// peer address the kernel reported. The new descriptor is close-on-exec.
pub(crate) fn accept(
    fd: RawFd,
) -> Result<(RawFd, libc::sockaddr_storage, libc::socklen_t), OsError> {
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    let res = raw_accept(fd, &mut storage, &mut len);
    if res < 0 {
        return Err(OsError::last());
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    if let Err(e) = crate::utils::fd::set_cloexec(res) {
        let _ = close(res);
        return Err(e);
    }
    Ok((res, storage, len))
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn raw_accept(
    fd: RawFd,
    storage: &mut libc::sockaddr_storage,
    len: &mut libc::socklen_t,
) -> RawFd {
    unsafe {
        libc::accept4(
            fd,
            storage as *mut libc::sockaddr_storage as *mut libc::sockaddr,
            len,
            libc::SOCK_CLOEXEC,
        )
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn raw_accept(
    fd: RawFd,
    storage: &mut libc::sockaddr_storage,
    len: &mut libc::socklen_t,
) -> RawFd {
    unsafe {
        libc::accept(
            fd,
            storage as *mut libc::sockaddr_storage as *mut libc::sockaddr,
            len,
        )
    }
}

/// `connect(2)`. An in-progress connection still comes back as `Err`; the
/// caller decides what that means for its blocking mode.
pub(crate) fn connect(
    fd: RawFd,
    addr: &libc::sockaddr_in6,
) -> Result<(), OsError> {
    let res = unsafe {
        libc::connect(
            fd,
            addr as *const libc::sockaddr_in6 as *const libc::sockaddr,
            SOCKADDR_IN6_LEN,
        )
    };
    if res < 0 { Err(OsError::last()) } else { Ok(()) }
}

pub(crate) fn send(
    fd: RawFd,
    buf: &[u8],
    flags: libc::c_int,
) -> Result<usize, OsError> {
    let res = unsafe {
        libc::send(fd, buf.as_ptr() as *const libc::c_void, buf.len(), flags)
    };
    if res < 0 {
        Err(OsError::last())
    } else {
        Ok(res as usize)
    }
}

pub(crate) fn recv(fd: RawFd, buf: &mut [u8]) -> Result<usize, OsError> {
    let res = unsafe {
        libc::recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0)
    };
    if res < 0 {
        Err(OsError::last())
    } else {
        Ok(res as usize)
    }
}

pub(crate) fn shutdown(fd: RawFd, how: libc::c_int) -> Result<(), OsError> {
    let res = unsafe { libc::shutdown(fd, how) };
    if res < 0 { Err(OsError::last()) } else { Ok(()) }
}

pub(crate) fn close(fd: RawFd) -> Result<(), OsError> {
    let res = unsafe { libc::close(fd) };
    if res < 0 { Err(OsError::last()) } else { Ok(()) }
}

pub(crate) fn getpeername(
    fd: RawFd,
) -> Result<(libc::sockaddr_storage, libc::socklen_t), OsError> {
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    let res = unsafe {
        libc::getpeername(
            fd,
            &mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr,
            &mut len,
        )
    };
    if res < 0 {
        Err(OsError::last())
    } else {
        Ok((storage, len))
    }
}

pub(crate) fn getsockname(
    fd: RawFd,
) -> Result<(libc::sockaddr_storage, libc::socklen_t), OsError> {
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    let res = unsafe {
        libc::getsockname(
            fd,
            &mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr,
            &mut len,
        )
    };
    if res < 0 {
        Err(OsError::last())
    } else {
        Ok((storage, len))
    }
}
