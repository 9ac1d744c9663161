//! Descriptor status flags.

use std::os::fd::RawFd;

use crate::error::OsError;

fn get_flags(fd: RawFd) -> Result<libc::c_int, OsError> {
    let res = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if res < 0 { Err(OsError::last()) } else { Ok(res) }
}

fn set_flags(fd: RawFd, flags: libc::c_int) -> Result<(), OsError> {
    let res = unsafe { libc::fcntl(fd, libc::F_SETFL, flags) };
    if res < 0 { Err(OsError::last()) } else { Ok(()) }
}

/// Whether `O_NONBLOCK` is currently set on `fd`.
pub(crate) fn is_nonblocking(fd: RawFd) -> Result<bool, OsError> {
    Ok(get_flags(fd)? & libc::O_NONBLOCK != 0)
}

/// Sets or clears `O_NONBLOCK`, leaving every other status flag alone.
pub(crate) fn set_nonblocking(fd: RawFd, nonblocking: bool) -> Result<(), OsError> {
    let flags = get_flags(fd)?;
    let new_flags = if nonblocking {
        flags | libc::O_NONBLOCK
    } else {
        flags & !libc::O_NONBLOCK
    };
    if new_flags == flags {
        return Ok(());
    }
    set_flags(fd, new_flags)
}

/// Whether `FD_CLOEXEC` is set on `fd`.
pub(crate) fn is_cloexec(fd: RawFd) -> Result<bool, OsError> {
    let res = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if res < 0 {
        Err(OsError::last())
    } else {
        Ok(res & libc::FD_CLOEXEC != 0)
    }
}

/// For platforms without `accept4`, where close-on-exec is set after the fact.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub(crate) fn set_cloexec(fd: RawFd) -> Result<(), OsError> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(OsError::last());
    }
    let res = unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) };
    if res < 0 { Err(OsError::last()) } else { Ok(()) }
}
