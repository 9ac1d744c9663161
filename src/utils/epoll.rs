//! epoll syscalls backing [`crate::poll::Poller`].
//!
//! events:
//! `EPOLLIN`:    readable, or a pending connection on a listening socket
//! `EPOLLOUT`:   writable, or a non-blocking connect finished
//! `EPOLLRDHUP`: peer shut down its write half
//! `EPOLLERR`:   error pending on the descriptor (always reported)
//! `EPOLLHUP`:   hang up (always reported)
use std::os::fd::RawFd;

use crate::error::OsError;

pub(crate) type EpollEvent = libc::epoll_event;

/// Creates an epoll instance with close-on-exec set.
pub(crate) fn create() -> Result<RawFd, OsError> {
    let res = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
    if res < 0 { Err(OsError::last()) } else { Ok(res) }
}

/// `op` is one of `EPOLL_CTL_ADD`, `EPOLL_CTL_MOD` or `EPOLL_CTL_DEL`.
pub(crate) fn ctl(
    epfd: RawFd,
    op: i32,
    fd: RawFd,
    event: &mut EpollEvent,
) -> Result<(), OsError> {
    let res = unsafe { libc::epoll_ctl(epfd, op, fd, event) };
    if res < 0 { Err(OsError::last()) } else { Ok(()) }
}

/// `timeout` is in milliseconds; -1 waits forever, 0 returns immediately.
pub(crate) fn wait(
    epfd: RawFd,
    events: &mut [EpollEvent],
    timeout: i32,
) -> Result<usize, OsError> {
    let max = events.len().min(i32::MAX as usize) as i32;
    let res =
        unsafe { libc::epoll_wait(epfd, events.as_mut_ptr(), max, timeout) };
    if res < 0 {
        Err(OsError::last())
    } else {
        Ok(res as usize)
    }
}

pub(crate) fn close(fd: RawFd) -> Result<(), OsError> {
    let res = unsafe { libc::close(fd) };
    if res < 0 { Err(OsError::last()) } else { Ok(()) }
}

/// Adds `interest_fd`, falling back to a modify when it is already present.
pub(crate) fn register(
    epfd: RawFd,
    events: u32,
    interest_fd: RawFd,
    id: u64,
) -> Result<(), OsError> {
    let mut event = EpollEvent { events, u64: id };
    match ctl(epfd, libc::EPOLL_CTL_ADD, interest_fd, &mut event) {
        Ok(_) => Ok(()),
        Err(e) if e.code() == libc::EEXIST => {
            ctl(epfd, libc::EPOLL_CTL_MOD, interest_fd, &mut event)
        }
        Err(e) => Err(e),
    }
}

pub(crate) fn modify(
    epfd: RawFd,
    events: u32,
    interest_fd: RawFd,
    id: u64,
) -> Result<(), OsError> {
    let mut event = EpollEvent { events, u64: id };
    ctl(epfd, libc::EPOLL_CTL_MOD, interest_fd, &mut event)
}

pub(crate) fn unregister(epfd: RawFd, interest_fd: RawFd) -> Result<(), OsError> {
    // pre-2.6.9 kernels reject a null event pointer for DEL
    let mut event = EpollEvent { events: 0, u64: 0 };
    ctl(epfd, libc::EPOLL_CTL_DEL, interest_fd, &mut event)
}
