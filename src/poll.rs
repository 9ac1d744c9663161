//! Readiness notification over epoll.
//!
//! This only answers "which registered sockets are ready"; driving
//! accept/read/write cycles off the answer is left to the caller.

use std::{
    ops::BitOr,
    os::fd::{AsRawFd, RawFd},
    time::Duration,
};

use fxhash::FxHashMap;

use crate::{
    error::{Error, Result},
    utils::epoll::{self, EpollEvent},
};

/// Caller-chosen id reported back with each event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest(u32);

impl Interest {
    /// Data to read, a pending connection, or the peer hanging up.
    pub const READABLE: Interest =
        Interest((libc::EPOLLIN | libc::EPOLLRDHUP) as u32);

    /// Room to write, or a non-blocking connect finishing.
    pub const WRITABLE: Interest = Interest(libc::EPOLLOUT as u32);

    pub fn is_readable(self) -> bool {
        self.0 & libc::EPOLLIN as u32 != 0
    }

    pub fn is_writable(self) -> bool {
        self.0 & libc::EPOLLOUT as u32 != 0
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        Interest(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Event {
    token: Token,
    flags: u32,
}

impl Event {
    pub fn token(&self) -> Token {
        self.token
    }

    pub fn is_readable(&self) -> bool {
        self.flags & libc::EPOLLIN as u32 != 0
    }

    pub fn is_writable(&self) -> bool {
        self.flags & libc::EPOLLOUT as u32 != 0
    }

    pub fn is_error(&self) -> bool {
        self.flags & libc::EPOLLERR as u32 != 0
    }

    /// The peer closed its write half or the connection hung up entirely.
    pub fn is_hangup(&self) -> bool {
        self.flags & (libc::EPOLLHUP | libc::EPOLLRDHUP) as u32 != 0
    }
}

/// Buffer `Poller::wait` fills.
pub struct Events {
    inner: Vec<EpollEvent>,
    len: usize,
}

impl Events {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: vec![EpollEvent { events: 0, u64: 0 }; capacity.max(1)],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.inner[..self.len].iter().map(|e| {
            // copy out of the (possibly packed) struct before use
            let flags = e.events;
            let id = e.u64;
            Event {
                token: Token(id),
                flags,
            }
        })
    }
}

/// Keeps a fd -> token table alongside the epoll set. Call
/// [`Poller::deregister`] before closing a registered socket: the kernel
/// drops a closed descriptor from the epoll set on its own, but the table
/// entry stays and would answer [`Poller::token_of`] for whatever socket
/// later reuses that fd number.
pub struct Poller {
    efd: RawFd,
    registered: FxHashMap<RawFd, Token>,
}

impl Poller {
    pub fn new() -> Result<Self> {
        let efd = epoll::create().map_err(Error::os("epoll_create1"))?;
        Ok(Self {
            efd,
            registered: FxHashMap::default(),
        })
    }

    pub fn register<S: AsRawFd>(
        &mut self,
        source: &S,
        token: Token,
        interest: Interest,
    ) -> Result<()> {
        let fd = source.as_raw_fd();
        epoll::register(self.efd, interest.0, fd, token.0)
            .map_err(Error::os("epoll_ctl(ADD)"))?;
        self.registered.insert(fd, token);
        Ok(())
    }

    pub fn reregister<S: AsRawFd>(
        &mut self,
        source: &S,
        token: Token,
        interest: Interest,
    ) -> Result<()> {
        let fd = source.as_raw_fd();
        epoll::modify(self.efd, interest.0, fd, token.0)
            .map_err(Error::os("epoll_ctl(MOD)"))?;
        self.registered.insert(fd, token);
        Ok(())
    }

    pub fn deregister<S: AsRawFd>(&mut self, source: &S) -> Result<()> {
        let fd = source.as_raw_fd();
        self.registered.remove(&fd);
        epoll::unregister(self.efd, fd).map_err(Error::os("epoll_ctl(DEL)"))
    }

    /// The token `source` is registered under, if any.
    pub fn token_of<S: AsRawFd>(&self, source: &S) -> Option<Token> {
        self.registered.get(&source.as_raw_fd()).copied()
    }

    /// Waits until a registered socket is ready or `timeout` passes.
    ///
    /// `None` waits indefinitely. A wait cut short by a signal returns 0.
    pub fn wait(&self, events: &mut Events, timeout: Option<Duration>) -> Result<usize> {
        let timeout_ms = match timeout {
            None => -1,
            // round up so a sub-millisecond timeout still sleeps
            Some(d) => d
                .as_nanos()
                .div_ceil(1_000_000)
                .min(i32::MAX as u128) as i32,
        };
        match epoll::wait(self.efd, &mut events.inner, timeout_ms) {
            Ok(n) => {
                events.len = n;
                Ok(n)
            }
            Err(e) if e.is_interrupted() => {
                events.len = 0;
                Ok(0)
            }
            Err(e) => Err(Error::Os {
                op: "epoll_wait",
                source: e,
            }),
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if let Err(e) = epoll::close(self.efd) {
            log::warn!("epoll fd={}: close failed: {e}", self.efd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::TcpSocket;

    #[test]
    fn empty_wait_times_out() {
        let poller = Poller::new().unwrap();
        let mut events = Events::with_capacity(8);
        let n = poller
            .wait(&mut events, Some(Duration::from_millis(10)))
            .unwrap();
        assert_eq!(n, 0);
        assert!(events.is_empty());
    }

    #[test]
    fn sub_millisecond_timeout_still_waits() {
        let poller = Poller::new().unwrap();
        let mut events = Events::with_capacity(1);
        let start = std::time::Instant::now();
        let n = poller
            .wait(&mut events, Some(Duration::from_nanos(500)))
            .unwrap();
        assert_eq!(n, 0);
        assert!(start.elapsed() >= Duration::from_micros(500));
    }

    #[test]
    fn register_tracks_tokens() {
        let mut poller = Poller::new().unwrap();
        let s = TcpSocket::open(false).unwrap();
        poller.register(&s, Token(7), Interest::READABLE).unwrap();
        assert_eq!(poller.token_of(&s), Some(Token(7)));
        // a second register falls back to modify
        poller
            .register(&s, Token(9), Interest::READABLE | Interest::WRITABLE)
            .unwrap();
        assert_eq!(poller.token_of(&s), Some(Token(9)));
        poller.deregister(&s).unwrap();
        assert_eq!(poller.token_of(&s), None);
    }

    #[test]
    fn interest_bits() {
        let both = Interest::READABLE | Interest::WRITABLE;
        assert!(both.is_readable() && both.is_writable());
        assert!(!Interest::WRITABLE.is_readable());
    }
}
