//! The TCP/IPv6 socket.
//!
//! fd: the integer handle the kernel uses to identify an open socket. A
//! [`TcpSocket`] owns exactly one and releases it in [`TcpSocket::close`],
//! which `Drop` also calls, so every exit path of the owning scope gives the
//! descriptor back.
//!
//! `EINPROGRESS`: a non-blocking `connect` that has started but not yet
//! finished. Completion is reported as writability; [`TcpSocket::take_error`]
//! then tells whether it succeeded.

use std::os::fd::{AsRawFd, IntoRawFd, RawFd};

use crate::{
    addr::SocketAddress,
    error::{Error, OsError, Result},
    utils::{
        fd,
        socket::{self, Domain, Protocol, Type},
    },
};

/// Upper bound on the buffer one [`TcpSocket::recv`] call allocates.
pub const MAX_RECV_SIZE: usize = 1 << 20;

pub struct TcpSocket {
    fd: RawFd,
    // without SO_NOSIGPIPE the flag is applied per send as MSG_NOSIGNAL
    #[cfg(not(target_vendor = "apple"))]
    ignore_sigpipe: bool,
}

impl TcpSocket {
    /// Opens a fresh IPv6 stream socket in the requested blocking mode.
    pub fn open(blocking: bool) -> Result<Self> {
        let raw = socket::socket(Domain::IPV6, Type::STREAM.cloexec(), Protocol::TCP)
            .map_err(Error::os("socket"))?;
        // owned from here on; an error below closes it through Drop
        let socket = Self::from_parts(raw);
        socket.set_blocking(blocking)?;
        log::debug!("opened socket fd={raw} blocking={blocking}");
        Ok(socket)
    }

    /// Takes ownership of an already-open descriptor, such as one returned
    /// by `accept`.
    ///
    /// A failure to apply `blocking` is logged, not returned.
    pub fn wrap(raw: RawFd, blocking: bool) -> Self {
        let socket = Self::from_parts(raw);
        if let Err(e) = socket.set_blocking(blocking) {
            log::warn!("fd={raw}: could not set blocking={blocking}: {e}");
        }
        socket
    }

    fn from_parts(fd: RawFd) -> Self {
        Self {
            fd,
            #[cfg(not(target_vendor = "apple"))]
            ignore_sigpipe: false,
        }
    }

    /// Binds to `interface`:`port` with the address made reusable.
    ///
    /// Port 0 lets the OS choose an ephemeral port; read it back with
    /// [`TcpSocket::local_name`].
    pub fn bind(&self, port: u16, interface: &str) -> Result<()> {
        self.bind_with_reuse(port, interface, true)
    }

    /// Binds to `interface`:`port`.
    ///
    /// `address_reusable` sets `SO_REUSEADDR` first, so a restarted server
    /// can rebind while old connections linger in `TIME_WAIT`.
    pub fn bind_with_reuse(
        &self,
        port: u16,
        interface: &str,
        address_reusable: bool,
    ) -> Result<()> {
        let address = SocketAddress::parse(interface, port)?;
        if address_reusable {
            socket::setsockopt_int(self.fd, libc::SOL_SOCKET, libc::SO_REUSEADDR, 1)
                .map_err(Error::os("setsockopt(SO_REUSEADDR)"))?;
        }
        socket::bind(self.fd, &address.to_raw()).map_err(Error::os("bind"))?;
        log::debug!("fd={} bound to {address}", self.fd);
        Ok(())
    }

    /// Starts listening. `None` asks for the OS maximum backlog.
    pub fn listen(&self, backlog: Option<i32>) -> Result<()> {
        let backlog = backlog.unwrap_or_else(socket::max_backlog);
        socket::listen(self.fd, backlog).map_err(Error::os("listen"))?;
        log::debug!("fd={} listening, backlog={backlog}", self.fd);
        Ok(())
    }

    /// Accepts one pending connection.
    ///
    /// In non-blocking mode an empty queue fails with an error for which
    /// [`Error::is_would_block`] holds. The new socket is always
    /// non-blocking and close-on-exec, whatever mode this socket is in.
    pub fn accept(&self) -> Result<TcpSocket> {
        let (raw, storage, len) = socket::accept(self.fd).map_err(Error::os("accept"))?;
        let accepted = TcpSocket::wrap(raw, false);
        match SocketAddress::from_raw(&storage, len) {
            Ok(peer) => log::debug!("fd={} accepted {peer} as fd={raw}", self.fd),
            Err(_) => log::debug!("fd={} accepted fd={raw}", self.fd),
        }
        Ok(accepted)
    }

    /// Connects to `host`:`port`.
    ///
    /// On a non-blocking socket an in-progress connect counts as success;
    /// wait for writability and check [`TcpSocket::take_error`].
    pub fn connect(&self, host: &str, port: u16) -> Result<()> {
        let address = SocketAddress::parse(host, port)?;
        match socket::connect(self.fd, &address.to_raw()) {
            Ok(()) => {
                log::debug!("fd={} connected to {address}", self.fd);
                Ok(())
            }
            Err(e) if e.is_in_progress() => {
                log::debug!("fd={} connecting to {address}", self.fd);
                Ok(())
            }
            Err(e) => Err(Error::Os {
                op: "connect",
                source: e,
            }),
        }
    }

    /// Writes what the OS accepts in one call and returns the count, which
    /// may be short.
    pub fn send(&self, bytes: &[u8]) -> Result<usize> {
        let n = socket::send(self.fd, bytes, self.send_flags())
            .map_err(Error::os("send"))?;
        log::trace!("fd={} sent {n}/{} bytes", self.fd, bytes.len());
        Ok(n)
    }

    /// Calls [`TcpSocket::send`] until every byte is written.
    ///
    /// On a non-blocking socket this can fail with would-block part way
    /// through; use `send` and track progress in that case.
    pub fn send_all(&self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            match self.send(bytes) {
                Ok(n) => bytes = &bytes[n..],
                Err(Error::Os { source, .. }) if source.is_interrupted() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Reads up to `max_size` bytes. An empty result means the peer closed
    /// its side.
    ///
    /// A single call never reads more than [`MAX_RECV_SIZE`] bytes, however
    /// large `max_size` is.
    pub fn recv(&self, max_size: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; max_size.min(MAX_RECV_SIZE)];
        let n = socket::recv(self.fd, &mut buf).map_err(Error::os("recv"))?;
        buf.truncate(n);
        log::trace!("fd={} received {n} bytes", self.fd);
        Ok(buf)
    }

    /// Shuts down the write half and releases the descriptor.
    ///
    /// Best effort: failures are logged, never returned. Calling it again
    /// does nothing.
    pub fn close(&mut self) {
        if self.fd < 0 {
            return;
        }
        let raw = self.fd;
        self.fd = -1;
        // listeners and never-connected sockets report ENOTCONN here
        if let Err(e) = socket::shutdown(raw, libc::SHUT_WR) {
            if e.code() != libc::ENOTCONN {
                log::warn!("fd={raw}: shutdown failed: {e}");
            }
        }
        if let Err(e) = socket::close(raw) {
            log::warn!("fd={raw}: close failed: {e}");
        }
        log::debug!("closed socket fd={raw}");
    }

    pub fn is_closed(&self) -> bool {
        self.fd < 0
    }

    /// The connected peer as `(address text, port)`.
    pub fn peer_name(&self) -> Result<(String, u16)> {
        Ok(self.peer_address()?.to_pair())
    }

    pub fn peer_address(&self) -> Result<SocketAddress> {
        let (storage, len) =
            socket::getpeername(self.fd).map_err(Error::os("getpeername"))?;
        SocketAddress::from_raw(&storage, len)
    }

    /// The local end as `(address text, port)`.
    pub fn local_name(&self) -> Result<(String, u16)> {
        Ok(self.local_address()?.to_pair())
    }

    pub fn local_address(&self) -> Result<SocketAddress> {
        let (storage, len) =
            socket::getsockname(self.fd).map_err(Error::os("getsockname"))?;
        SocketAddress::from_raw(&storage, len)
    }

    /// Reads the OS non-blocking flag.
    pub fn blocking(&self) -> Result<bool> {
        fd::is_nonblocking(self.fd)
            .map(|nonblocking| !nonblocking)
            .map_err(Error::platform("O_NONBLOCK"))
    }

    pub fn set_blocking(&self, blocking: bool) -> Result<()> {
        fd::set_nonblocking(self.fd, !blocking).map_err(Error::platform("O_NONBLOCK"))
    }

    /// Whether the descriptor is closed in exec'd child processes. Sockets
    /// from `open` and `accept` always are.
    pub fn close_on_exec(&self) -> Result<bool> {
        fd::is_cloexec(self.fd).map_err(Error::platform("FD_CLOEXEC"))
    }

    /// Whether writes to a closed peer fail with `EPIPE` instead of raising
    /// `SIGPIPE`.
    #[cfg(target_vendor = "apple")]
    pub fn ignore_sigpipe(&self) -> Result<bool> {
        socket::getsockopt_int(self.fd, libc::SOL_SOCKET, libc::SO_NOSIGPIPE)
            .map(|v| v != 0)
            .map_err(Error::platform("SO_NOSIGPIPE"))
    }

    #[cfg(target_vendor = "apple")]
    pub fn set_ignore_sigpipe(&mut self, ignore: bool) -> Result<()> {
        socket::setsockopt_int(
            self.fd,
            libc::SOL_SOCKET,
            libc::SO_NOSIGPIPE,
            ignore as libc::c_int,
        )
        .map_err(Error::platform("SO_NOSIGPIPE"))
    }

    /// Whether writes to a closed peer fail with `EPIPE` instead of raising
    /// `SIGPIPE`.
    #[cfg(not(target_vendor = "apple"))]
    pub fn ignore_sigpipe(&self) -> Result<bool> {
        Ok(self.ignore_sigpipe)
    }

    #[cfg(not(target_vendor = "apple"))]
    pub fn set_ignore_sigpipe(&mut self, ignore: bool) -> Result<()> {
        self.ignore_sigpipe = ignore;
        Ok(())
    }

    #[cfg(target_vendor = "apple")]
    fn send_flags(&self) -> libc::c_int {
        0
    }

    #[cfg(not(target_vendor = "apple"))]
    fn send_flags(&self) -> libc::c_int {
        if self.ignore_sigpipe { libc::MSG_NOSIGNAL } else { 0 }
    }

    pub fn nodelay(&self) -> Result<bool> {
        socket::getsockopt_int(self.fd, libc::IPPROTO_TCP, libc::TCP_NODELAY)
            .map(|v| v != 0)
            .map_err(Error::platform("TCP_NODELAY"))
    }

    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        socket::setsockopt_int(
            self.fd,
            libc::IPPROTO_TCP,
            libc::TCP_NODELAY,
            nodelay as libc::c_int,
        )
        .map_err(Error::platform("TCP_NODELAY"))
    }

    /// Reads and clears the pending socket error (`SO_ERROR`).
    pub fn take_error(&self) -> Result<Option<OsError>> {
        let code = socket::getsockopt_int(self.fd, libc::SOL_SOCKET, libc::SO_ERROR)
            .map_err(Error::os("getsockopt(SO_ERROR)"))?;
        Ok((code != 0).then(|| OsError::from_code(code)))
    }
}

impl AsRawFd for TcpSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl IntoRawFd for TcpSocket {
    fn into_raw_fd(mut self) -> RawFd {
        let raw = self.fd;
        // Drop sees a closed socket and leaves the descriptor alone
        self.fd = -1;
        raw
    }
}

impl Drop for TcpSocket {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TcpSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpSocket").field("fd", &self.fd).finish()
    }
}
