//! Listening server shell.
//!
//! Binds and listens on the configured interface, then hands readiness back
//! to the caller. Reading the listener's readiness and dispatching accepted
//! connections belongs to whatever loop owns the [`TcpServer`].

use std::os::fd::{AsRawFd, RawFd};

use crate::{
    addr::SocketAddress,
    error::{Error, Result},
    socket::TcpSocket,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// IPv6 literal to bind, `::1` unless changed.
    pub interface: String,
    pub port: u16,
    /// Blocking mode for the listener. Accepted connections are always
    /// non-blocking.
    pub blocking: bool,
    pub address_reusable: bool,
    /// Pending-connection queue length; `None` means the OS maximum.
    pub backlog: Option<i32>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            interface: "::1".to_owned(),
            port: 8080,
            blocking: false,
            address_reusable: true,
            backlog: None,
        }
    }
}

impl ServerConfig {
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = interface.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn with_address_reusable(mut self, reusable: bool) -> Self {
        self.address_reusable = reusable;
        self
    }

    pub fn with_backlog(mut self, backlog: i32) -> Self {
        self.backlog = Some(backlog);
        self
    }
}

#[derive(Debug)]
pub struct TcpServer {
    config: ServerConfig,
    accept_socket: Option<TcpSocket>,
}

impl TcpServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            accept_socket: None,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.accept_socket.is_some()
    }

    /// Binds, listens and then calls `ready`.
    ///
    /// `ready` is not called when any step fails. Starting a running server
    /// only calls `ready` again.
    pub fn start<F>(&mut self, ready: F) -> Result<()>
    where
        F: FnOnce(&TcpServer),
    {
        if self.is_running() {
            log::warn!("server already running on {}", self.describe());
            ready(self);
            return Ok(());
        }
        let socket = TcpSocket::open(self.config.blocking)?;
        socket.bind_with_reuse(
            self.config.port,
            &self.config.interface,
            self.config.address_reusable,
        )?;
        socket.listen(self.config.backlog)?;
        self.accept_socket = Some(socket);
        log::info!("server listening on {}", self.describe());
        ready(self);
        Ok(())
    }

    /// Accepts one pending connection; see [`TcpSocket::accept`].
    pub fn accept(&self) -> Result<TcpSocket> {
        self.listener()?.accept()
    }

    /// Where the server is actually bound, with any OS-chosen port filled in.
    pub fn local_address(&self) -> Result<SocketAddress> {
        self.listener()?.local_address()
    }

    /// Closes the accepting socket and calls `stopped`. Stopping a server
    /// that is not running only calls `stopped`.
    pub fn stop<F>(&mut self, stopped: F)
    where
        F: FnOnce(),
    {
        if let Some(mut socket) = self.accept_socket.take() {
            socket.close();
            log::info!("server on {}:{} stopped", self.config.interface, self.config.port);
        }
        stopped();
    }

    fn listener(&self) -> Result<&TcpSocket> {
        self.accept_socket.as_ref().ok_or(Error::NotRunning)
    }

    fn describe(&self) -> String {
        match self.local_address() {
            Ok(addr) => addr.to_string(),
            Err(_) => format!("[{}]:{}", self.config.interface, self.config.port),
        }
    }
}

impl AsRawFd for TcpServer {
    /// The accepting socket's descriptor, or -1 while stopped.
    fn as_raw_fd(&self) -> RawFd {
        self.accept_socket.as_ref().map_or(-1, |s| s.as_raw_fd())
    }
}
