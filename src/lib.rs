//! A typed, owned TCP/IPv6 socket for non-blocking servers.
//!
//! - [`addr`]   — IPv6 text <-> binary address translation
//! - [`error`]  — OS error capture and failure categories
//! - [`socket`] — [`TcpSocket`], one owned OS socket
//! - [`server`] — [`TcpServer`], bind + listen shell with ready/stop callbacks
//! - [`poll`]   — epoll readiness for driving non-blocking sockets
//! - [`utils`]  — raw `libc` wrappers

pub mod addr;
pub mod error;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod poll;
pub mod server;
pub mod socket;
pub mod utils;

pub use addr::{Ipv6Binary, SocketAddress, binary_to_text, text_to_binary};
pub use error::{Error, ErrorCategory, OsError, Result};
pub use server::{ServerConfig, TcpServer};
pub use socket::TcpSocket;
pub use utils::socket::max_backlog;
