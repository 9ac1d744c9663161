#![allow(dead_code)]

use rand::{Rng, distr::Alphanumeric};
use tcp6_socket::TcpSocket;

/// `::1` when the host has IPv6 loopback, otherwise the IPv4-mapped form
/// of 127.0.0.1 reached through the same IPv6 socket.
pub fn loopback_host() -> &'static str {
    let probe = TcpSocket::open(true).expect("open probe socket");
    if probe.bind(0, "::1").is_ok() {
        "::1"
    } else {
        "::ffff:127.0.0.1"
    }
}

/// Finds a currently unused loopback TCP port by binding port 0 and reading
/// back what the OS picked.
pub fn unused_tcp_port() -> u16 {
    let socket = TcpSocket::open(true).expect("open socket");
    socket.bind(0, loopback_host()).expect("bind port 0");
    socket.local_name().expect("getsockname").1
}

/// Opens a listener on an OS-chosen loopback port.
pub fn listener(blocking: bool) -> (TcpSocket, u16) {
    let socket = TcpSocket::open(blocking).expect("open listener");
    socket.bind(0, loopback_host()).expect("bind listener");
    socket.listen(None).expect("listen");
    let port = socket.local_name().expect("getsockname").1;
    (socket, port)
}

pub fn random_payload(len: usize) -> Vec<u8> {
    rand::rng().sample_iter(&Alphanumeric).take(len).collect()
}

/// Reads from a blocking socket until `len` bytes arrived or the peer closed.
pub fn recv_exact(socket: &TcpSocket, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        let chunk = socket.recv(len - out.len()).expect("recv");
        if chunk.is_empty() {
            break;
        }
        out.extend_from_slice(&chunk);
    }
    out
}
