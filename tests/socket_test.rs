//! Loopback tests against real OS sockets.

mod common;

use std::{os::fd::AsRawFd, thread, time::Duration};

use common::{listener, loopback_host, random_payload, recv_exact, unused_tcp_port};
use tcp6_socket::{
    ErrorCategory, TcpSocket,
    poll::{Events, Interest, Poller, Token},
};

const WAIT: Option<Duration> = Some(Duration::from_secs(5));

/// Blocking client plus the accepted end, switched to blocking as well.
fn connected_pair() -> (TcpSocket, TcpSocket) {
    let (server, port) = listener(true);
    let client = TcpSocket::open(true).unwrap();
    client.connect(loopback_host(), port).unwrap();
    let accepted = server.accept().unwrap();
    accepted.set_blocking(true).unwrap();
    (client, accepted)
}

#[test]
fn bind_port_zero_gets_ephemeral_port() {
    let (socket, port) = listener(false);
    assert!((1024..=65535).contains(&port), "port {port}");

    let (other, other_port) = listener(false);
    assert_ne!(port, other_port);
    drop(socket);
    drop(other);
}

#[test]
fn unused_port_can_be_bound() {
    let port = unused_tcp_port();
    let socket = TcpSocket::open(false).unwrap();
    socket.bind(port, loopback_host()).unwrap();
    assert_eq!(socket.local_name().unwrap().1, port);
}

#[test]
fn accepted_peer_matches_client_local_name() {
    let (client, accepted) = connected_pair();
    assert_eq!(accepted.peer_name().unwrap(), client.local_name().unwrap());
    assert_eq!(client.peer_name().unwrap(), accepted.local_name().unwrap());
    assert_eq!(accepted.peer_name().unwrap().0, loopback_host());
}

#[test]
fn accepted_socket_is_nonblocking_and_cloexec() {
    let (server, port) = listener(true);
    assert!(server.close_on_exec().unwrap());
    let client = TcpSocket::open(true).unwrap();
    client.connect(loopback_host(), port).unwrap();
    let accepted = server.accept().unwrap();
    assert!(!accepted.blocking().unwrap());
    assert!(accepted.close_on_exec().unwrap());

    let flags = unsafe { libc::fcntl(accepted.as_raw_fd(), libc::F_GETFD) };
    assert!(flags >= 0);
    assert_ne!(flags & libc::FD_CLOEXEC, 0);

    let (server, port) = listener(false);
    let mut poller = Poller::new().unwrap();
    poller.register(&server, Token(1), Interest::READABLE).unwrap();
    let client = TcpSocket::open(true).unwrap();
    client.connect(loopback_host(), port).unwrap();
    let mut events = Events::with_capacity(4);
    assert_eq!(poller.wait(&mut events, WAIT).unwrap(), 1);
    let accepted = server.accept().unwrap();
    assert!(!accepted.blocking().unwrap());
}

#[test]
fn send_and_recv_payload() {
    let (client, accepted) = connected_pair();
    let payload = random_payload(64 * 1024);
    let expected = payload.clone();

    let writer = thread::spawn(move || {
        client.send_all(&payload).unwrap();
        client
    });
    let received = recv_exact(&accepted, expected.len());
    let _client = writer.join().unwrap();
    assert_eq!(received, expected);
}

#[test]
fn send_reports_partial_count() {
    let (client, _accepted) = connected_pair();
    let n = client.send(b"hello").unwrap();
    assert!(n > 0 && n <= 5);
}

#[test]
fn recv_after_orderly_close_is_empty() {
    let (mut client, accepted) = connected_pair();
    client.send_all(b"bye").unwrap();
    client.close();

    assert_eq!(recv_exact(&accepted, 3), b"bye");
    let tail = accepted.recv(1024).unwrap();
    assert!(tail.is_empty());
}

#[test]
fn nonblocking_recv_would_block() {
    let (_client, accepted) = connected_pair();
    accepted.set_blocking(false).unwrap();
    let err = accepted.recv(16).unwrap_err();
    assert!(err.is_would_block());
    assert_eq!(err.category(), ErrorCategory::Transient);
}

#[test]
fn nonblocking_send_would_block_when_peer_stops_reading() {
    let (client, _accepted) = connected_pair();
    client.set_blocking(false).unwrap();
    let chunk = random_payload(64 * 1024);

    let mut failure = None;
    for _ in 0..10_000 {
        match client.send(&chunk) {
            Ok(n) => assert!(n > 0 && n <= chunk.len()),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    let err = failure.expect("send buffers never filled up");
    assert!(err.is_would_block(), "{err}");
    assert_eq!(err.category(), ErrorCategory::Transient);
}

#[test]
fn nonblocking_accept_would_block() {
    let (server, _port) = listener(false);
    let err = server.accept().unwrap_err();
    assert!(err.is_would_block());
}

#[test]
fn nonblocking_connect_completes_when_writable() {
    let (server, port) = listener(true);
    let client = TcpSocket::open(false).unwrap();
    client.connect(loopback_host(), port).unwrap();

    let mut poller = Poller::new().unwrap();
    poller.register(&client, Token(42), Interest::WRITABLE).unwrap();
    let mut events = Events::with_capacity(4);
    assert_eq!(poller.wait(&mut events, WAIT).unwrap(), 1);
    let event = events.iter().next().unwrap();
    assert_eq!(event.token(), Token(42));
    assert!(event.is_writable());
    assert!(client.take_error().unwrap().is_none());

    let accepted = server.accept().unwrap();
    assert_eq!(accepted.peer_name().unwrap(), client.local_name().unwrap());
}

#[test]
fn readable_event_on_incoming_data() {
    let (client, accepted) = connected_pair();
    accepted.set_blocking(false).unwrap();
    let mut poller = Poller::new().unwrap();
    poller.register(&accepted, Token(3), Interest::READABLE).unwrap();

    let mut events = Events::with_capacity(4);
    assert_eq!(poller.wait(&mut events, Some(Duration::from_millis(20))).unwrap(), 0);

    client.send_all(b"ping").unwrap();
    assert_eq!(poller.wait(&mut events, WAIT).unwrap(), 1);
    assert!(events.iter().all(|e| e.is_readable()));
    assert_eq!(accepted.recv(16).unwrap(), b"ping");
}

#[test]
fn connect_refused() {
    let port = unused_tcp_port();
    let client = TcpSocket::open(true).unwrap();
    let err = client.connect(loopback_host(), port).unwrap_err();
    assert_eq!(err.os_code(), Some(libc::ECONNREFUSED));
    assert_eq!(err.category(), ErrorCategory::ConnectionState);
}

#[test]
fn connect_rejects_ipv4_text() {
    let client = TcpSocket::open(true).unwrap();
    let err = client.connect("127.0.0.1", 80).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::AddressTranslation);
}

#[test]
fn bind_address_in_use() {
    let (_first, port) = listener(false);
    let second = TcpSocket::open(false).unwrap();
    let err = second.bind(port, loopback_host()).unwrap_err();
    assert_eq!(err.os_code(), Some(libc::EADDRINUSE));
}

#[test]
fn write_to_closed_peer_fails_without_signal() {
    let (mut client, mut accepted) = connected_pair();
    client.set_ignore_sigpipe(true).unwrap();
    accepted.close();

    let mut failure = None;
    for _ in 0..100 {
        match client.send(b"data") {
            Ok(_) => thread::sleep(Duration::from_millis(5)),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    let err = failure.expect("send to a closed peer never failed");
    assert!(
        matches!(err.os_code(), Some(libc::EPIPE) | Some(libc::ECONNRESET)),
        "{err}"
    );
}

#[test]
fn close_twice_after_use() {
    let (mut client, _accepted) = connected_pair();
    client.close();
    client.close();
    assert!(client.is_closed());
}
