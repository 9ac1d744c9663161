//! Address translation between IPv6 text and the kernel's binary form.
//!
//! Byte order and `sockaddr_in6` layout are handled here and nowhere else;
//! the rest of the crate sees [`Ipv6Binary`] and [`SocketAddress`] values.

use std::{
    fmt, mem,
    net::{Ipv6Addr, SocketAddrV6},
};

use crate::error::{Error, Result};

/// A 16-byte IPv6 address in network order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv6Binary([u8; 16]);

impl Ipv6Binary {
    /// `::`
    pub const UNSPECIFIED: Ipv6Binary = Ipv6Binary([0; 16]);

    /// `::1`
    pub const LOOPBACK: Ipv6Binary =
        Ipv6Binary([0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);

    pub const fn from_octets(octets: [u8; 16]) -> Self {
        Ipv6Binary(octets)
    }

    pub const fn octets(&self) -> [u8; 16] {
        self.0
    }
}

impl From<Ipv6Addr> for Ipv6Binary {
    fn from(addr: Ipv6Addr) -> Self {
        Ipv6Binary(addr.octets())
    }
}

impl From<Ipv6Binary> for Ipv6Addr {
    fn from(bin: Ipv6Binary) -> Self {
        Ipv6Addr::from(bin.0)
    }
}

/// Parses IPv6 literal text (`::1`, `fe80::2`, `::ffff:10.0.0.1`).
///
/// Dotted-quad IPv4 text is rejected; use the IPv4-mapped form instead.
pub fn text_to_binary(text: &str) -> Result<Ipv6Binary> {
    text.parse::<Ipv6Addr>()
        .map(Ipv6Binary::from)
        .map_err(|_| Error::Address {
            text: text.to_owned(),
        })
}

/// Renders the canonical (RFC 5952) text form.
pub fn binary_to_text(binary: &Ipv6Binary) -> String {
    Ipv6Addr::from(*binary).to_string()
}

/// An IPv6 address and port, the value pair used at call boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketAddress {
    ip: Ipv6Binary,
    port: u16,
}

impl SocketAddress {
    pub const fn new(ip: Ipv6Binary, port: u16) -> Self {
        Self { ip, port }
    }

    /// Translates `host` first; nothing else happens if that fails.
    pub fn parse(host: &str, port: u16) -> Result<Self> {
        Ok(Self::new(text_to_binary(host)?, port))
    }

    pub fn ip(&self) -> Ipv6Binary {
        self.ip
    }

    pub fn host(&self) -> String {
        binary_to_text(&self.ip)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `(host text, port)`, the shape `peer_name` hands back.
    pub fn to_pair(&self) -> (String, u16) {
        (self.host(), self.port)
    }

    pub(crate) fn to_raw(&self) -> libc::sockaddr_in6 {
        // zeroed covers sin6_flowinfo, sin6_scope_id and any padding
        let mut raw: libc::sockaddr_in6 = unsafe { mem::zeroed() };
        #[cfg(target_vendor = "apple")]
        {
            raw.sin6_len = mem::size_of::<libc::sockaddr_in6>() as u8;
        }
        raw.sin6_family = libc::AF_INET6 as libc::sa_family_t;
        raw.sin6_port = self.port.to_be();
        raw.sin6_addr = libc::in6_addr {
            s6_addr: self.ip.octets(),
        };
        raw
    }

    /// Decodes what `accept`, `getpeername` or `getsockname` filled in.
    pub(crate) fn from_raw(
        storage: &libc::sockaddr_storage,
        len: libc::socklen_t,
    ) -> Result<Self> {
        let family = storage.ss_family as i32;
        if family != libc::AF_INET6
            || (len as usize) < mem::size_of::<libc::sockaddr_in6>()
        {
            return Err(Error::AddressFamily { family });
        }
        // sockaddr_storage is large enough and aligned for every sockaddr
        let raw = unsafe {
            &*(storage as *const libc::sockaddr_storage
                as *const libc::sockaddr_in6)
        };
        Ok(Self {
            ip: Ipv6Binary(raw.sin6_addr.s6_addr),
            port: u16::from_be(raw.sin6_port),
        })
    }
}

impl From<SocketAddrV6> for SocketAddress {
    fn from(addr: SocketAddrV6) -> Self {
        Self::new(Ipv6Binary::from(*addr.ip()), addr.port())
    }
}

impl From<SocketAddress> for SocketAddrV6 {
    fn from(addr: SocketAddress) -> Self {
        SocketAddrV6::new(addr.ip.into(), addr.port, 0, 0)
    }
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]:{}", self.host(), self.port)
    }
}
