//! Network address payload types.

use std::{
    io,
    net::{IpAddr::*, Ipv6Addr, SocketAddr},
};

use bytes::{Buf, BufMut};
use chrono::{DateTime, Utc};

use crate::protocol::payload::{codec::Codec, read_n_bytes, read_timestamp};

/// A list of known peer addresses.
#[derive(Debug, PartialEq, Clone)]
pub struct Addr {
    pub addrs: Vec<NetworkAddr>,
}

impl Addr {
    /// Returns an `Addr` containing the supplied addresses.
    pub fn new(addrs: Vec<NetworkAddr>) -> Self {
        Self { addrs }
    }

    /// Returns an empty `Addr`.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl Codec for Addr {
    fn encode<B: BufMut>(&self, buffer: &mut B) -> io::Result<()> {
        self.addrs.encode(buffer)
    }

    fn decode<B: Buf>(bytes: &mut B) -> io::Result<Self> {
        Ok(Self {
            addrs: Vec::decode(bytes)?,
        })
    }
}

/// An advertised peer address.
#[derive(Debug, PartialEq, Clone)]
pub struct NetworkAddr {
    /// When the advertising peer last heard from this address.
    pub last_seen: DateTime<Utc>,
    /// The services supported by this address.
    pub services: u64,
    /// The address itself.
    pub addr: SocketAddr,
}

impl NetworkAddr {
    /// Returns a `NetworkAddr` advertising `addr` as freshly seen.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            last_seen: Utc::now(),
            services: 1,
            addr,
        }
    }
}

impl Codec for NetworkAddr {
    fn encode<B: BufMut>(&self, buffer: &mut B) -> io::Result<()> {
        buffer.put_i64_le(self.last_seen.timestamp());
        buffer.put_u64_le(self.services);

        let (ip, port) = match self.addr {
            SocketAddr::V4(v4) => (v4.ip().to_ipv6_mapped(), v4.port()),
            SocketAddr::V6(v6) => (*v6.ip(), v6.port()),
        };

        buffer.put_slice(&ip.octets());
        buffer.put_u16(port);

        Ok(())
    }

    fn decode<B: Buf>(bytes: &mut B) -> io::Result<Self> {
        let last_seen = read_timestamp(bytes)?;
        let services = u64::from_le_bytes(read_n_bytes(bytes)?);

        let octets: [u8; 16] = read_n_bytes(bytes)?;
        let v6_addr = Ipv6Addr::from(octets);

        let ip_addr = match v6_addr.to_ipv4_mapped() {
            Some(v4_addr) => V4(v4_addr),
            None => V6(v6_addr),
        };

        let port = u16::from_be_bytes(read_n_bytes(bytes)?);

        Ok(Self {
            last_seen,
            services,
            addr: SocketAddr::new(ip_addr, port),
        })
    }
}
