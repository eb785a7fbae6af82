//! Payload types and the primitives shared between them.

pub mod addr;
pub use addr::Addr;

pub mod codec;

pub mod inv;
pub use inv::Inv;

pub mod version;
pub use version::Version;

use std::{io, ops::Deref};

use bytes::{Buf, BufMut};
use chrono::{DateTime, Utc};
use rand::{thread_rng, Rng};

use crate::protocol::payload::codec::Codec;

/// A random nonce.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Nonce(u64);

impl Default for Nonce {
    fn default() -> Self {
        Self(thread_rng().gen())
    }
}

impl Codec for Nonce {
    fn encode<B: BufMut>(&self, buffer: &mut B) -> io::Result<()> {
        buffer.put_u64_le(self.0);

        Ok(())
    }

    fn decode<B: Buf>(bytes: &mut B) -> io::Result<Self> {
        let nonce = u64::from_le_bytes(read_n_bytes(bytes)?);

        Ok(Self(nonce))
    }
}

/// The network protocol version.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct ProtocolVersion(pub u32);

impl ProtocolVersion {
    /// The protocol version spoken by current node releases.
    pub fn current() -> Self {
        Self(1)
    }
}

impl Codec for ProtocolVersion {
    fn encode<B: BufMut>(&self, buffer: &mut B) -> io::Result<()> {
        buffer.put_u32_le(self.0);

        Ok(())
    }

    fn decode<B: Buf>(bytes: &mut B) -> io::Result<Self> {
        let version = u32::from_le_bytes(read_n_bytes(bytes)?);

        Ok(Self(version))
    }
}

/// A variable length integer ("CompactSize" encoding).
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct VarInt(pub usize);

impl Deref for VarInt {
    type Target = usize;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Codec for VarInt {
    fn encode<B: BufMut>(&self, buffer: &mut B) -> io::Result<()> {
        match self.0 {
            len @ 0x0000_0000..=0x0000_00fc => {
                buffer.put_u8(len as u8);
            }
            len @ 0x0000_00fd..=0x0000_ffff => {
                buffer.put_u8(0xfd);
                buffer.put_u16_le(len as u16);
            }
            len @ 0x0001_0000..=0xffff_ffff => {
                buffer.put_u8(0xfe);
                buffer.put_u32_le(len as u32);
            }
            len => {
                buffer.put_u8(0xff);
                buffer.put_u64_le(len as u64);
            }
        }

        Ok(())
    }

    fn decode<B: Buf>(bytes: &mut B) -> io::Result<Self> {
        let flag = u8::from_le_bytes(read_n_bytes(bytes)?);

        let len = match flag {
            len @ 0x00..=0xfc => len as u64,
            0xfd => u16::from_le_bytes(read_n_bytes(bytes)?) as u64,
            0xfe => u32::from_le_bytes(read_n_bytes(bytes)?) as u64,
            0xff => u64::from_le_bytes(read_n_bytes(bytes)?),
        };

        Ok(Self(len as usize))
    }
}

/// A variable length string.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct VarStr(pub String);

impl Codec for VarStr {
    fn encode<B: BufMut>(&self, buffer: &mut B) -> io::Result<()> {
        VarInt(self.0.len()).encode(buffer)?;
        buffer.put_slice(self.0.as_bytes());

        Ok(())
    }

    fn decode<B: Buf>(bytes: &mut B) -> io::Result<Self> {
        let len = *VarInt::decode(bytes)?;
        if bytes.remaining() < len {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }

        let mut buffer = vec![0u8; len];
        bytes.copy_to_slice(&mut buffer);

        let s = String::from_utf8(buffer)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

        Ok(Self(s))
    }
}

/// A double-SHA256 hash.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Hash([u8; 32]);

impl Hash {
    pub fn new(hash: [u8; 32]) -> Self {
        Self(hash)
    }
}

impl Codec for Hash {
    fn encode<B: BufMut>(&self, buffer: &mut B) -> io::Result<()> {
        buffer.put_slice(&self.0);

        Ok(())
    }

    fn decode<B: Buf>(bytes: &mut B) -> io::Result<Self> {
        Ok(Self(read_n_bytes(bytes)?))
    }
}

pub fn read_n_bytes<const N: usize, B: Buf>(bytes: &mut B) -> io::Result<[u8; N]> {
    if bytes.remaining() < N {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }

    let mut buffer = [0u8; N];
    bytes.copy_to_slice(&mut buffer);

    Ok(buffer)
}

pub fn read_timestamp<B: Buf>(bytes: &mut B) -> io::Result<DateTime<Utc>> {
    let secs = i64::from_le_bytes(read_n_bytes(bytes)?);

    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "timestamp out of range"))
}
