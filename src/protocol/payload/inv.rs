//! Inventory vector types.

use std::io;

use bytes::{Buf, BufMut};

use crate::protocol::payload::{codec::Codec, read_n_bytes, Hash};

/// An inventory vector.
#[derive(Debug, PartialEq, Clone)]
pub struct Inv {
    pub inventory: Vec<InvHash>,
}

impl Inv {
    /// Returns a new inventory vector from the supplied hashes.
    pub fn new(inventory: Vec<InvHash>) -> Self {
        Self { inventory }
    }

    /// Returns a new empty inventory vector.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl Codec for Inv {
    fn encode<B: BufMut>(&self, buffer: &mut B) -> io::Result<()> {
        self.inventory.encode(buffer)
    }

    fn decode<B: Buf>(bytes: &mut B) -> io::Result<Self> {
        Ok(Self {
            inventory: Vec::decode(bytes)?,
        })
    }
}

/// An inventory hash.
#[derive(Debug, PartialEq, Copy, Clone)]
pub struct InvHash {
    /// The object type linked to this inventory.
    kind: ObjectKind,
    /// The hash of the object.
    hash: Hash,
}

impl InvHash {
    /// Returns a new `InvHash` instance.
    pub fn new(kind: ObjectKind, hash: Hash) -> Self {
        Self { kind, hash }
    }
}

impl Codec for InvHash {
    fn encode<B: BufMut>(&self, buffer: &mut B) -> io::Result<()> {
        self.kind.encode(buffer)?;
        self.hash.encode(buffer)?;

        Ok(())
    }

    fn decode<B: Buf>(bytes: &mut B) -> io::Result<Self> {
        let kind = ObjectKind::decode(bytes)?;
        let hash = Hash::decode(bytes)?;

        Ok(Self { kind, hash })
    }
}

/// The inventory object kind.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ObjectKind {
    /// The hash is that of a transaction.
    Tx,
    /// The hash is that of a block.
    Block,
}

impl Codec for ObjectKind {
    fn encode<B: BufMut>(&self, buffer: &mut B) -> io::Result<()> {
        let value: u32 = match self {
            Self::Tx => 1,
            Self::Block => 2,
        };

        buffer.put_u32_le(value);

        Ok(())
    }

    fn decode<B: Buf>(bytes: &mut B) -> io::Result<Self> {
        let value = u32::from_le_bytes(read_n_bytes(bytes)?);

        let kind = match value {
            1 => Self::Tx,
            2 => Self::Block,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "ObjectKind is not known",
                ))
            }
        };

        Ok(kind)
    }
}
