use std::io;

use bytes::{Buf, BufMut};

use super::VarInt;

pub trait Codec {
    fn encode<B: BufMut>(&self, buffer: &mut B) -> io::Result<()>;
    fn decode<B: Buf>(bytes: &mut B) -> io::Result<Self>
    where
        Self: Sized;
}

impl<T: Codec> Codec for Vec<T> {
    fn encode<B: BufMut>(&self, buffer: &mut B) -> io::Result<()> {
        VarInt(self.len()).encode(buffer)?;
        for element in self {
            element.encode(buffer)?;
        }

        Ok(())
    }

    fn decode<B: Buf>(bytes: &mut B) -> io::Result<Self>
    where
        Self: Sized,
    {
        let length = *VarInt::decode(bytes)?;
        (0..length)
            .map(|_| T::decode(bytes))
            .collect::<io::Result<Self>>()
    }
}
