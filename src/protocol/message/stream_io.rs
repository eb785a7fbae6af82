//! Reading and writing messages directly over an async stream.
//!
//! The bridge's peer legs use these, as opposed to the framed codec used by
//! the synthetic node, since each leg's read and write halves are driven by
//! different routers.

use bytes::BytesMut;
use tokio::io::{self, AsyncReadExt, AsyncWriteExt};

use crate::protocol::{
    message::{
        constants::{HEADER_LEN, MAX_MESSAGE_LEN},
        Message, MessageHeader,
    },
    payload::codec::Codec,
};

impl MessageHeader {
    /// Writes the message header to the stream.
    pub async fn write_to_stream<T: AsyncWriteExt + Unpin>(
        &self,
        stream: &mut T,
    ) -> io::Result<()> {
        let mut buffer = BytesMut::with_capacity(HEADER_LEN);
        self.encode(&mut buffer)?;

        stream.write_all(&buffer).await?;

        Ok(())
    }

    /// Reads a message header from the stream.
    pub async fn read_from_stream<T: AsyncReadExt + Unpin>(stream: &mut T) -> io::Result<Self> {
        let mut buffer = [0u8; HEADER_LEN];
        stream.read_exact(&mut buffer).await?;

        MessageHeader::decode(&mut &buffer[..])
    }
}

impl Message {
    /// Writes the message to the stream.
    pub async fn write_to_stream<T: AsyncWriteExt + Unpin>(
        &self,
        stream: &mut T,
    ) -> io::Result<()> {
        let mut buffer = BytesMut::new();
        self.encode(&mut buffer)?;

        stream.write_all(&buffer).await?;

        Ok(())
    }

    /// Reads a message from the stream.
    pub async fn read_from_stream<T: AsyncReadExt + Unpin>(stream: &mut T) -> io::Result<Self> {
        let header = MessageHeader::read_from_stream(stream).await?;
        if header.body_length as usize > MAX_MESSAGE_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("body length of {} exceeds the limit", header.body_length),
            ));
        }

        let mut buffer = vec![0u8; header.body_length as usize];
        stream.read_exact(&mut buffer).await?;

        Message::decode(header.command, &mut &buffer[..])
    }
}
