//! Version payload types.

use std::io;

use bytes::{Buf, BufMut};
use chrono::{DateTime, Utc};

use crate::protocol::payload::{
    codec::Codec, read_n_bytes, read_timestamp, Nonce, ProtocolVersion, VarStr,
};

/// The sender runs a full node.
pub const SERVICE_FULL_NODE: u64 = 1;
/// The sender can serve state snapshots (hyper sync).
pub const SERVICE_HYPER_SYNC: u64 = 1 << 1;
/// The sender keeps complete historical state alongside snapshots.
pub const SERVICE_ARCHIVAL: u64 = 1 << 2;

/// A version payload.
#[derive(Debug, PartialEq, Clone)]
pub struct Version {
    /// The protocol version of the sender.
    pub version: ProtocolVersion,
    /// The service capabilities supported by the sender.
    pub services: u64,
    /// The timestamp of the message.
    pub timestamp: DateTime<Utc>,
    /// The nonce associated with this message, echoed back in the verack.
    pub nonce: Nonce,
    /// The user agent of the sender.
    pub user_agent: VarStr,
    /// The block height of the sender's current chain tip.
    pub start_height: u32,
    /// The minimum fee rate the sender admits into its mempool, in nanos per KB.
    pub min_fee_rate: u64,
}

impl Codec for Version {
    fn encode<B: BufMut>(&self, buffer: &mut B) -> io::Result<()> {
        self.version.encode(buffer)?;
        buffer.put_u64_le(self.services);
        buffer.put_i64_le(self.timestamp.timestamp());

        self.nonce.encode(buffer)?;
        self.user_agent.encode(buffer)?;
        buffer.put_u32_le(self.start_height);
        buffer.put_u64_le(self.min_fee_rate);

        Ok(())
    }

    fn decode<B: Buf>(bytes: &mut B) -> io::Result<Self> {
        let version = ProtocolVersion::decode(bytes)?;
        let services = u64::from_le_bytes(read_n_bytes(bytes)?);
        let timestamp = read_timestamp(bytes)?;

        let nonce = Nonce::decode(bytes)?;
        let user_agent = VarStr::decode(bytes)?;

        let start_height = u32::from_le_bytes(read_n_bytes(bytes)?);
        let min_fee_rate = u64::from_le_bytes(read_n_bytes(bytes)?);

        Ok(Self {
            version,
            services,
            timestamp,
            nonce,
            user_agent,
            start_height,
            min_fee_rate,
        })
    }
}
