//! The node-side interface consumed by the bridge.

use std::{io, net::SocketAddr};

use async_trait::async_trait;

use crate::setup::config::NodeConfig;

/// One end of a bridge.
///
/// The bridge needs only a narrow view of a node: enough public state to
/// impersonate it during handshakes, and a way of asking it to dial out.
/// The node's state machine, address book and storage are none of the
/// bridge's business.
#[async_trait]
pub trait BridgeNode: Send + Sync {
    /// The node's public configuration, copied into synthesized version
    /// messages.
    fn config(&self) -> &NodeConfig;

    /// The address the node listens on for inbound connections.
    fn addr(&self) -> SocketAddr;

    /// The block height of the node's current chain tip.
    fn block_height(&self) -> u32;

    /// Asks the node to attempt an outbound connection to `addr`.
    ///
    /// Implementations must only trigger the attempt and return. Awaiting the
    /// completed handshake here would deadlock against the bridge, which
    /// negotiates outbound legs only after both of them have been accepted.
    async fn connect_to(&self, addr: SocketAddr) -> io::Result<()>;
}
