//! Node configuration consumed by the bridge.

/// The public configuration of a bridged node.
///
/// The bridge copies these fields into the version messages it synthesizes
/// when impersonating the node, so they should mirror what the node itself
/// would advertise.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    /// The wire protocol version the node speaks.
    pub protocol_version: u32,
    /// The user agent advertised by the node.
    pub user_agent: String,
    /// The minimum fee rate (nanos per KB) the node admits into its mempool.
    pub min_fee_rate: u64,
    /// Whether the node serves state snapshots.
    pub hyper_sync: bool,
    /// Whether the node keeps archival state; only advertised together with
    /// hyper sync.
    pub archival_mode: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            protocol_version: 1,
            user_agent: String::from("/synthetic-node:0.1.0/"),
            min_fee_rate: 0,
            hyper_sync: false,
            archival_mode: false,
        }
    }
}
