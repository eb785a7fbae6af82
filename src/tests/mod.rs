mod handshake;
mod lifecycle;
mod routing;

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;

use crate::{
    bridge::ConnectionBridge,
    setup::{config::NodeConfig, node::BridgeNode},
    tools::{synthetic_node::SyntheticNode, TIMEOUT},
    wait_until,
};

fn node_a_config() -> NodeConfig {
    NodeConfig {
        protocol_version: 1,
        user_agent: String::from("/node-a:1.0.0/"),
        min_fee_rate: 1_000,
        hyper_sync: true,
        archival_mode: true,
    }
}

fn node_b_config() -> NodeConfig {
    NodeConfig {
        protocol_version: 1,
        user_agent: String::from("/node-b:2.3.1/"),
        min_fee_rate: 500,
        hyper_sync: false,
        archival_mode: false,
    }
}

/// Two synthetic nodes with distinct identities, bridged and started.
async fn bridged_pair() -> (
    Arc<SyntheticNode>,
    Arc<SyntheticNode>,
    Arc<ConnectionBridge>,
) {
    let node_a = Arc::new(
        SyntheticNode::builder()
            .with_config(node_a_config())
            .with_start_height(100)
            .build()
            .await
            .unwrap(),
    );
    let node_b = Arc::new(
        SyntheticNode::builder()
            .with_config(node_b_config())
            .with_start_height(99)
            .build()
            .await
            .unwrap(),
    );

    let bridge = ConnectionBridge::new(node_a.clone(), node_b.clone());
    bridge.start().await.unwrap();

    // The nodes register their sides of the connections asynchronously.
    wait_until!(
        TIMEOUT,
        node_a.num_connected() == 2 && node_b.num_connected() == 2
    );

    (node_a, node_b, bridge)
}

/// A fixed identity without any node behind it, for negotiating single legs
/// in isolation.
struct StubNode {
    config: NodeConfig,
    addr: SocketAddr,
    start_height: u32,
}

impl StubNode {
    fn new(config: NodeConfig, start_height: u32) -> Self {
        Self {
            config,
            addr: "127.0.0.1:0".parse().unwrap(),
            start_height,
        }
    }
}

#[async_trait]
impl BridgeNode for StubNode {
    fn config(&self) -> &NodeConfig {
        &self.config
    }

    fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn block_height(&self) -> u32 {
        self.start_height
    }

    async fn connect_to(&self, _addr: SocketAddr) -> io::Result<()> {
        Ok(())
    }
}
