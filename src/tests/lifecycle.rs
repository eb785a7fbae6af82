//! Bridge lifecycle: start, pause, disconnect and self-healing restarts.

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use assert_matches::assert_matches;
use async_trait::async_trait;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
    time::timeout,
};

use crate::{
    bridge::{
        leg::{LegRole, NodeTag, PeerLeg},
        BridgeEvent, ConnectionBridge,
    },
    protocol::{
        message::Message,
        payload::{
            inv::{InvHash, ObjectKind},
            Hash, Inv, Nonce,
        },
    },
    setup::{config::NodeConfig, node::BridgeNode},
    tests::{bridged_pair, node_a_config, node_b_config},
    tools::{synthetic_node::SyntheticNode, TIMEOUT},
    wait_until,
};

#[tokio::test]
async fn start_brings_up_four_negotiated_legs() {
    let (node_a, node_b, bridge) = bridged_pair().await;

    assert!(bridge.is_fully_connected().await);
    // Each node sees one inbound and one outbound peer.
    assert_eq!(node_a.num_connected(), 2);
    assert_eq!(node_b.num_connected(), 2);

    bridge.disconnect().await;
    assert!(!bridge.is_fully_connected().await);
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let (_node_a, _node_b, bridge) = bridged_pair().await;

    bridge.disconnect().await;
    // The second call has nothing left to tear down and returns immediately.
    timeout(Duration::from_secs(1), bridge.disconnect())
        .await
        .unwrap();
}

#[tokio::test]
async fn paused_traffic_is_delayed_not_dropped() {
    let (node_a, node_b, bridge) = bridged_pair().await;
    let a_peer = node_a.connected_peers()[0];

    bridge.pause();

    let pings: Vec<_> = (0..3).map(|_| Message::Ping(Nonce::default())).collect();
    for ping in &pings {
        node_a.send_direct_message(a_peer, ping.clone()).unwrap();
    }

    // Nothing crosses the bridge while it is paused.
    assert!(node_b
        .recv_message_timeout(Duration::from_millis(500))
        .await
        .is_err());

    bridge.resume();
    for expected in &pings {
        let (_, received) = node_b.recv_message_timeout(TIMEOUT).await.unwrap();
        assert_eq!(&received, expected);
    }

    bridge.disconnect().await;
}

#[tokio::test]
async fn severed_connection_triggers_a_transparent_restart() {
    let (node_a, node_b, bridge) = bridged_pair().await;
    let mut events = bridge.subscribe_events();

    let victim = node_a.connected_peers()[0];
    assert!(node_a.break_connection(victim).await);

    let event = timeout(TIMEOUT, events.recv()).await.unwrap();
    assert_matches!(event, Some(BridgeEvent::Restarted));

    wait_until!(TIMEOUT, bridge.is_fully_connected().await);
    wait_until!(
        TIMEOUT,
        node_a.num_connected() == 2 && node_b.num_connected() == 2
    );

    // Traffic flows over the rebuilt legs.
    let ping = Message::Ping(Nonce::default());
    node_a
        .send_direct_message(node_a.connected_peers()[0], ping.clone())
        .unwrap();
    let (_, received) = node_b.recv_message_timeout(TIMEOUT).await.unwrap();
    assert_eq!(received, ping);

    bridge.disconnect().await;
}

/// A node that accepts inbound connections but ignores requests to dial out,
/// recording the address it was asked to reach.
struct DeafNode {
    node: Arc<SyntheticNode>,
    requested_dial: parking_lot::Mutex<Option<SocketAddr>>,
}

impl DeafNode {
    fn new(node: Arc<SyntheticNode>) -> Self {
        Self {
            node,
            requested_dial: parking_lot::Mutex::new(None),
        }
    }
}

#[async_trait]
impl BridgeNode for DeafNode {
    fn config(&self) -> &NodeConfig {
        self.node.config()
    }

    fn addr(&self) -> SocketAddr {
        self.node.listening_addr()
    }

    fn block_height(&self) -> u32 {
        self.node.block_height()
    }

    async fn connect_to(&self, addr: SocketAddr) -> io::Result<()> {
        *self.requested_dial.lock() = Some(addr);
        Ok(())
    }
}

#[tokio::test]
async fn start_times_out_when_a_node_never_dials_back() {
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
            .build()
            .await
            .unwrap(),
    );

    let deaf = Arc::new(DeafNode::new(node_a.clone()));
    let bridge = ConnectionBridge::new(deaf.clone(), node_b.clone());

    let err = bridge.start().await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    assert!(!bridge.is_fully_connected().await);

    // A failed start leaves the partial wiring in place until the caller
    // cleans up.
    bridge.disconnect().await;

    // The cleanup reclaims the listener the node was asked to dial; its
    // port must no longer accept connections.
    let listener_addr = deaf.requested_dial.lock().take().unwrap();
    assert!(TcpStream::connect(listener_addr).await.is_err());
}

#[tokio::test]
async fn disconnect_is_not_blocked_by_a_stalled_write() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // A peer that accepts and then never reads, so the socket buffers on
    // both sides fill up.
    let (hold_tx, hold_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        let _ = hold_rx.await;
    });

    let stream = TcpStream::connect(addr).await.unwrap();
    let leg = Arc::new(PeerLeg::new(stream, LegRole::Inbound, NodeTag::A).unwrap());

    // Pump large messages at the peer until a send blocks mid-frame.
    let inv = Inv::new(vec![InvHash::new(ObjectKind::Tx, Hash::new([7; 32])); 20_000]);
    let pump_leg = leg.clone();
    tokio::spawn(async move {
        loop {
            if pump_leg.send(&Message::Inv(inv.clone())).await.is_err() {
                break;
            }
        }
    });
    tokio::time::sleep(Duration::from_millis(500)).await;

    // The blocked write must not stall the teardown.
    timeout(Duration::from_secs(5), leg.disconnect())
        .await
        .unwrap();

    drop(hold_tx);
}
