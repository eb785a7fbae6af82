//! Traffic routing through a started bridge.

use std::time::Duration;

use crate::{
    protocol::{
        message::Message,
        payload::{
            inv::{InvHash, ObjectKind},
            Addr, Hash, Inv, Nonce,
        },
    },
    tests::bridged_pair,
    tools::TIMEOUT,
};

#[tokio::test]
async fn message_sent_through_the_bridge_is_delivered() {
    let (node_a, node_b, bridge) = bridged_pair().await;
    let a_peer = node_a.connected_peers()[0];

    let ping = Message::Ping(Nonce::default());
    node_a.send_direct_message(a_peer, ping.clone()).unwrap();

    let (_, received) = node_b.recv_message_timeout(TIMEOUT).await.unwrap();
    assert_eq!(received, ping);

    bridge.disconnect().await;
}

#[tokio::test]
async fn traffic_is_relayed_in_order_in_both_directions() {
    let (node_a, node_b, bridge) = bridged_pair().await;
    let a_peer = node_a.connected_peers()[0];
    let b_peer = node_b.connected_peers()[0];

    let inv = Inv::new(vec![
        InvHash::new(ObjectKind::Block, Hash::new([1; 32])),
        InvHash::new(ObjectKind::Tx, Hash::new([2; 32])),
    ]);

    let a_to_b = vec![
        Message::Ping(Nonce::default()),
        Message::Inv(inv.clone()),
        Message::GetData(inv.clone()),
        Message::MemPool,
    ];
    for message in &a_to_b {
        node_a.send_direct_message(a_peer, message.clone()).unwrap();
    }
    for expected in &a_to_b {
        let (_, received) = node_b.recv_message_timeout(TIMEOUT).await.unwrap();
        assert_eq!(&received, expected);
    }

    let b_to_a = vec![Message::Pong(Nonce::default()), Message::NotFound(inv)];
    for message in &b_to_a {
        node_b.send_direct_message(b_peer, message.clone()).unwrap();
    }
    for expected in &b_to_a {
        let (_, received) = node_a.recv_message_timeout(TIMEOUT).await.unwrap();
        assert_eq!(&received, expected);
    }

    bridge.disconnect().await;
}

#[tokio::test]
async fn peer_discovery_messages_are_not_forwarded() {
    let (node_a, node_b, bridge) = bridged_pair().await;
    let a_peer = node_a.connected_peers()[0];

    node_a.send_direct_message(a_peer, Message::GetAddr).unwrap();
    node_a
        .send_direct_message(a_peer, Message::Addr(Addr::empty()))
        .unwrap();
    let ping = Message::Ping(Nonce::default());
    node_a.send_direct_message(a_peer, ping.clone()).unwrap();

    // The ping went through the same router as the discovery messages, so
    // their absence below means dropped, not reordered.
    let (_, received) = node_b.recv_message_timeout(TIMEOUT).await.unwrap();
    assert_eq!(received, ping);
    assert!(node_b
        .recv_message_timeout(Duration::from_millis(300))
        .await
        .is_err());

    bridge.disconnect().await;
}
