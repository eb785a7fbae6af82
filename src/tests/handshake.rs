//! Version negotiation, tested against raw sockets speaking the protocol by
//! hand.

use std::io::ErrorKind;

use tokio::net::{TcpListener, TcpStream};

use crate::{
    bridge::{
        handshake::{negotiate, synthesize_version},
        leg::{LegRole, NodeTag, PeerLeg},
    },
    protocol::{
        message::Message,
        payload::{
            version::{SERVICE_ARCHIVAL, SERVICE_FULL_NODE, SERVICE_HYPER_SYNC},
            Nonce,
        },
    },
    tests::{node_a_config, node_b_config, StubNode},
};

#[test]
fn version_is_synthesized_from_the_node_identity() {
    let config = node_a_config();
    let version = synthesize_version(&config, 100);

    assert_eq!(version.version.0, config.protocol_version);
    assert_eq!(
        version.services,
        SERVICE_FULL_NODE | SERVICE_HYPER_SYNC | SERVICE_ARCHIVAL
    );
    assert_eq!(version.user_agent.0, config.user_agent);
    assert_eq!(version.start_height, 100);
    assert_eq!(version.min_fee_rate, config.min_fee_rate);
}

#[test]
fn archival_flag_requires_hyper_sync() {
    // Archival mode is a refinement of hyper sync; without it the flag must
    // not be advertised.
    let mut config = node_a_config();
    config.hyper_sync = false;
    assert_eq!(synthesize_version(&config, 0).services, SERVICE_FULL_NODE);

    assert_eq!(
        synthesize_version(&node_b_config(), 0).services,
        SERVICE_FULL_NODE
    );
}

#[test]
fn every_synthesized_version_gets_a_fresh_nonce() {
    let config = node_b_config();

    assert_ne!(
        synthesize_version(&config, 0).nonce,
        synthesize_version(&config, 0).nonce
    );
}

#[tokio::test]
async fn negotiation_succeeds_against_a_conforming_peer() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let peer = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let bridge_nonce = match Message::read_from_stream(&mut stream).await.unwrap() {
            Message::Version(version) => version.nonce,
            other => panic!("expected a version, got {other}"),
        };

        let own_version = synthesize_version(&node_b_config(), 7);
        let own_nonce = own_version.nonce;
        Message::Version(own_version)
            .write_to_stream(&mut stream)
            .await
            .unwrap();

        // The bridge must echo our nonce before we confirm its own.
        assert_eq!(
            Message::read_from_stream(&mut stream).await.unwrap(),
            Message::Verack(own_nonce)
        );
        Message::Verack(bridge_nonce)
            .write_to_stream(&mut stream)
            .await
            .unwrap();

        (own_nonce, bridge_nonce)
    });

    let stream = TcpStream::connect(addr).await.unwrap();
    let leg = PeerLeg::new(stream, LegRole::Inbound, NodeTag::B).unwrap();
    let impersonated = StubNode::new(node_a_config(), 100);

    negotiate(&leg, &impersonated).await.unwrap();
    let (peer_nonce, bridge_nonce) = peer.await.unwrap();

    assert!(leg.is_negotiated());
    assert_eq!(leg.sent_nonce(), Some(bridge_nonce));
    assert_eq!(leg.received_nonce(), Some(peer_nonce));
    assert!(leg.time_connected().is_some());
    assert!(leg.time_offset_secs().abs() <= 2);
}

#[tokio::test]
async fn negotiation_rejects_a_verack_with_the_wrong_nonce() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let peer = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let _version = Message::read_from_stream(&mut stream).await.unwrap();
        Message::Version(synthesize_version(&node_b_config(), 7))
            .write_to_stream(&mut stream)
            .await
            .unwrap();

        let _verack = Message::read_from_stream(&mut stream).await.unwrap();
        Message::Verack(Nonce::default())
            .write_to_stream(&mut stream)
            .await
            .unwrap();
    });

    let stream = TcpStream::connect(addr).await.unwrap();
    let leg = PeerLeg::new(stream, LegRole::Inbound, NodeTag::B).unwrap();
    let impersonated = StubNode::new(node_a_config(), 100);

    let err = negotiate(&leg, &impersonated).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
    assert!(!leg.is_negotiated());

    peer.await.unwrap();
}

#[tokio::test]
async fn negotiation_rejects_a_non_version_reply() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let peer = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let _version = Message::read_from_stream(&mut stream).await.unwrap();
        Message::Ping(Nonce::default())
            .write_to_stream(&mut stream)
            .await
            .unwrap();
    });

    let stream = TcpStream::connect(addr).await.unwrap();
    let leg = PeerLeg::new(stream, LegRole::Inbound, NodeTag::A).unwrap();
    let impersonated = StubNode::new(node_b_config(), 99);

    let err = negotiate(&leg, &impersonated).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
    assert!(!leg.is_negotiated());

    peer.await.unwrap();
}

#[tokio::test]
async fn negotiation_times_out_without_a_reply() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // A peer that accepts, reads the version and then goes silent, keeping
    // the socket open until the test ends.
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _version = Message::read_from_stream(&mut stream).await.unwrap();
        let _eof = Message::read_from_stream(&mut stream).await;
    });

    let stream = TcpStream::connect(addr).await.unwrap();
    let leg = PeerLeg::new(stream, LegRole::Inbound, NodeTag::A).unwrap();
    let impersonated = StubNode::new(node_b_config(), 99);

    let err = negotiate(&leg, &impersonated).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TimedOut);
    assert!(!leg.is_negotiated());
}
