//! Version/verack negotiation, impersonating a bridged node.

use std::{io, time::Duration};

use chrono::Utc;
use tracing::debug;

use crate::{
    bridge::leg::PeerLeg,
    protocol::{
        message::Message,
        payload::{
            version::{SERVICE_ARCHIVAL, SERVICE_FULL_NODE, SERVICE_HYPER_SYNC},
            Nonce, ProtocolVersion, VarStr, Version,
        },
    },
    setup::{config::NodeConfig, node::BridgeNode},
};

/// How long to wait for each reply during version negotiation.
pub const NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the version message the impersonated node would have sent itself.
///
/// Every field is copied from the node's public state, so the receiving real
/// node sees a version message indistinguishable from one its peer would have
/// produced. Nothing of the bridge's own identity leaks in; only the nonce is
/// fresh.
pub fn synthesize_version(config: &NodeConfig, start_height: u32) -> Version {
    let mut services = SERVICE_FULL_NODE;
    if config.hyper_sync {
        services |= SERVICE_HYPER_SYNC;
        if config.archival_mode {
            services |= SERVICE_ARCHIVAL;
        }
    }

    Version {
        version: ProtocolVersion(config.protocol_version),
        services,
        timestamp: Utc::now(),
        nonce: Nonce::default(),
        user_agent: VarStr(config.user_agent.clone()),
        start_height,
        min_fee_rate: config.min_fee_rate,
    }
}

/// Runs the full version/verack exchange on `leg`, pretending to be
/// `impersonated`.
///
/// On success the leg is flagged as negotiated, which is required before it
/// may be handed to a traffic router. Any timeout, unexpected message kind or
/// nonce mismatch aborts with an error and leaves the leg non-negotiated.
pub async fn negotiate(leg: &PeerLeg, impersonated: &dyn BridgeNode) -> io::Result<()> {
    let version = synthesize_version(impersonated.config(), impersonated.block_height());
    let sent_nonce = version.nonce;
    leg.record_sent_nonce(sent_nonce);

    leg.send(&Message::Version(version)).await?;

    let peer_version = match leg.recv_timeout(NEGOTIATION_TIMEOUT).await? {
        Message::Version(version) => version,
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("expected a version reply, got {other}"),
            ))
        }
    };
    leg.record_peer_version(&peer_version);

    // Echo the peer's nonce back to it.
    leg.send(&Message::Verack(peer_version.nonce)).await?;

    match leg.recv_timeout(NEGOTIATION_TIMEOUT).await? {
        Message::Verack(nonce) if nonce == sent_nonce => {}
        Message::Verack(nonce) => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "verack nonce doesn't match (received: {:?}, sent: {:?})",
                    nonce, sent_nonce
                ),
            ))
        }
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("expected a verack, got {other}"),
            ))
        }
    }

    leg.set_negotiated();
    debug!("negotiated {leg}");

    Ok(())
}
