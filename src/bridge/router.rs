//! The one-directional message pump between two legs.

use std::{sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::{
    bridge::{leg::PeerLeg, ConnectionBridge},
    protocol::message::Message,
};

/// Poll granularity while the bridge is paused.
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Pumps messages from `source` to `destination` until the bridge is
/// disabled or an I/O error forces a restart.
///
/// While the bridge is paused no message is consumed from the source, so
/// traffic is delayed, never lost. Peer discovery messages are swallowed;
/// everything else is forwarded verbatim, in read order. The task may block
/// in a read or write indefinitely; `disconnect` aborts it rather than
/// waiting for it to notice the disabled flag.
pub(super) async fn route_traffic(
    bridge: Arc<ConnectionBridge>,
    source: Arc<PeerLeg>,
    destination: Arc<PeerLeg>,
) {
    loop {
        if bridge.is_disabled() {
            break;
        }
        if bridge.is_paused() {
            sleep(PAUSE_POLL_INTERVAL).await;
            continue;
        }

        let message = source.recv().await;
        // A read raced against a disconnect is not a routing failure.
        if bridge.is_disabled() {
            break;
        }

        let message = match message {
            Ok(message) => message,
            Err(err) => {
                warn!("read failed on {source}: {err}, restarting the bridge");
                restart_in_background(bridge);
                return;
            }
        };

        match message {
            // The bridge does not emulate peer discovery gossip between its
            // two ends.
            Message::Addr(_) | Message::GetAddr => continue,
            message => {
                // A read that raced the pause flag is held back here instead
                // of being delivered early.
                while bridge.is_paused() && !bridge.is_disabled() {
                    sleep(PAUSE_POLL_INTERVAL).await;
                }
                if bridge.is_disabled() {
                    break;
                }

                debug!("forwarding {message} from {source} to {destination}");
                if let Err(err) = destination.send(&message).await {
                    warn!("write failed on {destination}: {err}, restarting the bridge");
                    restart_in_background(bridge);
                    return;
                }
            }
        }
    }
}

// The restart runs on a fresh task: its disconnect phase tears down every
// router, and a router must not tear down itself.
fn restart_in_background(bridge: Arc<ConnectionBridge>) {
    tokio::spawn(async move { bridge.self_heal().await });
}
