//! The connection bridge: topology, lifecycle and the connection factory.
//!
//! A bridge stands between two nodes and creates a pair of inbound and
//! outbound connections for each of them, four legs in total:
//!
//! ```text
//! node A : outbound leg A -> inbound leg B : node B
//! node B : outbound leg B -> inbound leg A : node A
//! ```
//!
//! Nodes treat inbound and outbound peers differently (certain requests are
//! only ever sent to outbound peers), which is why each node gets one of
//! each rather than a single connection. Every leg is negotiated by the
//! bridge impersonating the node on the far side, and four routers then
//! tunnel all traffic between the two nodes, giving tests full control over
//! the link: inspection, pausing, dropping and severing.

pub mod handshake;
pub mod leg;
mod router;

use std::{
    io,
    net::Ipv4Addr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    net::{TcpListener, TcpStream},
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    bridge::{
        handshake::negotiate,
        leg::{LegRole, NodeTag, PeerLeg},
    },
    setup::node::BridgeNode,
};

/// How long `start` waits for a node to dial into an outbound listener.
pub const HANDOFF_TIMEOUT: Duration = Duration::from_secs(30);

/// How long the factory waits when dialing a node's listener directly.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Out-of-band notifications about self-healing restarts.
///
/// Routers restart the bridge on I/O failures without surfacing an error to
/// the caller; subscribing to these events is the only way to observe that
/// it happened, or that it failed.
#[derive(Debug)]
pub enum BridgeEvent {
    /// A router hit an I/O error and the bridge re-established all four legs.
    Restarted,
    /// A router-triggered restart failed to bring the bridge back up.
    RestartFailed(io::Error),
}

#[derive(Default)]
struct Wiring {
    inbound_a: Option<Arc<PeerLeg>>,
    outbound_a: Option<Arc<PeerLeg>>,
    inbound_b: Option<Arc<PeerLeg>>,
    outbound_b: Option<Arc<PeerLeg>>,
    listener_a: Option<Arc<TcpListener>>,
    listener_b: Option<Arc<TcpListener>>,
    // The accept tasks hold their own handles to the listeners, so a
    // listener only actually closes once its accept task is gone too.
    accept_tasks: Vec<JoinHandle<()>>,
    routers: Vec<JoinHandle<()>>,
}

/// A bidirectional communication tunnel between two nodes.
///
/// Exactly one bridge wires any given pair of nodes. After a successful
/// [`start`](ConnectionBridge::start) the bridge is fully connected: four
/// negotiated legs and four running routers. [`disconnect`]
/// (ConnectionBridge::disconnect) tears everything down; `start` may then be
/// called again, recreating all four legs from scratch.
pub struct ConnectionBridge {
    node_a: Arc<dyn BridgeNode>,
    node_b: Arc<dyn BridgeNode>,
    paused: AtomicBool,
    disabled: AtomicBool,
    wiring: Mutex<Wiring>,
    // Serializes restarts racing each other; the pending flag marks a
    // self-heal request that has not been absorbed by a rebuild yet.
    restart_lock: Mutex<()>,
    restart_pending: AtomicBool,
    events: parking_lot::Mutex<Option<mpsc::UnboundedSender<BridgeEvent>>>,
}

impl ConnectionBridge {
    /// Creates a bridge between the two nodes, ready to be started.
    pub fn new(node_a: Arc<dyn BridgeNode>, node_b: Arc<dyn BridgeNode>) -> Arc<Self> {
        Arc::new(Self {
            node_a,
            node_b,
            paused: AtomicBool::new(false),
            disabled: AtomicBool::new(false),
            wiring: Mutex::new(Wiring::default()),
            restart_lock: Mutex::new(()),
            restart_pending: AtomicBool::new(false),
            events: parking_lot::Mutex::new(None),
        })
    }

    /// Registers an observer for restart events, replacing any previous one.
    pub fn subscribe_events(&self) -> mpsc::UnboundedReceiver<BridgeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.events.lock() = Some(tx);

        rx
    }

    fn emit(&self, event: BridgeEvent) {
        if let Some(tx) = self.events.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    /// Suspends all four routers without tearing down any leg. Messages sent
    /// while paused are delayed, not dropped.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Resumes routing after a [`pause`](ConnectionBridge::pause).
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub(crate) fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    /// Establishes all four legs, negotiates them and launches the routers.
    ///
    /// Any failure aborts the sequence and is returned as-is. Resources
    /// created up to that point are left untouched, matching the node-side
    /// expectation that half-open sockets surface as peer disconnects;
    /// callers wanting a clean slate after a failed `start` must call
    /// [`disconnect`](ConnectionBridge::disconnect) themselves.
    pub async fn start(self: &Arc<Self>) -> io::Result<()> {
        self.disabled.store(false, Ordering::SeqCst);

        // The 127.0.0.1:0 pattern picks a free ephemeral port.
        let listener_a = Arc::new(TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?);
        let listener_b = Arc::new(TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?);
        {
            let mut wiring = self.wiring.lock().await;
            wiring.listener_a = Some(listener_a.clone());
            wiring.listener_b = Some(listener_b.clone());
        }

        // Dial straight into both nodes.
        let inbound_a = Arc::new(create_inbound_leg(&*self.node_a, NodeTag::A).await?);
        self.wiring.lock().await.inbound_a = Some(inbound_a.clone());
        let inbound_b = Arc::new(create_inbound_leg(&*self.node_b, NodeTag::B).await?);
        self.wiring.lock().await.inbound_b = Some(inbound_b.clone());

        // Each leg is negotiated in the name of the node on the far side.
        negotiate(&inbound_a, &*self.node_b).await?;
        negotiate(&inbound_b, &*self.node_a).await?;

        // Outbound legs only materialize once the nodes dial our listeners.
        let (accept_task, handoff) =
            create_outbound_leg(self.node_a.clone(), listener_a, NodeTag::A).await?;
        self.wiring.lock().await.accept_tasks.push(accept_task);
        let outbound_a = Arc::new(wait_for_leg(handoff).await?);
        self.wiring.lock().await.outbound_a = Some(outbound_a.clone());
        let (accept_task, handoff) =
            create_outbound_leg(self.node_b.clone(), listener_b, NodeTag::B).await?;
        self.wiring.lock().await.accept_tasks.push(accept_task);
        let outbound_b = Arc::new(wait_for_leg(handoff).await?);
        self.wiring.lock().await.outbound_b = Some(outbound_b.clone());

        negotiate(&outbound_a, &*self.node_b).await?;
        negotiate(&outbound_b, &*self.node_a).await?;

        for leg in [&inbound_a, &inbound_b, &outbound_a, &outbound_b] {
            debug!("connected {leg}");
        }

        // Tunnel all communication between the two nodes through the bridge,
        // one router per direction.
        let routers = vec![
            tokio::spawn(router::route_traffic(
                self.clone(),
                outbound_a.clone(),
                inbound_b.clone(),
            )),
            tokio::spawn(router::route_traffic(self.clone(), inbound_b, outbound_a)),
            tokio::spawn(router::route_traffic(
                self.clone(),
                outbound_b.clone(),
                inbound_a.clone(),
            )),
            tokio::spawn(router::route_traffic(self.clone(), inbound_a, outbound_b)),
        ];

        self.wiring.lock().await.routers = routers;

        info!("bridge started");

        Ok(())
    }

    /// Tears down the routers, all four legs, any pending accepts and both
    /// listeners. Calling it on an already disconnected bridge is a no-op.
    pub async fn disconnect(&self) {
        if self.disabled.swap(true, Ordering::SeqCst) {
            debug!("bridge is already disconnected, doing nothing");
            return;
        }

        let Wiring {
            inbound_a,
            outbound_a,
            inbound_b,
            outbound_b,
            listener_a,
            listener_b,
            accept_tasks,
            routers,
        } = std::mem::take(&mut *self.wiring.lock().await);

        // A router blocked in a read or write holds its leg's stream lock,
        // which the leg teardown below needs; the routers go first.
        for router in routers {
            router.abort();
            let _ = router.await;
        }

        for leg in [inbound_a, inbound_b, outbound_a, outbound_b]
            .into_iter()
            .flatten()
        {
            leg.disconnect().await;
        }

        // An accept task that never got its connection still holds a handle
        // to its listener; it has to go for the port to be released.
        for task in accept_tasks {
            task.abort();
            let _ = task.await;
        }

        // Dropping the handles closes the listeners.
        drop(listener_a);
        drop(listener_b);

        info!("bridge disconnected");
    }

    /// Disconnects and immediately starts again.
    ///
    /// A failure to re-establish the bridge is logged and swallowed rather
    /// than returned; subscribe to [`BridgeEvent`]s to observe it.
    pub async fn restart(self: &Arc<Self>) {
        let _guard = self.restart_lock.lock().await;
        self.reconnect().await;
    }

    /// The router-triggered flavor of [`restart`](ConnectionBridge::restart).
    ///
    /// Several routers usually fail for the same underlying cause; once one
    /// of them has rebuilt the bridge, the queued self-heals have nothing
    /// left to do and are dropped.
    pub(crate) async fn self_heal(self: &Arc<Self>) {
        self.restart_pending.store(true, Ordering::SeqCst);
        let _guard = self.restart_lock.lock().await;

        if !self.restart_pending.swap(false, Ordering::SeqCst)
            && self.is_fully_connected().await
        {
            debug!("bridge was already restarted, doing nothing");
            return;
        }

        self.reconnect().await;
    }

    async fn reconnect(self: &Arc<Self>) {
        self.disconnect().await;
        match self.start().await {
            Ok(()) => {
                self.emit(BridgeEvent::Restarted);
            }
            Err(err) => {
                warn!("bridge restart failed: {err}");
                self.emit(BridgeEvent::RestartFailed(err));
            }
        }
    }

    /// Whether the bridge currently has four negotiated legs and four live
    /// routers.
    pub async fn is_fully_connected(&self) -> bool {
        if self.is_disabled() {
            return false;
        }

        let wiring = self.wiring.lock().await;
        let legs = [
            &wiring.inbound_a,
            &wiring.outbound_a,
            &wiring.inbound_b,
            &wiring.outbound_b,
        ];

        legs.iter()
            .all(|leg| leg.as_ref().is_some_and(|leg| leg.is_negotiated()))
            && wiring.routers.len() == 4
            && wiring.routers.iter().all(|router| !router.is_finished())
    }
}

/// Dials directly into the node's listener and wraps the socket as an
/// inbound leg. Failures are fatal to the start sequence and are not
/// retried.
async fn create_inbound_leg(node: &dyn BridgeNode, tag: NodeTag) -> io::Result<PeerLeg> {
    let addr = node.addr();
    let stream = timeout(DIAL_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_elapsed| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("timed out dialing node {tag:?} at {addr}"),
            )
        })??;

    PeerLeg::new(stream, LegRole::Inbound, tag)
}

/// Arms an accept on the pre-bound listener and asks the node to dial out to
/// it. The accepted socket is wrapped as an outbound leg and delivered on the
/// returned handoff channel; accept failures are logged and surface to the
/// caller as a handoff timeout. The accept task's handle is returned so a
/// teardown can reap it if the node never dials.
async fn create_outbound_leg(
    node: Arc<dyn BridgeNode>,
    listener: Arc<TcpListener>,
    tag: NodeTag,
) -> io::Result<(JoinHandle<()>, oneshot::Receiver<PeerLeg>)> {
    let listener_addr = listener.local_addr()?;
    let (leg_tx, leg_rx) = oneshot::channel();

    // Intercept the node's dial on our listener.
    let accept_task = tokio::spawn(async move {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!("accept for the outbound leg of node {tag:?} failed: {err}");
                return;
            }
        };
        debug!(
            "outbound leg of node {tag:?}: got a connection from {remote_addr} on {listener_addr}"
        );

        // Initiated by the remote node, not by the bridge.
        match PeerLeg::new(stream, LegRole::Outbound, tag) {
            Ok(leg) => {
                let _ = leg_tx.send(leg);
            }
            Err(err) => warn!("could not wrap the outbound leg of node {tag:?}: {err}"),
        }
    });

    // Make the node itself dial out to the listener.
    node.connect_to(listener_addr).await?;

    Ok((accept_task, leg_rx))
}

/// Waits for an outbound leg on its handoff channel, up to the fixed
/// timeout.
async fn wait_for_leg(handoff: oneshot::Receiver<PeerLeg>) -> io::Result<PeerLeg> {
    match timeout(HANDOFF_TIMEOUT, handoff).await {
        Ok(Ok(leg)) => Ok(leg),
        Ok(Err(_recv)) => Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "the accept task exited without delivering a connection",
        )),
        Err(_elapsed) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!(
                "timed out after {}s waiting for an outbound connection",
                HANDOFF_TIMEOUT.as_secs()
            ),
        )),
    }
}
