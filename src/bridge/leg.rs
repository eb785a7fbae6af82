//! A peer leg: one endpoint of one of the bridge's four socket connections.

use std::{
    fmt, io,
    net::SocketAddr,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use chrono::{DateTime, Utc};
use rand::{thread_rng, Rng};
use tokio::{
    io::AsyncWriteExt,
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::Mutex,
    time::timeout,
};

use crate::protocol::{
    message::Message,
    payload::{Nonce, Version},
};

/// How long `disconnect` waits for an in-flight write to release the socket.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Which side of the node's connection set the leg stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegRole {
    /// The bridge dialed into the node's listener, so the node sees the leg
    /// as an incoming connection.
    Inbound,
    /// The node dialed out to one of the bridge's ephemeral listeners.
    Outbound,
}

/// The logical node a leg is routed for.
///
/// The leg does not belong to the node process; the tag only disambiguates
/// the four legs for routing and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeTag {
    A,
    B,
}

#[derive(Debug, Default)]
struct Negotiation {
    nonce_sent: Option<Nonce>,
    nonce_received: Option<Nonce>,
    time_connected: Option<DateTime<Utc>>,
    time_offset_secs: i64,
}

/// A socket wrapper carrying the handshake state of one bridge connection.
///
/// A leg is created by the connection factory, mutated by the handshake
/// engine during negotiation and torn down on disconnect. Legs are never
/// reused across a restart; a new one is always constructed.
pub struct PeerLeg {
    id: u64,
    role: LegRole,
    node: NodeTag,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    negotiation: parking_lot::Mutex<Negotiation>,
    negotiated: AtomicBool,
}

impl PeerLeg {
    /// Wraps a freshly established stream, assigning it a random identifier.
    pub fn new(stream: TcpStream, role: LegRole, node: NodeTag) -> io::Result<Self> {
        let local_addr = stream.local_addr()?;
        let remote_addr = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();

        Ok(Self {
            id: thread_rng().gen(),
            role,
            node,
            local_addr,
            remote_addr,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            negotiation: parking_lot::Mutex::new(Negotiation::default()),
            negotiated: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn role(&self) -> LegRole {
        self.role
    }

    pub fn node(&self) -> NodeTag {
        self.node
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Sends a message over the leg.
    pub async fn send(&self, message: &Message) -> io::Result<()> {
        message.write_to_stream(&mut *self.writer.lock().await).await
    }

    /// Reads the next message from the leg, blocking until one arrives.
    pub async fn recv(&self) -> io::Result<Message> {
        Message::read_from_stream(&mut *self.reader.lock().await).await
    }

    /// Reads the next message from the leg, erroring out if `duration`
    /// elapses first.
    pub async fn recv_timeout(&self, duration: Duration) -> io::Result<Message> {
        match timeout(duration, self.recv()).await {
            Ok(result) => result,
            Err(_elapsed) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!(
                    "could not read message after {0:.3}s",
                    duration.as_secs_f64()
                ),
            )),
        }
    }

    /// Shuts the underlying socket down, best-effort.
    ///
    /// A write stalled on a peer that stopped draining its socket holds the
    /// writer lock indefinitely; rather than wait behind it, the leg gives
    /// up after a grace period and lets the socket close when the last
    /// reference to it is dropped.
    pub async fn disconnect(&self) {
        if let Ok(mut writer) = timeout(SHUTDOWN_GRACE, self.writer.lock()).await {
            let _ = writer.shutdown().await;
        }
    }

    pub(crate) fn record_sent_nonce(&self, nonce: Nonce) {
        self.negotiation.lock().nonce_sent = Some(nonce);
    }

    /// Records the peer's nonce, connection timestamp and clock offset from
    /// its version message.
    pub(crate) fn record_peer_version(&self, version: &Version) {
        let mut negotiation = self.negotiation.lock();
        negotiation.nonce_received = Some(version.nonce);
        negotiation.time_connected = Some(version.timestamp);
        negotiation.time_offset_secs = version.timestamp.timestamp() - Utc::now().timestamp();
    }

    /// The nonce this side sent in its version message, if negotiation got
    /// that far.
    pub fn sent_nonce(&self) -> Option<Nonce> {
        self.negotiation.lock().nonce_sent
    }

    pub fn received_nonce(&self) -> Option<Nonce> {
        self.negotiation.lock().nonce_received
    }

    pub fn time_connected(&self) -> Option<DateTime<Utc>> {
        self.negotiation.lock().time_connected
    }

    /// The difference between the peer's claimed time and local time, in
    /// seconds.
    pub fn time_offset_secs(&self) -> i64 {
        self.negotiation.lock().time_offset_secs
    }

    pub(crate) fn set_negotiated(&self) {
        self.negotiated.store(true, Ordering::SeqCst);
    }

    /// Whether a complete, matching version/verack exchange has been run on
    /// this leg. No application message may be routed across it before this
    /// returns true.
    pub fn is_negotiated(&self) -> bool {
        self.negotiated.load(Ordering::SeqCst)
    }
}

impl fmt::Display for PeerLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} leg of node {:?} ({} to {})",
            self.role, self.node, self.local_addr, self.remote_addr
        )
    }
}
