//! A lightweight in-process node implementation, used as the ends of a
//! bridge in tests.
//!
//! A synthetic node listens for inbound connections, dials out when asked to
//! (which makes it usable as a [`BridgeNode`]), performs the version/verack
//! exchange on every new connection with its own configured identity, and
//! queues every post-handshake message for inspection.

use std::{
    io::{self, Error, ErrorKind},
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use bytes::BytesMut;
use futures_util::{sink::SinkExt, TryStreamExt};
use pea2pea::{
    protocols::{Handshake, Reading, Writing},
    Config as NetworkConfig, Connection, Node, Pea2Pea,
};
use tokio::{
    sync::{
        mpsc::{self, Receiver, Sender},
        Mutex,
    },
    time::timeout,
};
use tokio_util::codec::{Decoder, Encoder, Framed, LengthDelimitedCodec};
use tracing::*;

use crate::{
    bridge::handshake::synthesize_version,
    protocol::{
        message::{
            constants::{HEADER_LEN, MAX_MESSAGE_LEN},
            Message, MessageHeader,
        },
        payload::codec::Codec,
    },
    setup::{config::NodeConfig, node::BridgeNode},
};

/// Enables tracing for all [`SyntheticNode`] instances (usually scoped by test).
pub fn enable_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}

/// A builder for [`SyntheticNode`].
#[derive(Debug, Clone)]
pub struct SyntheticNodeBuilder {
    network_config: Option<NetworkConfig>,
    node_config: NodeConfig,
    start_height: u32,
}

impl Default for SyntheticNodeBuilder {
    fn default() -> Self {
        Self {
            network_config: Some(NetworkConfig {
                // Set localhost as the default IP.
                listener_ip: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
                ..Default::default()
            }),
            node_config: NodeConfig::default(),
            start_height: 0,
        }
    }
}

impl SyntheticNodeBuilder {
    /// Creates a [`SyntheticNode`] with the current configuration.
    pub async fn build(&self) -> io::Result<SyntheticNode> {
        // Create the pea2pea node from the config.
        let node = Node::new(self.network_config.clone()).await?;

        // Inbound channel size of 100 messages.
        let (tx, rx) = mpsc::channel(100);
        let inner_node = InnerNode::new(node, tx, self.node_config.clone(), self.start_height).await;

        // Enable the read and write protocols.
        inner_node.enable_reading().await;
        inner_node.enable_writing().await;

        Ok(SyntheticNode {
            inner_node,
            inbound_rx: Mutex::new(rx),
        })
    }

    /// Sets the public identity the node advertises in its handshakes.
    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.node_config = config;
        self
    }

    /// Sets the chain tip height the node advertises.
    pub fn with_start_height(mut self, start_height: u32) -> Self {
        self.start_height = start_height;
        self
    }
}

/// Convenient abstraction over a `pea2pea` node.
pub struct SyntheticNode {
    inner_node: InnerNode,
    inbound_rx: Mutex<Receiver<(SocketAddr, Message)>>,
}

impl SyntheticNode {
    pub fn builder() -> SyntheticNodeBuilder {
        SyntheticNodeBuilder::default()
    }

    /// Returns the listening address of the node.
    pub fn listening_addr(&self) -> SocketAddr {
        self.inner_node.node().listening_addr().unwrap()
    }

    /// Connects to the target address, handshake included.
    pub async fn connect(&self, target: SocketAddr) -> io::Result<()> {
        self.inner_node.node().connect(target).await?;

        Ok(())
    }

    /// Indicates if the `addr` is registered as a connected peer.
    pub fn is_connected(&self, addr: SocketAddr) -> bool {
        self.inner_node.node().is_connected(addr)
    }

    /// Returns the number of connected peers.
    pub fn num_connected(&self) -> usize {
        self.inner_node.node().num_connected()
    }

    /// Returns the list of active connections for this node.
    pub fn connected_peers(&self) -> Vec<SocketAddr> {
        self.inner_node.node().connected_addrs()
    }

    /// Waits until the node has at least one connection, and returns its
    /// address.
    pub async fn wait_for_connection(&self) -> SocketAddr {
        const SLEEP: Duration = Duration::from_millis(10);
        loop {
            // Mutating the collection is alright since this is a copy of the
            // connections and not the actual list.
            if let Some(addr) = self.connected_peers().pop() {
                return addr;
            }

            tokio::time::sleep(SLEEP).await;
        }
    }

    /// Sends a direct message to the target address.
    pub fn send_direct_message(&self, target: SocketAddr, message: Message) -> io::Result<()> {
        self.inner_node.send_direct_message(target, message)?;

        Ok(())
    }

    /// Reads a message from the inbound (internal) queue of the node.
    pub async fn recv_message(&self) -> (SocketAddr, Message) {
        match self.inbound_rx.lock().await.recv().await {
            Some(message) => message,
            None => panic!("all senders dropped!"),
        }
    }

    /// Attempts to read a message from the inbound (internal) queue of the
    /// node before the timeout duration has elapsed.
    pub async fn recv_message_timeout(
        &self,
        duration: Duration,
    ) -> io::Result<(SocketAddr, Message)> {
        match timeout(duration, self.recv_message()).await {
            Ok(message) => Ok(message),
            Err(_e) => Err(Error::new(
                ErrorKind::TimedOut,
                format!(
                    "could not read message after {0:.3}s",
                    duration.as_secs_f64()
                ),
            )),
        }
    }

    /// Forcibly severs the connection with `addr`, if there is one.
    pub async fn break_connection(&self, addr: SocketAddr) -> bool {
        self.inner_node.node().disconnect(addr).await
    }

    /// Gracefully shuts down the node.
    pub async fn shut_down(&self) {
        self.inner_node.node().shut_down().await
    }
}

#[async_trait::async_trait]
impl BridgeNode for SyntheticNode {
    fn config(&self) -> &NodeConfig {
        &self.inner_node.config
    }

    fn addr(&self) -> SocketAddr {
        self.listening_addr()
    }

    fn block_height(&self) -> u32 {
        self.inner_node.start_height.load(Ordering::SeqCst)
    }

    async fn connect_to(&self, addr: SocketAddr) -> io::Result<()> {
        // Only trigger the dial. The handshake completes in the background
        // once the bridge gets around to negotiating the accepted socket.
        let node = self.inner_node.node().clone();
        tokio::spawn(async move {
            if let Err(err) = node.connect(addr).await {
                warn!("synthetic node failed to dial {addr}: {err}");
            }
        });

        Ok(())
    }
}

#[derive(Clone)]
struct InnerNode {
    node: Node,
    config: NodeConfig,
    start_height: Arc<AtomicU32>,
    inbound_tx: Sender<(SocketAddr, Message)>,
}

impl InnerNode {
    async fn new(
        node: Node,
        tx: Sender<(SocketAddr, Message)>,
        config: NodeConfig,
        start_height: u32,
    ) -> Self {
        let node = Self {
            node,
            config,
            start_height: Arc::new(AtomicU32::new(start_height)),
            inbound_tx: tx,
        };

        node.enable_handshake().await;

        node
    }
}

impl Pea2Pea for InnerNode {
    fn node(&self) -> &Node {
        &self.node
    }
}

struct MessageCodec {
    codec: LengthDelimitedCodec,
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self {
            codec: LengthDelimitedCodec::builder()
                .length_adjustment(HEADER_LEN as isize)
                .length_field_offset(16)
                .little_endian()
                .num_skip(0)
                .max_frame_length(MAX_MESSAGE_LEN)
                .new_codec(),
        }
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut bytes = if let Some(bytes) = self.codec.decode(src)? {
            bytes
        } else {
            return Ok(None);
        };

        let header = MessageHeader::decode(&mut bytes)?;
        let message = Message::decode(header.command, &mut bytes)?;

        Ok(Some(message))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = io::Error;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        message.encode(dst)
    }
}

#[async_trait::async_trait]
impl Reading for InnerNode {
    type Message = Message;
    type Codec = MessageCodec;

    fn codec(&self, _addr: SocketAddr) -> Self::Codec {
        Default::default()
    }

    async fn process_message(&self, source: SocketAddr, message: Self::Message) -> io::Result<()> {
        let span = self.node().span().clone();

        debug!(parent: span, "queuing {message} from {source}");
        self.inbound_tx
            .send((source, message))
            .await
            .expect("receiver dropped!");

        Ok(())
    }
}

impl Writing for InnerNode {
    type Message = Message;
    type Codec = MessageCodec;

    fn codec(&self, _addr: SocketAddr) -> Self::Codec {
        Default::default()
    }
}

#[async_trait::async_trait]
impl Handshake for InnerNode {
    async fn perform_handshake(&self, mut conn: Connection) -> io::Result<Connection> {
        // Both parties of this protocol send their version eagerly, so the
        // exchange is symmetric regardless of who initiated the connection.
        let own_version =
            synthesize_version(&self.config, self.start_height.load(Ordering::SeqCst));
        let own_nonce = own_version.nonce;

        let mut framed_stream = Framed::new(self.borrow_stream(&mut conn), MessageCodec::default());
        framed_stream.send(Message::Version(own_version)).await?;

        let peer_nonce = match framed_stream.try_next().await? {
            Some(Message::Version(version)) => version.nonce,
            Some(other) => {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    format!("expected a version, got {other}"),
                ))
            }
            None => return Err(ErrorKind::UnexpectedEof.into()),
        };

        framed_stream.send(Message::Verack(peer_nonce)).await?;

        match framed_stream.try_next().await? {
            Some(Message::Verack(nonce)) if nonce == own_nonce => {}
            Some(other) => {
                return Err(Error::new(
                    ErrorKind::InvalidData,
                    format!("expected a verack echoing our nonce, got {other}"),
                ))
            }
            None => return Err(ErrorKind::UnexpectedEof.into()),
        }

        Ok(conn)
    }
}
