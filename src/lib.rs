//! A deterministic man-in-the-middle bridge for connecting two p2p nodes
//! under test.
//!
//! Instead of letting the nodes talk over a direct socket, a
//! [`ConnectionBridge`](bridge::ConnectionBridge) interposes itself between
//! them: it creates an inbound and an outbound connection for each node and
//! negotiates every one of them by impersonating the node on the far side,
//! so each real node believes it is talking directly to the other. All
//! traffic then flows through the bridge's routers, which a test can
//! inspect, pause, sever and restart at will.

pub mod bridge;
pub mod protocol;
pub mod setup;
pub mod tools;

#[cfg(test)]
mod tests;
