//! The contract a node must satisfy to be wired into a bridge.

pub mod config;
pub mod node;
