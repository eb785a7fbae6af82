//! Wire protocol types spoken by the bridged nodes.

pub mod message;
pub mod payload;
