//! ChannelPay Common Types
//!
//! This crate contains shared types used across ChannelPay, including
//! addresses, channel identifiers and their storage keys, token amounts and
//! the escrow error taxonomy.

pub mod identifiers;
pub mod monetary;
pub mod error;

pub use identifiers::*;
pub use monetary::*;
pub use error::*;
