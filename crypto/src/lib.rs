//! ChannelPay Cryptographic Primitives
//!
//! Provides the digest used to derive fixed-width channel storage keys.

pub mod hash;

pub use hash::{keccak256, keccak256_hex};
