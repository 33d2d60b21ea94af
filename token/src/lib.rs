//! ChannelPay Token Collaborator
//!
//! The escrow engine never keeps token balances of its own. Every movement of
//! funds goes through a [`FungibleToken`], an ERC-20 style interface with
//! `transfer_from` (pull from a payer that approved the engine), `transfer`
//! (push from custody) and `balance_of`.
//!
//! [`InMemoryToken`] is a complete in-process implementation with minting,
//! approvals and fault injection, used by tests and the simulator.
//!
//! # Example
//!
//! ```rust,ignore
//! use channelpay_common::Address;
//! use channelpay_token::{FungibleToken, InMemoryToken};
//!
//! let token = InMemoryToken::new("Test USDC", "tUSDC", 18);
//! token.mint(alice, 1_000);
//! token.approve(alice, escrow, 100);
//! token.transfer_from(escrow, alice, escrow, 100).await?;
//! ```

pub mod token;
pub mod memory;
pub mod error;

pub use token::{FungibleToken, SharedToken};
pub use memory::InMemoryToken;
pub use error::{TokenError, TokenResult};
