//! Fungible token collaborator trait.

use std::sync::Arc;

use async_trait::async_trait;
use channelpay_common::{Address, Amount};

use crate::error::TokenResult;

/// ERC-20 style fungible token.
///
/// Implementations must be all-or-nothing: a transfer that returns an error
/// has moved nothing and left allowances untouched.
#[async_trait]
pub trait FungibleToken: Send + Sync {
    /// Address identifying the token contract.
    fn address(&self) -> Address;

    /// Ticker symbol.
    fn symbol(&self) -> &str;

    /// Number of decimals of one whole token.
    fn decimals(&self) -> u32;

    /// Move `amount` from `from` to `to` using the allowance `from` granted to
    /// `spender`.
    async fn transfer_from(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> TokenResult<()>;

    /// Move `amount` out of `from`'s own balance.
    async fn transfer(&self, from: Address, to: Address, amount: Amount) -> TokenResult<()>;

    /// Current balance of `owner`.
    async fn balance_of(&self, owner: Address) -> Amount;

    /// Remaining allowance `owner` granted to `spender`.
    async fn allowance(&self, owner: Address, spender: Address) -> Amount;
}

/// Shared handle to a token collaborator.
pub type SharedToken = Arc<dyn FungibleToken>;
