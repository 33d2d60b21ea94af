//! Token collaborator error types.

use channelpay_common::{Address, Amount, EscrowError};
use thiserror::Error;

/// Errors a token collaborator can raise on transfer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Sender balance is below the transfer amount.
    #[error("Insufficient balance for {account}: required {required}, available {available}")]
    InsufficientBalance {
        account: Address,
        required: Amount,
        available: Amount,
    },

    /// Spender allowance is below the transfer amount.
    #[error("Insufficient allowance from {owner} to {spender}: required {required}, approved {approved}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        required: Amount,
        approved: Amount,
    },

    /// Transfer from or to the zero address.
    #[error("Transfer involving the zero address")]
    ZeroAddress,

    /// Account is frozen by the token.
    #[error("Account frozen: {0}")]
    AccountFrozen(Address),

    /// Recipient balance would overflow.
    #[error("Balance overflow for {0}")]
    BalanceOverflow(Address),
}

/// Result type for token operations.
pub type TokenResult<T> = Result<T, TokenError>;

impl From<TokenError> for EscrowError {
    fn from(err: TokenError) -> Self {
        EscrowError::TransferFailed(err.to_string())
    }
}
