//! Error types for ChannelPay escrow operations.

use crate::{Address, ChannelId};
use thiserror::Error;

/// Main error type for escrow operations.
///
/// Every variant is fail-closed: the operation that produced it left channel
/// state, balances and the event log exactly as they were.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscrowError {
    /// Payment of zero tokens.
    #[error("Invalid amount")]
    InvalidAmount,

    /// Registration to the zero address or to the custody address.
    #[error("Invalid wallet")]
    InvalidWallet,

    /// Payment from the zero address or from the custody address.
    #[error("Invalid payer: {payer}")]
    InvalidPayer { payer: Address },

    /// Empty channel identifier.
    #[error("Invalid channel id")]
    InvalidChannelId,

    /// Channel already bound to a wallet.
    #[error("Already registered: {channel_id}")]
    AlreadyRegistered { channel_id: ChannelId },

    /// Caller is not the privileged identity.
    #[error("Unauthorized: {caller}")]
    Unauthorized { caller: Address },

    /// Escrowed amount would exceed the representable range.
    #[error("Locked amount overflow for channel {channel_id}")]
    AmountOverflow { channel_id: ChannelId },

    /// Token collaborator rejected the transfer.
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl EscrowError {
    /// Get error code for callers and logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            EscrowError::InvalidAmount => "INVALID_AMOUNT",
            EscrowError::InvalidWallet => "INVALID_WALLET",
            EscrowError::InvalidPayer { .. } => "INVALID_PAYER",
            EscrowError::InvalidChannelId => "INVALID_CHANNEL_ID",
            EscrowError::AlreadyRegistered { .. } => "ALREADY_REGISTERED",
            EscrowError::Unauthorized { .. } => "UNAUTHORIZED",
            EscrowError::AmountOverflow { .. } => "AMOUNT_OVERFLOW",
            EscrowError::TransferFailed(_) => "TRANSFER_FAILED",
            EscrowError::ConfigurationError(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Check if this error was raised by the token collaborator rather than by
    /// the engine's own validation.
    pub fn is_transfer_failure(&self) -> bool {
        matches!(self, EscrowError::TransferFailed(_))
    }
}

/// Result type alias for escrow operations.
pub type Result<T> = std::result::Result<T, EscrowError>;
