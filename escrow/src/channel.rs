//! Channel records.

use channelpay_common::{Address, Amount};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    /// No wallet bound; payments accumulate in escrow.
    Unregistered { locked: Amount },
    /// Wallet bound; payments forward immediately. Terminal.
    Registered { wallet: Address },
}

/// A channel record as stored by the registry.
///
/// Unknown channels read as `Channel::default()`: zero wallet, unregistered,
/// nothing locked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Registered payout destination, zero while unregistered.
    pub wallet: Address,
    /// Whether a destination has been bound.
    pub registered: bool,
    /// Tokens held in escrow awaiting release.
    pub locked: Amount,
}

impl Channel {
    /// Get the lifecycle state.
    pub fn state(&self) -> ChannelState {
        if self.registered {
            ChannelState::Registered {
                wallet: self.wallet,
            }
        } else {
            ChannelState::Unregistered {
                locked: self.locked,
            }
        }
    }

    /// Check if the channel is registered.
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Check if the record is still the zero record.
    pub fn is_pristine(&self) -> bool {
        *self == Channel::default()
    }

    /// Check the record invariants.
    pub fn is_consistent(&self) -> bool {
        if self.registered {
            !self.wallet.is_zero() && self.locked == 0
        } else {
            self.wallet.is_zero()
        }
    }
}
