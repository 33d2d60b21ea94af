//! Access control for privileged operations.

use channelpay_common::{Address, EscrowError, Result};
use tracing::warn;

/// Single privileged identity fixed at construction.
///
/// There is no ownership transfer: the identity that deploys the engine is the
/// only one that can ever register channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessControl {
    owner: Address,
}

impl AccessControl {
    /// Create access control for `owner`.
    pub fn new(owner: Address) -> Self {
        Self { owner }
    }

    /// The privileged identity.
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Check if `caller` is the privileged identity.
    pub fn is_owner(&self, caller: &Address) -> bool {
        !caller.is_zero() && *caller == self.owner
    }

    /// Fail with `Unauthorized` unless `caller` is the privileged identity.
    pub fn ensure_owner(&self, caller: Address) -> Result<()> {
        if self.is_owner(&caller) {
            Ok(())
        } else {
            warn!(caller = %caller, "Rejected privileged call");
            Err(EscrowError::Unauthorized { caller })
        }
    }
}
