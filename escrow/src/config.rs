//! Escrow engine configuration.

use channelpay_common::{Address, EscrowError, Result};

/// Escrow engine configuration.
///
/// `owner` and `escrow_address` are fixed for the lifetime of an engine.
#[derive(Debug, Clone)]
pub struct EscrowConfig {
    /// Privileged identity allowed to register channels.
    pub owner: Address,
    /// Custody address holding escrowed tokens; also the spender the payers
    /// approve.
    pub escrow_address: Address,
    /// Event subscription buffer size.
    pub event_buffer: usize,
    /// Log level.
    pub log_level: String,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            owner: Address::from_label("channelpay:owner"),
            escrow_address: Address::from_label("channelpay:escrow"),
            event_buffer: 1024,
            log_level: "info".to_string(),
        }
    }
}

impl EscrowConfig {
    /// Create a configuration with the given owner and default custody.
    pub fn with_owner(owner: Address) -> Self {
        Self {
            owner,
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(owner) = std::env::var("CHANNELPAY_OWNER") {
            config.owner = owner.parse().map_err(|e| {
                EscrowError::ConfigurationError(format!("CHANNELPAY_OWNER: {}", e))
            })?;
        }

        if let Ok(escrow) = std::env::var("CHANNELPAY_ESCROW_ADDRESS") {
            config.escrow_address = escrow.parse().map_err(|e| {
                EscrowError::ConfigurationError(format!("CHANNELPAY_ESCROW_ADDRESS: {}", e))
            })?;
        }

        if let Ok(buffer) = std::env::var("CHANNELPAY_EVENT_BUFFER") {
            if let Ok(buffer) = buffer.parse() {
                config.event_buffer = buffer;
            }
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.owner.is_zero() {
            return Err(EscrowError::ConfigurationError(
                "Owner cannot be the zero address".to_string(),
            ));
        }

        if self.escrow_address.is_zero() {
            return Err(EscrowError::ConfigurationError(
                "Escrow address cannot be the zero address".to_string(),
            ));
        }

        if self.owner == self.escrow_address {
            return Err(EscrowError::ConfigurationError(
                "Owner and escrow address must differ".to_string(),
            ));
        }

        if self.event_buffer == 0 {
            return Err(EscrowError::ConfigurationError(
                "Event buffer cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}
