//! Simulated payers.

use std::sync::atomic::{AtomicU64, Ordering};

use channelpay_common::{Address, Amount};
use channelpay_token::{InMemoryToken, TokenResult};

/// A funded account paying into channels.
pub struct SimulatedPayer {
    /// Payer name, used by scenarios.
    pub name: String,
    /// On-token address.
    pub address: Address,
    /// Payments accepted by the engine.
    payments: AtomicU64,
}

impl SimulatedPayer {
    /// Create a new payer. The address is derived from the name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            address: Address::from_label(&format!("payer:{}", name)),
            name,
            payments: AtomicU64::new(0),
        }
    }

    /// Mint `balance` and approve the escrow address to pull all of it.
    pub fn fund(&self, token: &InMemoryToken, escrow: Address, balance: Amount) -> TokenResult<()> {
        token.mint(self.address, balance)?;
        token.approve(self.address, escrow, balance)
    }

    /// Record an accepted payment.
    pub fn record_payment(&self) {
        self.payments.fetch_add(1, Ordering::Relaxed);
    }

    /// Get count of accepted payments.
    pub fn payment_count(&self) -> u64 {
        self.payments.load(Ordering::Relaxed)
    }
}

/// Payer factory.
pub struct PayerFactory;

impl PayerFactory {
    /// Create N simulated payers.
    pub fn create_payers(count: usize) -> Vec<SimulatedPayer> {
        let names = ["alice", "bob", "carol", "dave", "erin", "frank", "grace", "heidi"];

        (0..count)
            .map(|i| match names.get(i) {
                Some(name) => SimulatedPayer::new(*name),
                None => SimulatedPayer::new(format!("payer{}", i + 1)),
            })
            .collect()
    }
}
