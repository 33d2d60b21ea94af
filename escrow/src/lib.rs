//! ChannelPay Escrow Engine
//!
//! Custodial escrow keyed by channel identifier. Payments to a channel with no
//! registered wallet are held in custody; once the owner binds a wallet, the
//! held funds are released and later payments forward directly.

pub mod engine;
pub mod channel;
pub mod registry;
pub mod access;
pub mod events;
pub mod config;
pub mod metrics;

pub use engine::{EscrowEngine, PayOutcome, Registration, SolvencyReport};
pub use channel::{Channel, ChannelState};
pub use events::{EscrowEvent, EventLog, EventRecord};
pub use config::EscrowConfig;
pub use metrics::{Metrics, MetricsSnapshot, SharedMetrics};
