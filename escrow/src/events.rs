//! Escrow events and the ordered event log observed by indexers.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use channelpay_common::{Address, Amount, ChannelId, ChannelKey};

/// An event emitted by a successful escrow operation.
///
/// Field order within each variant is part of the observable contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowEvent {
    /// Payment to an unregistered channel went into escrow.
    PaymentLocked {
        digest: ChannelKey,
        channel_id: ChannelId,
        payer: Address,
        amount: Amount,
    },
    /// Payment to a registered channel was forwarded to its wallet.
    PaymentSent {
        digest: ChannelKey,
        channel_id: ChannelId,
        payer: Address,
        wallet: Address,
        amount: Amount,
    },
    /// Channel was bound to a wallet.
    ChannelRegistered {
        digest: ChannelKey,
        channel_id: ChannelId,
        wallet: Address,
    },
    /// Escrow of a channel was released to its new wallet.
    FundsReleased {
        digest: ChannelKey,
        channel_id: ChannelId,
        wallet: Address,
        amount: Amount,
    },
}

impl EscrowEvent {
    /// Event name.
    pub fn name(&self) -> &'static str {
        match self {
            EscrowEvent::PaymentLocked { .. } => "PaymentLocked",
            EscrowEvent::PaymentSent { .. } => "PaymentSent",
            EscrowEvent::ChannelRegistered { .. } => "ChannelRegistered",
            EscrowEvent::FundsReleased { .. } => "FundsReleased",
        }
    }

    /// Digest of the channel the event belongs to.
    pub fn digest(&self) -> &ChannelKey {
        match self {
            EscrowEvent::PaymentLocked { digest, .. }
            | EscrowEvent::PaymentSent { digest, .. }
            | EscrowEvent::ChannelRegistered { digest, .. }
            | EscrowEvent::FundsReleased { digest, .. } => digest,
        }
    }

    /// Channel identifier the event belongs to.
    pub fn channel_id(&self) -> &ChannelId {
        match self {
            EscrowEvent::PaymentLocked { channel_id, .. }
            | EscrowEvent::PaymentSent { channel_id, .. }
            | EscrowEvent::ChannelRegistered { channel_id, .. }
            | EscrowEvent::FundsReleased { channel_id, .. } => channel_id,
        }
    }

    /// Amount of tokens moved, if the event carries one.
    pub fn amount(&self) -> Option<Amount> {
        match self {
            EscrowEvent::PaymentLocked { amount, .. }
            | EscrowEvent::PaymentSent { amount, .. }
            | EscrowEvent::FundsReleased { amount, .. } => Some(*amount),
            EscrowEvent::ChannelRegistered { .. } => None,
        }
    }
}

/// An event as recorded in the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the log, starting at zero.
    pub sequence: u64,
    /// Unique record ID (time-ordered).
    pub id: Uuid,
    /// When the event was emitted.
    pub emitted_at: DateTime<Utc>,
    /// The event.
    pub event: EscrowEvent,
}

/// Append-only event log with live subscription.
pub struct EventLog {
    records: RwLock<Vec<EventRecord>>,
    sender: broadcast::Sender<EventRecord>,
}

impl EventLog {
    /// Create a log whose subscribers may lag up to `buffer` events.
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self {
            records: RwLock::new(Vec::new()),
            sender,
        }
    }

    /// Append a single event.
    pub fn emit(&self, event: EscrowEvent) -> EventRecord {
        let mut records = self.emit_all(vec![event]);
        records.remove(0)
    }

    /// Append several events of one operation as a contiguous run.
    pub fn emit_all(&self, events: Vec<EscrowEvent>) -> Vec<EventRecord> {
        let mut records = self.records.write();
        let mut emitted = Vec::with_capacity(events.len());

        for event in events {
            let record = EventRecord {
                sequence: records.len() as u64,
                id: Uuid::now_v7(),
                emitted_at: Utc::now(),
                event,
            };
            records.push(record.clone());
            // No subscribers is not an error.
            let _ = self.sender.send(record.clone());
            emitted.push(record);
        }

        emitted
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }

    /// All records in emission order.
    pub fn all(&self) -> Vec<EventRecord> {
        self.records.read().clone()
    }

    /// Records with `sequence >= from`.
    pub fn since(&self, from: u64) -> Vec<EventRecord> {
        let records = self.records.read();
        let start = usize::try_from(from).unwrap_or(usize::MAX).min(records.len());
        records[start..].to_vec()
    }

    /// Records of one channel in emission order.
    pub fn for_channel(&self, digest: &ChannelKey) -> Vec<EventRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.event.digest() == digest)
            .cloned()
            .collect()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Check if nothing was emitted yet.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
