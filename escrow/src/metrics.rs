//! Metrics collection for escrow monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use channelpay_common::Amount;

#[derive(Debug, Default, Clone, Copy)]
struct Volumes {
    locked: Amount,
    forwarded: Amount,
    released: Amount,
}

/// Escrow metrics.
pub struct Metrics {
    /// Payments that went into escrow.
    pub payments_locked: AtomicU64,
    /// Payments forwarded to a registered wallet.
    pub payments_sent: AtomicU64,
    /// Channels registered.
    pub channels_registered: AtomicU64,
    /// Registrations that released a nonzero escrow.
    pub releases: AtomicU64,
    /// Operations rejected by validation or access control.
    pub operations_rejected: AtomicU64,
    /// Operations aborted by the token collaborator.
    pub transfers_failed: AtomicU64,
    /// Token volumes (u128, so not atomics).
    volumes: Mutex<Volumes>,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            payments_locked: AtomicU64::new(0),
            payments_sent: AtomicU64::new(0),
            channels_registered: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            operations_rejected: AtomicU64::new(0),
            transfers_failed: AtomicU64::new(0),
            volumes: Mutex::new(Volumes::default()),
        }
    }

    /// Record a payment placed in escrow.
    pub fn payment_locked(&self, amount: Amount) {
        self.payments_locked.fetch_add(1, Ordering::Relaxed);
        let mut volumes = self.volumes.lock();
        volumes.locked = volumes.locked.saturating_add(amount);
    }

    /// Record a payment forwarded to a wallet.
    pub fn payment_sent(&self, amount: Amount) {
        self.payments_sent.fetch_add(1, Ordering::Relaxed);
        let mut volumes = self.volumes.lock();
        volumes.forwarded = volumes.forwarded.saturating_add(amount);
    }

    /// Record a registration and the escrow it released.
    pub fn channel_registered(&self, released: Amount) {
        self.channels_registered.fetch_add(1, Ordering::Relaxed);
        if released > 0 {
            self.releases.fetch_add(1, Ordering::Relaxed);
            let mut volumes = self.volumes.lock();
            volumes.released = volumes.released.saturating_add(released);
        }
    }

    /// Record a rejected operation.
    pub fn operation_rejected(&self) {
        self.operations_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed token transfer.
    pub fn transfer_failed(&self) {
        self.transfers_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let volumes = *self.volumes.lock();
        MetricsSnapshot {
            payments_locked: self.payments_locked.load(Ordering::Relaxed),
            payments_sent: self.payments_sent.load(Ordering::Relaxed),
            channels_registered: self.channels_registered.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            operations_rejected: self.operations_rejected.load(Ordering::Relaxed),
            transfers_failed: self.transfers_failed.load(Ordering::Relaxed),
            volume_locked: volumes.locked,
            volume_forwarded: volumes.forwarded,
            volume_released: volumes.released,
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP channelpay_payments_locked Total payments placed in escrow
# TYPE channelpay_payments_locked counter
channelpay_payments_locked {}

# HELP channelpay_payments_sent Total payments forwarded to registered wallets
# TYPE channelpay_payments_sent counter
channelpay_payments_sent {}

# HELP channelpay_channels_registered Total channels registered
# TYPE channelpay_channels_registered counter
channelpay_channels_registered {}

# HELP channelpay_releases Total registrations that released escrow
# TYPE channelpay_releases counter
channelpay_releases {}

# HELP channelpay_operations_rejected Total operations rejected before any transfer
# TYPE channelpay_operations_rejected counter
channelpay_operations_rejected {}

# HELP channelpay_transfers_failed Total operations aborted by the token
# TYPE channelpay_transfers_failed counter
channelpay_transfers_failed {}

# HELP channelpay_volume_locked Token base units placed in escrow
# TYPE channelpay_volume_locked counter
channelpay_volume_locked {}

# HELP channelpay_volume_forwarded Token base units forwarded directly
# TYPE channelpay_volume_forwarded counter
channelpay_volume_forwarded {}

# HELP channelpay_volume_released Token base units released from escrow
# TYPE channelpay_volume_released counter
channelpay_volume_released {}
"#,
            snapshot.payments_locked,
            snapshot.payments_sent,
            snapshot.channels_registered,
            snapshot.releases,
            snapshot.operations_rejected,
            snapshot.transfers_failed,
            snapshot.volume_locked,
            snapshot.volume_forwarded,
            snapshot.volume_released,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub payments_locked: u64,
    pub payments_sent: u64,
    pub channels_registered: u64,
    pub releases: u64,
    pub operations_rejected: u64,
    pub transfers_failed: u64,
    pub volume_locked: Amount,
    pub volume_forwarded: Amount,
    pub volume_released: Amount,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;
