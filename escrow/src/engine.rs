//! Core escrow engine implementation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use channelpay_common::{Address, Amount, ChannelId, ChannelKey, EscrowError, Result};
use channelpay_token::SharedToken;

use crate::access::AccessControl;
use crate::channel::Channel;
use crate::config::EscrowConfig;
use crate::events::{EscrowEvent, EventLog, EventRecord};
use crate::metrics::{Metrics, SharedMetrics};
use crate::registry::ChannelRegistry;

/// Result of a successful payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayOutcome {
    /// Channel unregistered: amount added to escrow.
    Locked {
        /// Escrow of the channel after this payment.
        total_locked: Amount,
    },
    /// Channel registered: amount forwarded to its wallet.
    Forwarded { wallet: Address },
}

/// Result of a successful registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Wallet the channel is now bound to.
    pub wallet: Address,
    /// Escrow released to the wallet (zero if nothing was locked).
    pub released: Amount,
}

/// Comparison of escrow bookkeeping with the custody balance reported by the
/// token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolvencyReport {
    /// Sum of `locked` over all channels.
    pub total_locked: Amount,
    /// Balance of the escrow address according to the token.
    pub custody_balance: Amount,
}

impl SolvencyReport {
    /// Custody covers every escrowed amount.
    pub fn is_solvent(&self) -> bool {
        self.custody_balance >= self.total_locked
    }

    /// Tokens held in custody that no channel accounts for.
    pub fn surplus(&self) -> Amount {
        self.custody_balance.saturating_sub(self.total_locked)
    }
}

/// The escrow engine: channel registry, deposits, registrations and releases.
///
/// Every mutating operation locks its channel, validates, performs exactly one
/// token call and only then commits the record and emits events. A failed
/// token call therefore leaves no trace.
pub struct EscrowEngine {
    /// Configuration.
    config: EscrowConfig,
    /// Registration guard.
    access: AccessControl,
    /// Token collaborator, fixed for the engine's lifetime.
    token: SharedToken,
    /// Channel records.
    registry: ChannelRegistry,
    /// Emitted events.
    events: EventLog,
    /// Operation metrics.
    metrics: SharedMetrics,
}

impl EscrowEngine {
    /// Create a new escrow engine bound to `token`.
    pub fn new(config: EscrowConfig, token: SharedToken) -> Result<Self> {
        config.validate()?;

        info!(
            owner = %config.owner,
            escrow = %config.escrow_address,
            token = %token.address(),
            symbol = token.symbol(),
            "Escrow engine created"
        );

        Ok(Self {
            access: AccessControl::new(config.owner),
            events: EventLog::new(config.event_buffer),
            registry: ChannelRegistry::new(),
            metrics: Arc::new(Metrics::new()),
            token,
            config,
        })
    }

    /// Pay `amount` to a channel on behalf of `payer`.
    ///
    /// The payer must have approved the escrow address for at least `amount`.
    pub async fn pay(
        &self,
        payer: Address,
        channel_id: impl Into<ChannelId>,
        amount: Amount,
    ) -> Result<PayOutcome> {
        let channel_id = channel_id.into();
        let result = self.execute_pay(payer, &channel_id, amount).await;
        self.record_failure(&result);
        result
    }

    /// Bind a channel to `wallet` and release its escrow. Owner only.
    pub async fn register_channel(
        &self,
        caller: Address,
        channel_id: impl Into<ChannelId>,
        wallet: Address,
    ) -> Result<Registration> {
        let channel_id = channel_id.into();
        let result = self.execute_register(caller, &channel_id, wallet).await;
        self.record_failure(&result);
        result
    }

    /// Read a channel. Unknown channels read as the zero record.
    pub async fn get_channel(&self, channel_id: impl Into<ChannelId>) -> Channel {
        let channel_id = channel_id.into();
        self.registry.snapshot(&channel_id.key()).await
    }

    /// Read a channel by digest.
    pub async fn get_channel_by_key(&self, key: &ChannelKey) -> Channel {
        self.registry.snapshot(key).await
    }

    /// Storage key of a channel identifier.
    pub fn channel_key(&self, channel_id: &str) -> ChannelKey {
        ChannelKey::derive(channel_id)
    }

    /// The privileged identity.
    pub fn owner(&self) -> Address {
        self.access.owner()
    }

    /// Custody address of escrowed tokens.
    pub fn escrow_address(&self) -> Address {
        self.config.escrow_address
    }

    /// The token collaborator.
    pub fn token(&self) -> &SharedToken {
        &self.token
    }

    /// Event log.
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.events.subscribe()
    }

    /// Operation metrics.
    pub fn metrics(&self) -> SharedMetrics {
        self.metrics.clone()
    }

    /// Sum of escrowed amounts across all channels.
    pub async fn total_locked(&self) -> Amount {
        self.registry.total_locked().await
    }

    /// Number of channels that are registered or hold escrow.
    pub async fn channel_count(&self) -> usize {
        self.registry
            .snapshot_all()
            .await
            .iter()
            .filter(|(_, channel)| !channel.is_pristine())
            .count()
    }

    /// Number of registered channels.
    pub async fn registered_count(&self) -> usize {
        self.registry
            .snapshot_all()
            .await
            .iter()
            .filter(|(_, channel)| channel.registered)
            .count()
    }

    /// Check that the custody balance covers all escrow.
    ///
    /// Every existing channel is locked while the custody balance is read, so
    /// no release can run between the two reads. Pays into channels created
    /// meanwhile can only add to custody, which shows up as surplus.
    pub async fn verify_solvency(&self) -> SolvencyReport {
        let guards = self.registry.lock_all().await;
        let total_locked = guards
            .iter()
            .map(|(_, channel)| channel.locked)
            .fold(0, Amount::saturating_add);
        let custody_balance = self.token.balance_of(self.config.escrow_address).await;
        drop(guards);

        let report = SolvencyReport {
            total_locked,
            custody_balance,
        };

        if !report.is_solvent() {
            warn!(total_locked, custody_balance, "Escrow custody below locked total");
        }

        report
    }

    // --- Private methods ---

    #[instrument(skip(self), fields(channel = %channel_id))]
    async fn execute_pay(
        &self,
        payer: Address,
        channel_id: &ChannelId,
        amount: Amount,
    ) -> Result<PayOutcome> {
        if amount == 0 {
            return Err(EscrowError::InvalidAmount);
        }
        let escrow = self.config.escrow_address;
        // A pull from custody into custody moves nothing.
        if payer.is_zero() || payer == escrow {
            return Err(EscrowError::InvalidPayer { payer });
        }
        if !channel_id.is_valid() {
            return Err(EscrowError::InvalidChannelId);
        }

        let digest = channel_id.key();
        let mut channel = self.registry.acquire(digest).await;

        if channel.registered {
            let wallet = channel.wallet;
            self.token
                .transfer_from(escrow, payer, wallet, amount)
                .await?;

            self.events.emit(EscrowEvent::PaymentSent {
                digest,
                channel_id: channel_id.clone(),
                payer,
                wallet,
                amount,
            });
            self.metrics.payment_sent(amount);

            info!(digest = %digest, payer = %payer, wallet = %wallet, amount, "Payment sent");
            return Ok(PayOutcome::Forwarded { wallet });
        }

        let total_locked =
            channel
                .locked
                .checked_add(amount)
                .ok_or_else(|| EscrowError::AmountOverflow {
                    channel_id: channel_id.clone(),
                })?;

        self.token
            .transfer_from(escrow, payer, escrow, amount)
            .await?;
        channel.locked = total_locked;

        self.events.emit(EscrowEvent::PaymentLocked {
            digest,
            channel_id: channel_id.clone(),
            payer,
            amount,
        });
        self.metrics.payment_locked(amount);

        info!(digest = %digest, payer = %payer, amount, total_locked, "Payment locked");
        Ok(PayOutcome::Locked { total_locked })
    }

    #[instrument(skip(self), fields(channel = %channel_id))]
    async fn execute_register(
        &self,
        caller: Address,
        channel_id: &ChannelId,
        wallet: Address,
    ) -> Result<Registration> {
        self.access.ensure_owner(caller)?;

        let escrow = self.config.escrow_address;
        if wallet.is_zero() || wallet == escrow {
            return Err(EscrowError::InvalidWallet);
        }
        if !channel_id.is_valid() {
            return Err(EscrowError::InvalidChannelId);
        }

        let digest = channel_id.key();
        let mut channel = self.registry.acquire(digest).await;

        if channel.registered {
            return Err(EscrowError::AlreadyRegistered {
                channel_id: channel_id.clone(),
            });
        }

        let released = channel.locked;
        if released > 0 {
            self.token.transfer(escrow, wallet, released).await?;
        }

        *channel = Channel {
            wallet,
            registered: true,
            locked: 0,
        };

        let mut events = vec![EscrowEvent::ChannelRegistered {
            digest,
            channel_id: channel_id.clone(),
            wallet,
        }];
        if released > 0 {
            events.push(EscrowEvent::FundsReleased {
                digest,
                channel_id: channel_id.clone(),
                wallet,
                amount: released,
            });
        }
        self.events.emit_all(events);
        self.metrics.channel_registered(released);

        info!(digest = %digest, wallet = %wallet, released, "Channel registered");
        Ok(Registration { wallet, released })
    }

    fn record_failure<T>(&self, result: &Result<T>) {
        if let Err(e) = result {
            if e.is_transfer_failure() {
                self.metrics.transfer_failed();
            } else {
                self.metrics.operation_rejected();
            }
            warn!(code = e.error_code(), error = %e, "Escrow operation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use channelpay_common::{parse_units, TOKEN_DECIMALS};
    use channelpay_token::{FungibleToken, InMemoryToken};
    use proptest::prelude::*;

    fn units(value: &str) -> Amount {
        parse_units(value, TOKEN_DECIMALS).unwrap()
    }

    struct Fixture {
        engine: EscrowEngine,
        token: Arc<InMemoryToken>,
        owner: Address,
        user1: Address,
        user2: Address,
    }

    impl Fixture {
        fn new() -> Self {
            let token = Arc::new(InMemoryToken::new("Test USDC", "tUSDC", TOKEN_DECIMALS));
            let user1 = Address::from_label("user1");
            let user2 = Address::from_label("user2");
            token.mint(user1, units("1000")).unwrap();
            token.mint(user2, units("1000")).unwrap();

            let config = EscrowConfig::default();
            let owner = config.owner;
            let engine = EscrowEngine::new(config, token.clone()).unwrap();

            Self {
                engine,
                token,
                owner,
                user1,
                user2,
            }
        }

        fn approve(&self, payer: Address, amount: Amount) {
            self.token
                .approve(payer, self.engine.escrow_address(), amount)
                .unwrap();
        }

        fn events(&self) -> Vec<EscrowEvent> {
            self.engine.events().all().into_iter().map(|r| r.event).collect()
        }
    }

    #[tokio::test]
    async fn test_pay_locks_funds_for_unregistered_channel() {
        let f = Fixture::new();
        f.approve(f.user1, units("100"));

        let outcome = f.engine.pay(f.user1, "channel1", units("100")).await.unwrap();
        assert_eq!(
            outcome,
            PayOutcome::Locked {
                total_locked: units("100")
            }
        );

        assert_eq!(
            f.events(),
            vec![EscrowEvent::PaymentLocked {
                digest: ChannelKey::derive("channel1"),
                channel_id: ChannelId::new("channel1"),
                payer: f.user1,
                amount: units("100"),
            }]
        );

        let ch = f.engine.get_channel("channel1").await;
        assert_eq!(ch.locked, units("100"));
        assert!(!ch.registered);
        assert!(ch.wallet.is_zero());
        assert_eq!(
            f.token.balance_of(f.engine.escrow_address()).await,
            units("100")
        );
    }

    #[tokio::test]
    async fn test_pay_sends_funds_for_registered_channel() {
        let f = Fixture::new();
        f.engine
            .register_channel(f.owner, "channel2", f.user2)
            .await
            .unwrap();
        f.approve(f.user1, units("50"));

        let before = f.token.balance_of(f.user2).await;
        let outcome = f.engine.pay(f.user1, "channel2", units("50")).await.unwrap();
        let after = f.token.balance_of(f.user2).await;

        assert_eq!(outcome, PayOutcome::Forwarded { wallet: f.user2 });
        assert_eq!(after - before, units("50"));
        assert_eq!(
            f.events().last(),
            Some(&EscrowEvent::PaymentSent {
                digest: ChannelKey::derive("channel2"),
                channel_id: ChannelId::new("channel2"),
                payer: f.user1,
                wallet: f.user2,
                amount: units("50"),
            })
        );
        assert_eq!(f.engine.get_channel("channel2").await.locked, 0);
        assert_eq!(f.token.balance_of(f.engine.escrow_address()).await, 0);
    }

    #[tokio::test]
    async fn test_pay_rejects_zero_amount() {
        let f = Fixture::new();
        f.engine
            .register_channel(f.owner, "registered", f.user2)
            .await
            .unwrap();
        let events_before = f.engine.events().len();
        let transfers_before = f.token.transfer_count();

        for channel in ["channel3", "registered"] {
            let err = f.engine.pay(f.user1, channel, 0).await.unwrap_err();
            assert_eq!(err, EscrowError::InvalidAmount);
            assert_eq!(err.to_string(), "Invalid amount");
        }

        assert_eq!(f.engine.events().len(), events_before);
        assert_eq!(f.token.transfer_count(), transfers_before);
        assert!(f.engine.get_channel("channel3").await.is_pristine());
    }

    #[tokio::test]
    async fn test_pay_rejects_empty_channel_id() {
        let f = Fixture::new();
        f.approve(f.user1, 10);

        assert_eq!(
            f.engine.pay(f.user1, "", 10).await,
            Err(EscrowError::InvalidChannelId)
        );
        assert!(f.engine.events().is_empty());
    }

    #[tokio::test]
    async fn test_pay_from_custody_or_zero_rejected() {
        let f = Fixture::new();
        let escrow = f.engine.escrow_address();
        f.approve(f.user1, 100);
        f.engine.pay(f.user1, "a", 100).await.unwrap();
        f.token.approve(escrow, escrow, 100).unwrap();

        assert_eq!(
            f.engine.pay(escrow, "b", 100).await,
            Err(EscrowError::InvalidPayer { payer: escrow })
        );
        assert_eq!(
            f.engine.pay(Address::ZERO, "b", 100).await,
            Err(EscrowError::InvalidPayer {
                payer: Address::ZERO
            })
        );

        assert!(f.engine.get_channel("b").await.is_pristine());
        let report = f.engine.verify_solvency().await;
        assert_eq!(report.total_locked, 100);
        assert!(report.is_solvent());
        assert_eq!(f.engine.events().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_pays_leave_no_records() {
        let f = Fixture::new();
        let unfunded = Address::from_label("unfunded");

        for i in 0..200 {
            let result = f.engine.pay(unfunded, format!("spam-{}", i), 1).await;
            assert!(result.is_err());
        }

        assert!(f.engine.registry.is_empty());
        assert_eq!(f.engine.channel_count().await, 0);
        assert!(f.engine.events().is_empty());

        f.approve(f.user1, 5);
        f.engine.pay(f.user1, "kept", 5).await.unwrap();
        assert!(f.engine.pay(f.user1, "kept", 5).await.is_err());
        assert_eq!(f.engine.registry.len(), 1);
        assert_eq!(f.engine.get_channel("kept").await.locked, 5);
    }

    #[tokio::test]
    async fn test_pay_without_allowance_propagates_and_keeps_state() {
        let f = Fixture::new();

        let err = f.engine.pay(f.user1, "channel1", 10).await.unwrap_err();
        assert!(err.is_transfer_failure());

        assert!(f.engine.get_channel("channel1").await.is_pristine());
        assert!(f.engine.events().is_empty());
        assert_eq!(f.token.balance_of(f.user1).await, units("1000"));
        assert_eq!(f.engine.metrics().snapshot().transfers_failed, 1);
    }

    #[tokio::test]
    async fn test_pay_beyond_balance_keeps_state() {
        let f = Fixture::new();
        f.approve(f.user1, units("5000"));
        f.engine.pay(f.user1, "channel1", units("10")).await.unwrap();

        let err = f
            .engine
            .pay(f.user1, "channel1", units("2000"))
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::TransferFailed(_)));
        assert_eq!(f.engine.get_channel("channel1").await.locked, units("10"));
        assert_eq!(f.engine.events().len(), 1);
    }

    #[tokio::test]
    async fn test_forward_to_frozen_wallet_fails_cleanly() {
        let f = Fixture::new();
        f.engine
            .register_channel(f.owner, "channel2", f.user2)
            .await
            .unwrap();
        f.approve(f.user1, 100);
        f.token.freeze(f.user2);

        assert!(f.engine.pay(f.user1, "channel2", 100).await.is_err());
        assert_eq!(f.token.allowance(f.user1, f.engine.escrow_address()).await, 100);
        assert_eq!(f.engine.events().len(), 1);
    }

    #[tokio::test]
    async fn test_register_releases_locked_funds() {
        let f = Fixture::new();
        f.approve(f.user1, units("100"));
        f.engine.pay(f.user1, "channel4", units("100")).await.unwrap();

        let before = f.token.balance_of(f.user2).await;
        let registration = f
            .engine
            .register_channel(f.owner, "channel4", f.user2)
            .await
            .unwrap();
        let after = f.token.balance_of(f.user2).await;

        assert_eq!(registration.released, units("100"));
        assert_eq!(after - before, units("100"));

        let digest = ChannelKey::derive("channel4");
        let emitted: Vec<_> = f
            .engine
            .events()
            .for_channel(&digest)
            .into_iter()
            .skip(1)
            .map(|r| r.event)
            .collect();
        assert_eq!(
            emitted,
            vec![
                EscrowEvent::ChannelRegistered {
                    digest,
                    channel_id: ChannelId::new("channel4"),
                    wallet: f.user2,
                },
                EscrowEvent::FundsReleased {
                    digest,
                    channel_id: ChannelId::new("channel4"),
                    wallet: f.user2,
                    amount: units("100"),
                },
            ]
        );

        let ch = f.engine.get_channel("channel4").await;
        assert!(ch.registered);
        assert_eq!(ch.locked, 0);
        assert_eq!(ch.wallet, f.user2);
        assert_eq!(f.token.balance_of(f.engine.escrow_address()).await, 0);
    }

    #[tokio::test]
    async fn test_register_without_escrow_emits_no_release() {
        let f = Fixture::new();
        let transfers_before = f.token.transfer_count();

        let registration = f
            .engine
            .register_channel(f.owner, "channel7", f.user2)
            .await
            .unwrap();

        assert_eq!(registration.released, 0);
        assert_eq!(f.token.transfer_count(), transfers_before);
        let names: Vec<_> = f.events().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["ChannelRegistered"]);
    }

    #[tokio::test]
    async fn test_register_twice_fails() {
        let f = Fixture::new();
        f.engine
            .register_channel(f.owner, "channel5", f.user2)
            .await
            .unwrap();
        let events_before = f.engine.events().len();

        let err = f
            .engine
            .register_channel(f.owner, "channel5", f.user1)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            EscrowError::AlreadyRegistered {
                channel_id: ChannelId::new("channel5")
            }
        );
        assert_eq!(f.engine.get_channel("channel5").await.wallet, f.user2);
        assert_eq!(f.engine.events().len(), events_before);
    }

    #[tokio::test]
    async fn test_register_zero_wallet_fails() {
        let f = Fixture::new();
        f.approve(f.user1, 30);
        f.engine.pay(f.user1, "channel6", 30).await.unwrap();

        let err = f
            .engine
            .register_channel(f.owner, "channel6", Address::ZERO)
            .await
            .unwrap_err();

        assert_eq!(err, EscrowError::InvalidWallet);
        assert_eq!(err.to_string(), "Invalid wallet");
        let ch = f.engine.get_channel("channel6").await;
        assert!(!ch.registered);
        assert_eq!(ch.locked, 30);

        assert_eq!(
            f.engine
                .register_channel(f.owner, "fresh", Address::ZERO)
                .await,
            Err(EscrowError::InvalidWallet)
        );
    }

    #[tokio::test]
    async fn test_register_zero_wallet_on_registered_channel_fails() {
        let f = Fixture::new();
        f.engine
            .register_channel(f.owner, "bound", f.user2)
            .await
            .unwrap();
        let events_before = f.engine.events().len();

        let err = f
            .engine
            .register_channel(f.owner, "bound", Address::ZERO)
            .await
            .unwrap_err();

        assert_eq!(err, EscrowError::InvalidWallet);
        let ch = f.engine.get_channel("bound").await;
        assert!(ch.registered);
        assert_eq!(ch.wallet, f.user2);
        assert_eq!(f.engine.events().len(), events_before);
    }

    #[tokio::test]
    async fn test_register_escrow_address_fails() {
        let f = Fixture::new();
        let escrow = f.engine.escrow_address();
        assert_eq!(
            f.engine.register_channel(f.owner, "loop", escrow).await,
            Err(EscrowError::InvalidWallet)
        );
    }

    #[tokio::test]
    async fn test_register_unauthorized() {
        let f = Fixture::new();
        f.approve(f.user1, 10);
        f.engine.pay(f.user1, "channel8", 10).await.unwrap();

        let err = f
            .engine
            .register_channel(f.user1, "channel8", f.user1)
            .await
            .unwrap_err();

        assert_eq!(err, EscrowError::Unauthorized { caller: f.user1 });
        let ch = f.engine.get_channel("channel8").await;
        assert!(!ch.registered);
        assert_eq!(ch.locked, 10);
        assert_eq!(f.engine.metrics().snapshot().operations_rejected, 1);
    }

    #[tokio::test]
    async fn test_failed_release_keeps_escrow() {
        let f = Fixture::new();
        f.approve(f.user1, 100);
        f.engine.pay(f.user1, "creator", 100).await.unwrap();
        f.token.freeze(f.user2);

        let err = f
            .engine
            .register_channel(f.owner, "creator", f.user2)
            .await
            .unwrap_err();
        assert!(err.is_transfer_failure());

        let ch = f.engine.get_channel("creator").await;
        assert!(!ch.registered);
        assert!(ch.wallet.is_zero());
        assert_eq!(ch.locked, 100);
        assert_eq!(f.engine.events().len(), 1);

        f.token.unfreeze(f.user2);
        let registration = f
            .engine
            .register_channel(f.owner, "creator", f.user2)
            .await
            .unwrap();
        assert_eq!(registration.released, 100);
        assert_eq!(f.token.balance_of(f.user2).await, units("1000") + 100);
    }

    #[tokio::test]
    async fn test_get_channel_defaults_and_after_registration() {
        let f = Fixture::new();

        let ch = f.engine.get_channel("channel7").await;
        assert_eq!(ch.wallet, Address::ZERO);
        assert!(!ch.registered);
        assert_eq!(ch.locked, 0);

        f.engine
            .register_channel(f.owner, "channel7", f.user2)
            .await
            .unwrap();

        let ch = f.engine.get_channel("channel7").await;
        assert_eq!(ch.wallet, f.user2);
        assert!(ch.registered);
        assert_eq!(ch.locked, 0);

        let by_key = f
            .engine
            .get_channel_by_key(&f.engine.channel_key("channel7"))
            .await;
        assert_eq!(by_key, ch);
    }

    /// Token that accepts every transfer and counts calls.
    #[derive(Default)]
    struct UnboundedToken {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl FungibleToken for UnboundedToken {
        fn address(&self) -> Address {
            Address::from_label("token:unbounded")
        }

        fn symbol(&self) -> &str {
            "UNB"
        }

        fn decimals(&self) -> u32 {
            TOKEN_DECIMALS
        }

        async fn transfer_from(
            &self,
            _spender: Address,
            _from: Address,
            _to: Address,
            _amount: Amount,
        ) -> channelpay_token::TokenResult<()> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }

        async fn transfer(
            &self,
            _from: Address,
            _to: Address,
            _amount: Amount,
        ) -> channelpay_token::TokenResult<()> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }

        async fn balance_of(&self, _owner: Address) -> Amount {
            0
        }

        async fn allowance(&self, _owner: Address, _spender: Address) -> Amount {
            Amount::MAX
        }
    }

    #[tokio::test]
    async fn test_locked_overflow_rejected_before_transfer() {
        let token = Arc::new(UnboundedToken::default());
        let engine = EscrowEngine::new(EscrowConfig::default(), token.clone()).unwrap();
        let payer = Address::from_label("whale");

        engine.pay(payer, "deep", Amount::MAX - 10).await.unwrap();
        engine.pay(payer, "deep", 10).await.unwrap();

        let err = engine.pay(payer, "deep", 1).await.unwrap_err();
        assert_eq!(
            err,
            EscrowError::AmountOverflow {
                channel_id: ChannelId::new("deep")
            }
        );
        assert_eq!(token.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(engine.get_channel("deep").await.locked, Amount::MAX);
        assert_eq!(engine.events().len(), 2);

        // Solvency reflects the token's view, not the bookkeeping.
        assert!(!engine.verify_solvency().await.is_solvent());
    }

    #[tokio::test]
    async fn test_solvency_and_counts() {
        let f = Fixture::new();
        f.approve(f.user1, 300);
        f.engine.pay(f.user1, "a", 100).await.unwrap();
        f.engine.pay(f.user1, "b", 200).await.unwrap();
        f.engine.register_channel(f.owner, "a", f.user2).await.unwrap();
        let _ = f.engine.get_channel("never-touched").await;

        let report = f.engine.verify_solvency().await;
        assert_eq!(report.total_locked, 200);
        assert_eq!(report.custody_balance, 200);
        assert!(report.is_solvent());
        assert_eq!(report.surplus(), 0);

        assert_eq!(f.engine.channel_count().await, 2);
        assert_eq!(f.engine.registered_count().await, 1);
    }

    #[tokio::test]
    async fn test_subscribers_see_operation_events() {
        let f = Fixture::new();
        let mut rx = f.engine.subscribe();
        f.approve(f.user1, 5);
        f.engine.pay(f.user1, "live", 5).await.unwrap();
        f.engine.register_channel(f.owner, "live", f.user2).await.unwrap();

        let names = [
            rx.recv().await.unwrap().event.name(),
            rx.recv().await.unwrap().event.name(),
            rx.recv().await.unwrap().event.name(),
        ];
        assert_eq!(names, ["PaymentLocked", "ChannelRegistered", "FundsReleased"]);
    }

    #[test]
    fn test_fixed_parameters() {
        let f = Fixture::new();
        assert_eq!(f.engine.owner(), f.owner);
        assert_eq!(f.engine.token().address(), f.token.address());
        assert_ne!(f.engine.escrow_address(), f.owner);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_pays_are_not_lost() {
        let f = Fixture::new();
        f.approve(f.user1, units("1000"));
        let engine = Arc::new(f.engine);

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let engine = engine.clone();
                let payer = f.user1;
                tokio::spawn(async move { engine.pay(payer, "hot", 7).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(engine.get_channel("hot").await.locked, 64 * 7);
        assert_eq!(engine.events().len(), 64);
        assert_eq!(f.token.balance_of(engine.escrow_address()).await, 64 * 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_pays_and_registration_conserve_funds() {
        let f = Fixture::new();
        f.approve(f.user1, units("1000"));
        let engine = Arc::new(f.engine);
        let wallet = Address::from_label("creator-wallet");

        let mut handles = Vec::new();
        for i in 0..40 {
            let engine = engine.clone();
            let payer = f.user1;
            let owner = f.owner;
            handles.push(tokio::spawn(async move {
                if i == 20 {
                    engine.register_channel(owner, "race", wallet).await.map(|_| ())
                } else {
                    engine.pay(payer, "race", 3).await.map(|_| ())
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let ch = engine.get_channel("race").await;
        assert!(ch.registered);
        assert_eq!(ch.locked, 0);
        assert_eq!(f.token.balance_of(wallet).await, 39 * 3);
        assert_eq!(f.token.balance_of(engine.escrow_address()).await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_solvency_holds_while_releases_run() {
        let f = Fixture::new();
        f.approve(f.user1, units("1000"));
        for i in 0..32 {
            f.engine.pay(f.user1, format!("pending-{}", i), units("3")).await.unwrap();
        }
        let engine = Arc::new(f.engine);

        let registrations: Vec<_> = (0..32)
            .map(|i| {
                let engine = engine.clone();
                let owner = f.owner;
                tokio::spawn(async move {
                    let wallet = Address::from_label(&format!("wallet-{}", i));
                    engine
                        .register_channel(owner, format!("pending-{}", i), wallet)
                        .await
                })
            })
            .collect();

        for _ in 0..50 {
            let report = engine.verify_solvency().await;
            assert!(report.is_solvent(), "{:?}", report);
            tokio::task::yield_now().await;
        }

        for handle in registrations {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(engine.total_locked().await, 0);
        assert_eq!(engine.registered_count().await, 32);
    }

    proptest! {
        #[test]
        fn prop_locked_equals_sum_of_payments(
            amounts in proptest::collection::vec(1u128..1_000_000_000, 1..25)
        ) {
            let (locked, wallet, expected, events) = tokio_test::block_on(async {
                let f = Fixture::new();
                let expected: Amount = amounts.iter().sum();
                f.approve(f.user1, expected);

                for amount in &amounts {
                    f.engine.pay(f.user1, "prop", *amount).await.unwrap();
                }

                let ch = f.engine.get_channel("prop").await;
                (ch.locked, ch.wallet, expected, f.engine.events().len())
            });

            prop_assert_eq!(locked, expected);
            prop_assert!(wallet.is_zero());
            prop_assert_eq!(events, amounts.len());
        }

        #[test]
        fn prop_registration_always_drains_escrow(
            amounts in proptest::collection::vec(0u128..1_000_000, 0..10)
        ) {
            let (channel, wallet_balance, deposited) = tokio_test::block_on(async {
                let f = Fixture::new();
                let wallet = Address::from_label("payout");
                let deposited: Amount = amounts.iter().sum();
                f.approve(f.user1, deposited);

                for amount in &amounts {
                    // Zero amounts are rejected and must not matter.
                    let _ = f.engine.pay(f.user1, "drain", *amount).await;
                }
                f.engine.register_channel(f.owner, "drain", wallet).await.unwrap();

                let channel = f.engine.get_channel("drain").await;
                (channel, f.token.balance_of(wallet).await, deposited)
            });

            prop_assert!(channel.registered);
            prop_assert_eq!(channel.locked, 0);
            prop_assert!(channel.is_consistent());
            prop_assert_eq!(wallet_balance, deposited);
        }
    }
}
