//! In-process token implementation.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use channelpay_common::{Address, Amount};

use crate::error::{TokenError, TokenResult};
use crate::token::FungibleToken;

#[derive(Default)]
struct Balances {
    balances: HashMap<Address, Amount>,
    allowances: HashMap<(Address, Address), Amount>,
    frozen: HashSet<Address>,
    total_supply: Amount,
}

impl Balances {
    fn balance(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Validate a move without applying it.
    fn check_move(&self, from: Address, to: Address, amount: Amount) -> TokenResult<()> {
        if from.is_zero() || to.is_zero() {
            return Err(TokenError::ZeroAddress);
        }
        if self.frozen.contains(&from) {
            return Err(TokenError::AccountFrozen(from));
        }
        if self.frozen.contains(&to) {
            return Err(TokenError::AccountFrozen(to));
        }

        let available = self.balance(&from);
        if available < amount {
            return Err(TokenError::InsufficientBalance {
                account: from,
                required: amount,
                available,
            });
        }
        if from != to && self.balance(&to).checked_add(amount).is_none() {
            return Err(TokenError::BalanceOverflow(to));
        }
        Ok(())
    }

    /// Apply a move previously validated by `check_move`.
    fn apply_move(&mut self, from: Address, to: Address, amount: Amount) {
        if from == to {
            return;
        }
        *self.balances.entry(from).or_insert(0) -= amount;
        *self.balances.entry(to).or_insert(0) += amount;
    }
}

/// ERC-20 equivalent held in memory.
///
/// All balance and allowance updates of one transfer happen under a single
/// write lock, so a transfer is either fully applied or not at all.
pub struct InMemoryToken {
    name: String,
    symbol: String,
    decimals: u32,
    address: Address,
    state: RwLock<Balances>,
    transfers: AtomicU64,
}

impl InMemoryToken {
    /// Create a new token with zero supply.
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, decimals: u32) -> Self {
        let symbol = symbol.into();
        Self {
            name: name.into(),
            address: Address::from_label(&format!("token:{}", symbol)),
            symbol,
            decimals,
            state: RwLock::new(Balances::default()),
            transfers: AtomicU64::new(0),
        }
    }

    /// Token name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create `amount` new tokens for `to`.
    pub fn mint(&self, to: Address, amount: Amount) -> TokenResult<()> {
        if to.is_zero() {
            return Err(TokenError::ZeroAddress);
        }
        let mut state = self.state.write();
        let new_balance = state
            .balance(&to)
            .checked_add(amount)
            .ok_or(TokenError::BalanceOverflow(to))?;
        let new_supply = state
            .total_supply
            .checked_add(amount)
            .ok_or(TokenError::BalanceOverflow(to))?;
        state.balances.insert(to, new_balance);
        state.total_supply = new_supply;
        debug!(account = %to, amount, "Minted tokens");
        Ok(())
    }

    /// Set the allowance `owner` grants to `spender`.
    pub fn approve(&self, owner: Address, spender: Address, amount: Amount) -> TokenResult<()> {
        if owner.is_zero() || spender.is_zero() {
            return Err(TokenError::ZeroAddress);
        }
        self.state.write().allowances.insert((owner, spender), amount);
        debug!(owner = %owner, spender = %spender, amount, "Allowance set");
        Ok(())
    }

    /// Reject every transfer from or to `account` until unfrozen.
    pub fn freeze(&self, account: Address) {
        self.state.write().frozen.insert(account);
    }

    /// Lift a freeze.
    pub fn unfreeze(&self, account: Address) {
        self.state.write().frozen.remove(&account);
    }

    /// Check if an account is frozen.
    pub fn is_frozen(&self, account: &Address) -> bool {
        self.state.read().frozen.contains(account)
    }

    /// Total minted supply.
    pub fn total_supply(&self) -> Amount {
        self.state.read().total_supply
    }

    /// Number of transfers applied so far.
    pub fn transfer_count(&self) -> u64 {
        self.transfers.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl FungibleToken for InMemoryToken {
    fn address(&self) -> Address {
        self.address
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn decimals(&self) -> u32 {
        self.decimals
    }

    async fn transfer_from(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> TokenResult<()> {
        let mut state = self.state.write();

        let approved = state.allowances.get(&(from, spender)).copied().unwrap_or(0);
        if approved < amount {
            return Err(TokenError::InsufficientAllowance {
                owner: from,
                spender,
                required: amount,
                approved,
            });
        }
        state.check_move(from, to, amount)?;

        state.allowances.insert((from, spender), approved - amount);
        state.apply_move(from, to, amount);
        self.transfers.fetch_add(1, Ordering::Relaxed);

        debug!(spender = %spender, from = %from, to = %to, amount, "transferFrom applied");
        Ok(())
    }

    async fn transfer(&self, from: Address, to: Address, amount: Amount) -> TokenResult<()> {
        let mut state = self.state.write();
        state.check_move(from, to, amount)?;
        state.apply_move(from, to, amount);
        self.transfers.fetch_add(1, Ordering::Relaxed);

        debug!(from = %from, to = %to, amount, "transfer applied");
        Ok(())
    }

    async fn balance_of(&self, owner: Address) -> Amount {
        self.state.read().balance(&owner)
    }

    async fn allowance(&self, owner: Address, spender: Address) -> Amount {
        self.state
            .read()
            .allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or(0)
    }
}
