//! In-memory escrow, gauge, minter, gauge controller and delegate registry.

use crate::{
    DelegateRegistry, Gauge, GaugeController, LockedBalance, Minter, VotingEscrow, MAX_LOCK_TIME,
};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use yieldlock_token::{MintableToken, SharedToken};
use yieldlock_types::math::{mul_div, SCALE};
use yieldlock_types::{Address, Amount, Clock, Timestamp, WEEK};

#[derive(Debug, Default)]
struct GaugeState {
    balances: HashMap<Address, Amount>,
    total: Amount,
    integral: u128,
    last_update: Timestamp,
    paid_integral: HashMap<Address, u128>,
    integrate_fraction: HashMap<Address, Amount>,
    extra_claimable: HashMap<(Address, Address), Amount>,
}

impl GaugeState {
    fn checkpoint(&mut self, account: Address, now: Timestamp, rate: Amount) -> Result<()> {
        if now > self.last_update && self.total > 0 {
            let emitted = rate
                .checked_mul((now - self.last_update) as u128)
                .ok_or_else(|| anyhow!("gauge emission overflow"))?;
            let delta = mul_div(emitted, SCALE, self.total)
                .ok_or_else(|| anyhow!("gauge integral overflow"))?;
            self.integral += delta;
        }
        self.last_update = self.last_update.max(now);

        let balance = self.balances.get(&account).copied().unwrap_or(0);
        let paid = self.paid_integral.get(&account).copied().unwrap_or(0);
        let accrued = mul_div(balance, self.integral - paid, SCALE)
            .ok_or_else(|| anyhow!("gauge accrual overflow"))?;
        *self.integrate_fraction.entry(account).or_insert(0) += accrued;
        self.paid_integral.insert(account, self.integral);
        Ok(())
    }
}

/// Liquidity gauge emitting `emission_rate` primary tokens per second, shared pro rata.
pub struct MemoryGauge {
    address: Address,
    lp: SharedToken,
    emission_rate: Amount,
    clock: Arc<dyn Clock>,
    state: RwLock<GaugeState>,
    reward_tokens: RwLock<Vec<SharedToken>>,
}

impl MemoryGauge {
    pub fn new(label: &str, lp: SharedToken, emission_rate: Amount, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            address: Address::derive(&format!("gauge:{}", label)),
            lp,
            emission_rate,
            clock,
            state: RwLock::new(GaugeState {
                last_update: now,
                ..GaugeState::default()
            }),
            reward_tokens: RwLock::new(Vec::new()),
        }
    }

    pub async fn add_reward_token(&self, token: SharedToken) {
        let mut tokens = self.reward_tokens.write().await;
        if !tokens.iter().any(|t| t.address() == token.address()) {
            tokens.push(token);
        }
    }

    /// Makes `amount` of a secondary reward claimable by `account`. The gauge must already
    /// hold the tokens.
    pub async fn credit_reward(&self, token: Address, account: Address, amount: Amount) {
        let mut state = self.state.write().await;
        *state.extra_claimable.entry((token, account)).or_insert(0) += amount;
    }

    pub async fn total_supply(&self) -> Amount {
        self.state.read().await.total
    }
}

#[async_trait]
impl Gauge for MemoryGauge {
    fn address(&self) -> Address {
        self.address
    }

    fn lp_token(&self) -> Address {
        self.lp.address()
    }

    async fn deposit(&self, caller: Address, amount: Amount) -> Result<()> {
        let mut state = self.state.write().await;
        state.checkpoint(caller, self.clock.now(), self.emission_rate)?;
        self.lp
            .transfer_from(self.address, caller, self.address, amount)
            .await?;
        *state.balances.entry(caller).or_insert(0) += amount;
        state.total += amount;
        debug!(gauge = %self.address, account = %caller, amount, "Gauge deposit");
        Ok(())
    }

    async fn withdraw(&self, caller: Address, amount: Amount) -> Result<()> {
        let mut state = self.state.write().await;
        state.checkpoint(caller, self.clock.now(), self.emission_rate)?;
        let balance = state.balances.get(&caller).copied().unwrap_or(0);
        if balance < amount {
            bail!("gauge withdraw exceeds balance: has {}, needs {}", balance, amount);
        }
        self.lp.transfer(self.address, caller, amount).await?;
        state.balances.insert(caller, balance - amount);
        state.total -= amount;
        debug!(gauge = %self.address, account = %caller, amount, "Gauge withdraw");
        Ok(())
    }

    async fn balance_of(&self, account: Address) -> Amount {
        let state = self.state.read().await;
        state.balances.get(&account).copied().unwrap_or(0)
    }

    async fn integrate_fraction(&self, account: Address) -> Result<Amount> {
        let mut state = self.state.write().await;
        state.checkpoint(account, self.clock.now(), self.emission_rate)?;
        Ok(state.integrate_fraction.get(&account).copied().unwrap_or(0))
    }

    async fn claimable_rewards(&self, account: Address, token: Address) -> Amount {
        let state = self.state.read().await;
        state
            .extra_claimable
            .get(&(token, account))
            .copied()
            .unwrap_or(0)
    }

    async fn claim_rewards(&self, caller: Address, receiver: Address) -> Result<()> {
        let tokens = self.reward_tokens.read().await.clone();
        let mut state = self.state.write().await;
        for token in tokens {
            let key = (token.address(), caller);
            let amount = state.extra_claimable.get(&key).copied().unwrap_or(0);
            if amount == 0 {
                continue;
            }
            token.transfer(self.address, receiver, amount).await?;
            state.extra_claimable.insert(key, 0);
            debug!(gauge = %self.address, token = token.symbol(), receiver = %receiver, amount, "Gauge rewards claimed");
        }
        Ok(())
    }

    async fn reward_tokens(&self) -> Vec<SharedToken> {
        self.reward_tokens.read().await.clone()
    }
}

/// Mints the primary emission token against gauge accruals.
pub struct MemoryMinter {
    address: Address,
    token: Arc<dyn MintableToken>,
    minted: RwLock<HashMap<(Address, Address), Amount>>,
}

impl MemoryMinter {
    /// `token` must list [`MemoryMinter::default_address`] as its minter.
    pub fn new(token: Arc<dyn MintableToken>) -> Self {
        Self {
            address: Self::default_address(),
            token,
            minted: RwLock::new(HashMap::new()),
        }
    }

    pub fn default_address() -> Address {
        Address::derive("minter")
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

#[async_trait]
impl Minter for MemoryMinter {
    async fn mint(&self, caller: Address, gauge: &dyn Gauge) -> Result<Amount> {
        let total = gauge.integrate_fraction(caller).await?;
        let mut minted = self.minted.write().await;
        let key = (caller, gauge.address());
        let already = minted.get(&key).copied().unwrap_or(0);
        let to_mint = total.saturating_sub(already);
        if to_mint > 0 {
            self.token.mint(self.address, caller, to_mint).await?;
            minted.insert(key, total);
            info!(account = %caller, gauge = %gauge.address(), amount = to_mint, "⛏️ Emission minted");
        }
        Ok(to_mint)
    }
}

/// Voting escrow. When `restrict_contracts` is set, only allow-listed callers may lock,
/// mirroring escrows that refuse smart-contract depositors.
pub struct MemoryVotingEscrow {
    address: Address,
    token: SharedToken,
    clock: Arc<dyn Clock>,
    restrict_contracts: bool,
    allowed: RwLock<HashSet<Address>>,
    locks: RwLock<HashMap<Address, LockedBalance>>,
}

impl MemoryVotingEscrow {
    pub fn new(token: SharedToken, clock: Arc<dyn Clock>, restrict_contracts: bool) -> Self {
        Self {
            address: Address::derive("voting-escrow"),
            token,
            clock,
            restrict_contracts,
            allowed: RwLock::new(HashSet::new()),
            locks: RwLock::new(HashMap::new()),
        }
    }

    pub async fn allow(&self, account: Address) {
        self.allowed.write().await.insert(account);
    }

    pub async fn revoke(&self, account: Address) {
        self.allowed.write().await.remove(&account);
    }

    async fn assert_allowed(&self, caller: Address) -> Result<()> {
        if self.restrict_contracts && !self.allowed.read().await.contains(&caller) {
            bail!("Smart contract depositors not allowed");
        }
        Ok(())
    }
}

#[async_trait]
impl VotingEscrow for MemoryVotingEscrow {
    fn address(&self) -> Address {
        self.address
    }

    async fn create_lock(
        &self,
        caller: Address,
        amount: Amount,
        unlock_time: Timestamp,
    ) -> Result<()> {
        self.assert_allowed(caller).await?;
        let now = self.clock.now();
        let end = (unlock_time / WEEK) * WEEK;
        let mut locks = self.locks.write().await;
        let existing = locks.get(&caller).copied().unwrap_or_default();
        if amount == 0 {
            bail!("need non-zero value");
        }
        if existing.amount > 0 {
            bail!("Withdraw old tokens first");
        }
        if end <= now {
            bail!("Can only lock until time in the future");
        }
        if end > now + MAX_LOCK_TIME {
            bail!("Voting lock can be 4 years max");
        }
        self.token
            .transfer_from(self.address, caller, self.address, amount)
            .await?;
        locks.insert(caller, LockedBalance { amount, end });
        info!(account = %caller, amount, end, "🔒 Escrow lock created");
        Ok(())
    }

    async fn increase_amount(&self, caller: Address, amount: Amount) -> Result<()> {
        self.assert_allowed(caller).await?;
        let now = self.clock.now();
        let mut locks = self.locks.write().await;
        let mut lock = locks
            .get(&caller)
            .copied()
            .ok_or_else(|| anyhow!("No existing lock found"))?;
        if amount == 0 {
            bail!("need non-zero value");
        }
        if lock.end <= now {
            bail!("Cannot add to expired lock. Withdraw");
        }
        self.token
            .transfer_from(self.address, caller, self.address, amount)
            .await?;
        lock.amount += amount;
        locks.insert(caller, lock);
        debug!(account = %caller, amount, total = lock.amount, "Escrow amount increased");
        Ok(())
    }

    async fn increase_unlock_time(&self, caller: Address, unlock_time: Timestamp) -> Result<()> {
        self.assert_allowed(caller).await?;
        let now = self.clock.now();
        let end = (unlock_time / WEEK) * WEEK;
        let mut locks = self.locks.write().await;
        let mut lock = locks
            .get(&caller)
            .copied()
            .ok_or_else(|| anyhow!("Nothing is locked"))?;
        if lock.end <= now {
            bail!("Lock expired");
        }
        if end <= lock.end {
            bail!("Can only increase lock duration");
        }
        if end > now + MAX_LOCK_TIME {
            bail!("Voting lock can be 4 years max");
        }
        lock.end = end;
        locks.insert(caller, lock);
        debug!(account = %caller, end, "Escrow unlock time increased");
        Ok(())
    }

    async fn withdraw(&self, caller: Address) -> Result<()> {
        let now = self.clock.now();
        let mut locks = self.locks.write().await;
        let lock = locks.get(&caller).copied().unwrap_or_default();
        if lock.amount > 0 && now < lock.end {
            bail!("The lock didn't expire");
        }
        if lock.amount > 0 {
            self.token.transfer(self.address, caller, lock.amount).await?;
        }
        locks.remove(&caller);
        info!(account = %caller, amount = lock.amount, "🔓 Escrow withdrawn");
        Ok(())
    }

    async fn locked(&self, account: Address) -> LockedBalance {
        self.locks
            .read()
            .await
            .get(&account)
            .copied()
            .unwrap_or_default()
    }

    async fn balance_of(&self, account: Address) -> Amount {
        let lock = self.locked(account).await;
        let now = self.clock.now();
        if lock.end <= now {
            return 0;
        }
        mul_div(lock.amount, (lock.end - now) as u128, MAX_LOCK_TIME as u128).unwrap_or(0)
    }
}

/// Gauge weight votes; each voter can spend at most 10000 bps across gauges.
#[derive(Default)]
pub struct MemoryGaugeController {
    votes: RwLock<HashMap<(Address, Address), u32>>,
}

impl MemoryGaugeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn vote_of(&self, voter: Address, gauge: Address) -> u32 {
        self.votes
            .read()
            .await
            .get(&(voter, gauge))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl GaugeController for MemoryGaugeController {
    async fn vote_for_gauge_weights(
        &self,
        caller: Address,
        gauge: Address,
        weight: u32,
    ) -> Result<()> {
        if weight > 10_000 {
            bail!("You used all your voting power");
        }
        let mut votes = self.votes.write().await;
        let used: u32 = votes
            .iter()
            .filter(|((voter, g), _)| *voter == caller && *g != gauge)
            .map(|(_, w)| *w)
            .sum();
        if used + weight > 10_000 {
            bail!("Used too much power");
        }
        votes.insert((caller, gauge), weight);
        debug!(voter = %caller, gauge = %gauge, weight, "Gauge weight voted");
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDelegateRegistry {
    delegations: RwLock<HashMap<(Address, String), Address>>,
}

impl MemoryDelegateRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DelegateRegistry for MemoryDelegateRegistry {
    async fn set_delegate(&self, caller: Address, space: &str, delegate: Address) -> Result<()> {
        if delegate == caller {
            bail!("Can't delegate to self");
        }
        if delegate.is_zero() {
            bail!("Can't delegate to 0x0");
        }
        let mut delegations = self.delegations.write().await;
        let key = (caller, space.to_string());
        if delegations.get(&key) == Some(&delegate) {
            bail!("Already delegated to this address");
        }
        delegations.insert(key, delegate);
        Ok(())
    }

    async fn clear_delegate(&self, caller: Address, space: &str) -> Result<()> {
        let mut delegations = self.delegations.write().await;
        delegations
            .remove(&(caller, space.to_string()))
            .ok_or_else(|| anyhow!("No delegate set"))?;
        Ok(())
    }

    async fn delegation(&self, account: Address, space: &str) -> Option<Address> {
        self.delegations
            .read()
            .await
            .get(&(account, space.to_string()))
            .copied()
    }
}
