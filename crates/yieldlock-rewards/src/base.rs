use crate::stream::{QueueOutcome, RewardParams, RewardStream};
use crate::virtual_pool::VirtualRewardPool;
use crate::PoolOperator;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use yieldlock_token::{FungibleToken, SharedToken};
use yieldlock_types::{
    Address, Amount, Clock, EventBus, PermissionTable, PoolId, ProtocolError, ProtocolEvent,
    Reassign, Result, Role, Timestamp,
};

struct LedgerState {
    stream: RewardStream,
    extra_rewards: Vec<Arc<VirtualRewardPool>>,
    // Bumped whenever the secondaries are detached
    extra_generation: u64,
}

/// Primary reward ledger of one pool.
///
/// Stakers deposit the pool's deposit token and earn CRV queued by the controller. Every
/// share change is forwarded, in registration order, to each secondary ledger in
/// `extra_rewards` while the primary guard is still held.
pub struct BaseRewardPool {
    address: Address,
    pid: PoolId,
    staking_token: SharedToken,
    reward_token: SharedToken,
    params: RewardParams,
    clock: Arc<dyn Clock>,
    events: EventBus,
    permissions: PermissionTable,
    pool_operator: Weak<dyn PoolOperator>,
    state: Mutex<LedgerState>,
}

impl BaseRewardPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pid: PoolId,
        staking_token: SharedToken,
        reward_token: SharedToken,
        operator: Address,
        reward_manager: Address,
        pool_operator: Weak<dyn PoolOperator>,
        params: RewardParams,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        Self {
            address: Address::derive(&format!("reward-pool:{}", pid)),
            pid,
            staking_token,
            reward_token,
            params,
            clock,
            events,
            permissions: PermissionTable::new()
                .with(Role::Operator, operator, Reassign::Owner)
                .with(Role::RewardManager, reward_manager, Reassign::Owner),
            pool_operator,
            state: Mutex::new(LedgerState {
                stream: RewardStream::new(),
                extra_rewards: Vec::new(),
                extra_generation: 0,
            }),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn pid(&self) -> PoolId {
        self.pid
    }

    pub fn staking_token(&self) -> Address {
        self.staking_token.address()
    }

    pub fn reward_token(&self) -> Address {
        self.reward_token.address()
    }

    pub fn operator(&self) -> Option<Address> {
        self.permissions.holder(Role::Operator)
    }

    pub fn reward_manager(&self) -> Option<Address> {
        self.permissions.holder(Role::RewardManager)
    }

    pub async fn stake(&self, caller: Address, amount: Amount) -> Result<()> {
        self.stake_from(caller, caller, amount).await
    }

    pub async fn stake_all(&self, caller: Address) -> Result<Amount> {
        let balance = self.staking_token.balance_of(caller).await;
        self.stake_from(caller, caller, balance).await?;
        Ok(balance)
    }

    /// Pulls `amount` deposit tokens from `caller` and credits them to `account`.
    pub async fn stake_for(&self, caller: Address, account: Address, amount: Amount) -> Result<()> {
        self.stake_from(caller, account, amount).await
    }

    async fn stake_from(&self, payer: Address, account: Address, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Err(ProtocolError::InvalidAmount);
        }
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.stream.update(Some(&account), now)?;
        self.staking_token
            .transfer_from(self.address, payer, self.address, amount)
            .await?;
        if let Err(e) = self.add_stake(&mut state, account, amount).await {
            self.staking_token
                .transfer(self.address, payer, amount)
                .await?;
            return Err(e);
        }

        info!(
            pid = self.pid,
            account = %account,
            amount,
            total = state.stream.total_shares,
            "📥 Staked"
        );
        self.events
            .emit(self.address, now, ProtocolEvent::Staked { account, amount });
        Ok(())
    }

    pub async fn withdraw(&self, caller: Address, amount: Amount, claim: bool) -> Result<()> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        self.check_stake(&state, caller, amount)?;
        if claim {
            self.pay_reward(&mut state, caller, true, now).await?;
        }
        self.remove_stake(&mut state, caller, amount, now).await?;
        if let Err(e) = self
            .staking_token
            .transfer(self.address, caller, amount)
            .await
        {
            self.add_stake(&mut state, caller, amount).await?;
            return Err(e);
        }
        Ok(())
    }

    pub async fn withdraw_all(&self, caller: Address, claim: bool) -> Result<Amount> {
        let balance = self.balance_of(caller).await;
        self.withdraw(caller, balance, claim).await?;
        Ok(balance)
    }

    /// Withdraws and has the pool operator return the underlying LP straight to the caller.
    pub async fn withdraw_and_unwrap(
        &self,
        caller: Address,
        amount: Amount,
        claim: bool,
    ) -> Result<()> {
        let pool_operator = self
            .pool_operator
            .upgrade()
            .ok_or(ProtocolError::ComponentUnavailable("pool operator"))?;
        let now = self.clock.now();
        {
            let mut state = self.state.lock().await;
            self.check_stake(&state, caller, amount)?;
            if claim {
                self.pay_reward(&mut state, caller, true, now).await?;
            }
            self.remove_stake(&mut state, caller, amount, now).await?;
        }
        // The operator locks its pool entry; the ledger guard is released first
        let result = pool_operator
            .withdraw_to(self.address, self.pid, amount, caller)
            .await;
        if let Err(e) = result {
            // The deposit tokens never left, so the shares go back
            let mut state = self.state.lock().await;
            state.stream.update(Some(&caller), self.clock.now())?;
            self.add_stake(&mut state, caller, amount).await?;
            return Err(e);
        }
        Ok(())
    }

    pub async fn withdraw_all_and_unwrap(&self, caller: Address, claim: bool) -> Result<Amount> {
        let balance = self.balance_of(caller).await;
        self.withdraw_and_unwrap(caller, balance, claim).await?;
        Ok(balance)
    }

    async fn remove_stake(
        &self,
        state: &mut LedgerState,
        account: Address,
        amount: Amount,
        now: Timestamp,
    ) -> Result<()> {
        self.check_stake(state, account, amount)?;
        state.stream.update(Some(&account), now)?;
        for (i, extra) in state.extra_rewards.iter().enumerate() {
            if let Err(e) = extra.withdraw(self.address, account, amount).await {
                for done in &state.extra_rewards[..i] {
                    if let Err(undo) = done.stake(self.address, account, amount).await {
                        warn!(ledger = %done.address(), error = %undo, "Mirror restake failed");
                    }
                }
                return Err(e);
            }
        }
        state.stream.remove_shares(account, amount)?;

        info!(
            pid = self.pid,
            account = %account,
            amount,
            total = state.stream.total_shares,
            "📤 Withdrawn"
        );
        self.events.emit(
            self.address,
            now,
            ProtocolEvent::Withdrawn {
                account,
                pid: self.pid,
                amount,
            },
        );
        Ok(())
    }

    fn check_stake(&self, state: &LedgerState, account: Address, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Err(ProtocolError::InvalidAmount);
        }
        let available = state.stream.shares_of(&account);
        if available < amount {
            return Err(ProtocolError::InsufficientBalance {
                account,
                available,
                needed: amount,
            });
        }
        Ok(())
    }

    /// Credits shares after the stream was updated for `account`, mirroring them into every
    /// secondary first. A failing secondary unwinds the ones before it.
    async fn add_stake(
        &self,
        state: &mut LedgerState,
        account: Address,
        amount: Amount,
    ) -> Result<()> {
        for (i, extra) in state.extra_rewards.iter().enumerate() {
            if let Err(e) = extra.stake(self.address, account, amount).await {
                for done in &state.extra_rewards[..i] {
                    if let Err(undo) = done.withdraw(self.address, account, amount).await {
                        warn!(ledger = %done.address(), error = %undo, "Mirror unstake failed");
                    }
                }
                return Err(e);
            }
        }
        state.stream.add_shares(account, amount)
    }

    pub async fn get_reward(&self, caller: Address) -> Result<Amount> {
        self.get_reward_for(caller, true).await
    }

    /// Pays `account` its CRV and, with `claim_extras`, every secondary reward. Anyone may
    /// trigger it; rewards always go to `account`.
    pub async fn get_reward_for(&self, account: Address, claim_extras: bool) -> Result<Amount> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        self.pay_reward(&mut state, account, claim_extras, now).await
    }

    async fn pay_reward(
        &self,
        state: &mut LedgerState,
        account: Address,
        claim_extras: bool,
        now: Timestamp,
    ) -> Result<Amount> {
        state.stream.update(Some(&account), now)?;
        let reward = state.stream.take_owed(&account);
        if reward > 0 {
            if let Err(e) = self.reward_token.transfer(self.address, account, reward).await {
                state.stream.restore_owed(account, reward);
                return Err(e);
            }
            info!(pid = self.pid, account = %account, amount = reward, "🎁 Reward paid");
            self.events.emit(
                self.address,
                now,
                ProtocolEvent::RewardPaid {
                    account,
                    amount: reward,
                },
            );
        }
        if claim_extras {
            for extra in &state.extra_rewards {
                extra.get_reward(account).await?;
            }
        }
        Ok(reward)
    }

    /// Streams `amount` CRV the operator has already transferred to this ledger.
    pub async fn queue_new_rewards(&self, caller: Address, amount: Amount) -> Result<QueueOutcome> {
        self.permissions.require(Role::Operator, caller)?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let outcome = state.stream.queue_new_rewards(amount, now, &self.params)?;
        match outcome {
            QueueOutcome::Applied(total) => {
                info!(
                    pid = self.pid,
                    total,
                    rate = state.stream.reward_rate,
                    period_finish = state.stream.period_finish,
                    "📈 Reward period started"
                );
                self.events
                    .emit(self.address, now, ProtocolEvent::RewardAdded { amount: total });
            }
            QueueOutcome::Deferred => {
                debug!(
                    pid = self.pid,
                    queued = state.stream.queued_rewards,
                    "Reward top-up deferred"
                );
            }
        }
        Ok(outcome)
    }

    /// Permissionless top-up of queued rewards, pulled from `caller`.
    pub async fn donate(&self, caller: Address, amount: Amount) -> Result<()> {
        let mut state = self.state.lock().await;
        self.reward_token
            .transfer_from(self.address, caller, self.address, amount)
            .await?;
        state.stream.donate(amount)?;
        debug!(pid = self.pid, from = %caller, amount, "Reward donated");
        Ok(())
    }

    /// Registers a secondary ledger and seeds it with every current share so it mirrors
    /// stakers that predate it.
    pub async fn add_extra_reward(&self, caller: Address, extra: Arc<VirtualRewardPool>) -> Result<()> {
        self.permissions.require(Role::RewardManager, caller)?;
        if extra.primary() != Some(self.address) {
            return Err(ProtocolError::invalid(
                "secondary ledger is bound to another primary",
            ));
        }
        let mut state = self.state.lock().await;
        if state.extra_rewards.len() >= self.params.max_extra_rewards {
            return Err(ProtocolError::TooManyExtraRewards {
                max: self.params.max_extra_rewards,
            });
        }
        if state
            .extra_rewards
            .iter()
            .any(|e| e.address() == extra.address())
        {
            return Err(ProtocolError::invalid("secondary ledger already registered"));
        }

        let holders: Vec<(Address, Amount)> = state
            .stream
            .holders()
            .map(|(account, shares)| (*account, *shares))
            .collect();
        for (account, shares) in holders {
            let mirrored = extra.balance_of(account).await;
            if shares > mirrored {
                extra.stake(self.address, account, shares - mirrored).await?;
            }
        }
        info!(
            pid = self.pid,
            ledger = %extra.address(),
            token = %extra.reward_token(),
            "➕ Extra reward registered"
        );
        state.extra_rewards.push(extra);
        Ok(())
    }

    /// Detaches every secondary ledger and returns them. Their shares freeze; what they
    /// already stream stays claimable on each of them.
    pub async fn clear_extra_rewards(
        &self,
        caller: Address,
    ) -> Result<Vec<Arc<VirtualRewardPool>>> {
        self.permissions.require(Role::RewardManager, caller)?;
        let mut state = self.state.lock().await;
        if state.extra_rewards.is_empty() {
            return Ok(Vec::new());
        }
        warn!(
            pid = self.pid,
            count = state.extra_rewards.len(),
            "Extra rewards cleared"
        );
        state.extra_generation += 1;
        Ok(std::mem::take(&mut state.extra_rewards))
    }

    /// Number of times the secondaries were detached. Part of every new secondary's address.
    pub async fn extra_generation(&self) -> u64 {
        self.state.lock().await.extra_generation
    }

    pub async fn extra_rewards(&self) -> Vec<Arc<VirtualRewardPool>> {
        self.state.lock().await.extra_rewards.clone()
    }

    pub async fn extra_rewards_length(&self) -> usize {
        self.state.lock().await.extra_rewards.len()
    }

    pub async fn earned(&self, account: Address) -> Result<Amount> {
        let state = self.state.lock().await;
        state.stream.earned(&account, self.clock.now())
    }

    pub async fn reward_per_share(&self) -> Result<u128> {
        let state = self.state.lock().await;
        state.stream.reward_per_share(self.clock.now())
    }

    pub async fn balance_of(&self, account: Address) -> Amount {
        self.state.lock().await.stream.shares_of(&account)
    }

    pub async fn total_supply(&self) -> Amount {
        self.state.lock().await.stream.total_shares
    }

    /// Copy of the stream state, for inspection.
    pub async fn snapshot(&self) -> RewardStream {
        self.state.lock().await.stream.clone()
    }
}
