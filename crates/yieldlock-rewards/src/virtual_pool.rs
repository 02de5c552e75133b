use crate::stream::{QueueOutcome, RewardParams, RewardStream};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use yieldlock_token::{FungibleToken, SharedToken};
use yieldlock_types::{
    Address, Amount, Clock, EventBus, PermissionTable, PoolId, ProtocolError, ProtocolEvent,
    Reassign, Result, Role,
};

/// Secondary ledger paying one extra reward token.
///
/// Shares are never staked directly: the owning primary ledger forwards every stake and
/// withdrawal so both ledgers hold identical balances.
pub struct VirtualRewardPool {
    address: Address,
    pid: PoolId,
    reward_token: SharedToken,
    params: RewardParams,
    clock: Arc<dyn Clock>,
    events: EventBus,
    permissions: PermissionTable,
    state: Mutex<RewardStream>,
}

impl VirtualRewardPool {
    pub fn new(
        pid: PoolId,
        primary: Address,
        reward_token: SharedToken,
        operator: Address,
        params: RewardParams,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        let label = format!("virtual:{}", reward_token.address());
        Self {
            address: Address::derive_child(&primary, &label),
            pid,
            reward_token,
            params,
            clock,
            events,
            permissions: PermissionTable::new()
                .with(Role::PrimaryLedger, primary, Reassign::Owner)
                .with(Role::Operator, operator, Reassign::Owner),
            state: Mutex::new(RewardStream::new()),
        }
    }

    /// Secondaries created after the primary detached its previous set get a distinct
    /// address per generation.
    pub fn with_generation(mut self, generation: u64) -> Self {
        if let Some(primary) = self.primary() {
            if generation > 0 {
                let label = format!("virtual:{}:{}", self.reward_token.address(), generation);
                self.address = Address::derive_child(&primary, &label);
            }
        }
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn pid(&self) -> PoolId {
        self.pid
    }

    pub fn reward_token(&self) -> Address {
        self.reward_token.address()
    }

    pub fn primary(&self) -> Option<Address> {
        self.permissions.holder(Role::PrimaryLedger)
    }

    pub fn operator(&self) -> Option<Address> {
        self.permissions.holder(Role::Operator)
    }

    pub async fn stake(&self, caller: Address, account: Address, amount: Amount) -> Result<()> {
        self.permissions.require(Role::PrimaryLedger, caller)?;
        if amount == 0 {
            return Err(ProtocolError::InvalidAmount);
        }
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.update(Some(&account), now)?;
        state.add_shares(account, amount)?;
        self.events.emit(
            self.address,
            now,
            ProtocolEvent::Staked { account, amount },
        );
        Ok(())
    }

    pub async fn withdraw(&self, caller: Address, account: Address, amount: Amount) -> Result<()> {
        self.permissions.require(Role::PrimaryLedger, caller)?;
        if amount == 0 {
            return Err(ProtocolError::InvalidAmount);
        }
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.update(Some(&account), now)?;
        state.remove_shares(account, amount)?;
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

    /// Pays everything `account` has earned to `account`.
    pub async fn get_reward(&self, account: Address) -> Result<Amount> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.update(Some(&account), now)?;
        let reward = state.take_owed(&account);
        if reward > 0 {
            if let Err(e) = self.reward_token.transfer(self.address, account, reward).await {
                state.restore_owed(account, reward);
                return Err(e);
            }
            info!(
                token = self.reward_token.symbol(),
                account = %account,
                amount = reward,
                "🎁 Extra reward paid"
            );
            self.events.emit(
                self.address,
                now,
                ProtocolEvent::RewardPaid {
                    account,
                    amount: reward,
                },
            );
        }
        Ok(reward)
    }

    /// Queues reward tokens the operator has already transferred to this ledger.
    pub async fn queue_new_rewards(&self, caller: Address, amount: Amount) -> Result<QueueOutcome> {
        self.permissions.require(Role::Operator, caller)?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let outcome = state.queue_new_rewards(amount, now, &self.params)?;
        if let QueueOutcome::Applied(total) = outcome {
            debug!(
                ledger = %self.address,
                total,
                rate = state.reward_rate,
                "Extra reward period started"
            );
            self.events
                .emit(self.address, now, ProtocolEvent::RewardAdded { amount: total });
        }
        Ok(outcome)
    }

    pub async fn donate(&self, caller: Address, amount: Amount) -> Result<()> {
        let mut state = self.state.lock().await;
        self.reward_token
            .transfer_from(self.address, caller, self.address, amount)
            .await?;
        state.donate(amount)?;
        debug!(ledger = %self.address, from = %caller, amount, "Extra reward donated");
        Ok(())
    }

    pub async fn earned(&self, account: Address) -> Result<Amount> {
        let state = self.state.lock().await;
        state.earned(&account, self.clock.now())
    }

    pub async fn balance_of(&self, account: Address) -> Amount {
        self.state.lock().await.shares_of(&account)
    }

    pub async fn total_supply(&self) -> Amount {
        self.state.lock().await.total_shares
    }

    pub async fn snapshot(&self) -> RewardStream {
        self.state.lock().await.clone()
    }
}
