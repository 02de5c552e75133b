use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::info;
use yieldlock_rewards::{BaseRewardPool, PoolOperator, RewardParams, VirtualRewardPool};
use yieldlock_token::{FungibleToken, SharedToken};
use yieldlock_types::{
    Address, Clock, EventBus, PermissionTable, PoolId, ProtocolError, Reassign, Result, Role,
};

/// Builds reward ledgers. It is the reward manager of every primary ledger it creates, so
/// secondary ledgers can only be attached through it.
pub struct RewardFactory {
    address: Address,
    crv: SharedToken,
    params: RewardParams,
    clock: Arc<dyn Clock>,
    events: EventBus,
    permissions: PermissionTable,
    access: RwLock<HashSet<Address>>,
}

impl RewardFactory {
    pub fn new(
        operator: Address,
        crv: SharedToken,
        params: RewardParams,
        clock: Arc<dyn Clock>,
        events: EventBus,
    ) -> Self {
        Self {
            address: Address::derive("reward-factory"),
            crv,
            params,
            clock,
            events,
            permissions: PermissionTable::new().with(Role::Operator, operator, Reassign::Holder),
            access: RwLock::new(HashSet::new()),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn params(&self) -> RewardParams {
        self.params
    }

    pub async fn set_access(&self, caller: Address, stash: Address, allowed: bool) -> Result<()> {
        self.permissions.require(Role::Operator, caller)?;
        let mut access = self.access.write().await;
        if allowed {
            access.insert(stash);
        } else {
            access.remove(&stash);
        }
        info!(stash = %stash, allowed, "🔑 Reward factory access updated");
        Ok(())
    }

    pub async fn has_access(&self, account: Address) -> bool {
        self.access.read().await.contains(&account)
    }

    /// Primary CRV ledger for pool `pid`, staked with `deposit_token`.
    pub fn create_crv_rewards(
        &self,
        caller: Address,
        pid: PoolId,
        deposit_token: SharedToken,
        pool_operator: Weak<dyn PoolOperator>,
    ) -> Result<Arc<BaseRewardPool>> {
        self.permissions.require(Role::Operator, caller)?;
        let pool = BaseRewardPool::new(
            pid,
            deposit_token,
            self.crv.clone(),
            caller,
            self.address,
            pool_operator,
            self.params,
            self.clock.clone(),
            self.events.clone(),
        );
        info!(pid, ledger = %pool.address(), "🏗️ Reward ledger created");
        Ok(Arc::new(pool))
    }

    /// Secondary ledger paying `token`, queued by `operator` and registered on `main_rewards`.
    pub async fn create_token_rewards(
        &self,
        caller: Address,
        token: SharedToken,
        main_rewards: &BaseRewardPool,
        operator: Address,
    ) -> Result<Arc<VirtualRewardPool>> {
        if !self.permissions.has(Role::Operator, caller) && !self.has_access(caller).await {
            return Err(ProtocolError::unauthorized("operator|access-list", caller));
        }
        let symbol = token.symbol().to_string();
        let generation = main_rewards.extra_generation().await;
        let extra = Arc::new(
            VirtualRewardPool::new(
                main_rewards.pid(),
                main_rewards.address(),
                token,
                operator,
                self.params,
                self.clock.clone(),
                self.events.clone(),
            )
            .with_generation(generation),
        );
        main_rewards
            .add_extra_reward(self.address, extra.clone())
            .await?;
        info!(
            pid = main_rewards.pid(),
            token = %symbol,
            ledger = %extra.address(),
            "🏗️ Extra reward ledger created"
        );
        Ok(extra)
    }

    /// Detaches every secondary ledger from `main_rewards`, which only this factory may do
    /// as its reward manager.
    pub async fn clear_extra_rewards(
        &self,
        caller: Address,
        main_rewards: &BaseRewardPool,
    ) -> Result<Vec<Arc<VirtualRewardPool>>> {
        self.permissions.require(Role::Operator, caller)?;
        let detached = main_rewards.clear_extra_rewards(self.address).await?;
        info!(
            pid = main_rewards.pid(),
            count = detached.len(),
            "🏗️ Extra reward ledgers detached"
        );
        Ok(detached)
    }
}
