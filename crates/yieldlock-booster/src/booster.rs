use crate::fees::{FeeBounds, FeeConfig, FeeSplit};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use yieldlock_factory::{ExtraRewardStash, RewardFactory, StashFactory, StashOperator, TokenFactory};
use yieldlock_gauge::SharedGauge;
use yieldlock_proxy::VoterProxy;
use yieldlock_rewards::{BaseRewardPool, PoolOperator, QueueOutcome};
use yieldlock_token::{FungibleToken, MintableToken, SharedToken, TokenLedger};
use yieldlock_types::{
    Address, Amount, Clock, EventBus, PermissionTable, PoolId, ProtocolError, ProtocolEvent,
    Reassign, Result, Role, Timestamp,
};

/// Public view of one registered pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInfo {
    pub pid: PoolId,
    pub lp_token: Address,
    pub gauge: Address,
    pub deposit_token: Address,
    pub reward_ledger: Address,
    pub stash: Address,
    pub closed: bool,
}

struct PoolEntry {
    pid: PoolId,
    lp: SharedToken,
    gauge: SharedGauge,
    deposit_token: Arc<TokenLedger>,
    rewards: Arc<BaseRewardPool>,
    stash: Arc<ExtraRewardStash>,
    // Lifecycle flag; held for the whole of every operation that moves this pool's LP
    closed: Mutex<bool>,
}

impl PoolEntry {
    async fn info(&self) -> PoolInfo {
        PoolInfo {
            pid: self.pid,
            lp_token: self.lp.address(),
            gauge: self.gauge.address(),
            deposit_token: self.deposit_token.address(),
            reward_ledger: self.rewards.address(),
            stash: self.stash.address(),
            closed: *self.closed.lock().await,
        }
    }
}

/// Factories the controller builds each pool with. All of them must list the controller
/// address as their operator.
#[derive(Clone)]
pub struct PoolFactories {
    pub token_factory: Arc<TokenFactory>,
    pub reward_factory: Arc<RewardFactory>,
    pub stash_factory: Arc<StashFactory>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoosterParams {
    pub fee_bounds: FeeBounds,
    pub fees: FeeConfig,
}

/// Pool registry, deposit router and fee engine.
///
/// The controller is the proxy's operator: every gauge position is held by the proxy on its
/// behalf. It is built inside an `Arc` so ledgers and stashes can hold weak handles back to
/// it.
pub struct Booster {
    address: Address,
    self_handle: Weak<Booster>,
    crv: SharedToken,
    proxy: Arc<VoterProxy>,
    factories: PoolFactories,
    clock: Arc<dyn Clock>,
    events: EventBus,
    permissions: PermissionTable,
    fee_bounds: FeeBounds,
    fees: RwLock<FeeConfig>,
    treasury: RwLock<Option<Address>>,
    pools: RwLock<Vec<Arc<PoolEntry>>>,
    // Deposits and earmarks hold a read guard; shutdown_system takes the write guard
    shutdown: RwLock<bool>,
}

impl Booster {
    /// Every role starts with `owner`.
    pub fn new(
        owner: Address,
        crv: SharedToken,
        proxy: Arc<VoterProxy>,
        factories: PoolFactories,
        clock: Arc<dyn Clock>,
        events: EventBus,
        params: BoosterParams,
    ) -> Result<Arc<Self>> {
        params.fee_bounds.validate()?;
        if params.fees.total() > params.fee_bounds.max_fees {
            return Err(ProtocolError::invalid("initial fees exceed max_fees"));
        }
        Ok(Arc::new_cyclic(|handle| Self {
            address: Self::default_address(),
            self_handle: handle.clone(),
            crv,
            proxy,
            factories,
            clock,
            events,
            permissions: PermissionTable::new()
                .with(Role::Owner, owner, Reassign::Holder)
                .with(Role::FeeManager, owner, Reassign::Holder)
                .with(Role::PoolManager, owner, Reassign::Holder)
                .with(Role::VoteDelegate, owner, Reassign::Holder)
                .with(Role::RewardManager, owner, Reassign::Holder),
            fee_bounds: params.fee_bounds,
            fees: RwLock::new(params.fees),
            treasury: RwLock::new(None),
            pools: RwLock::new(Vec::new()),
            shutdown: RwLock::new(false),
        }))
    }

    pub fn default_address() -> Address {
        Address::derive("booster")
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn role(&self, role: Role) -> Option<Address> {
        self.permissions.holder(role)
    }

    pub fn set_owner(&self, caller: Address, owner: Address) -> Result<()> {
        self.permissions.reassign(Role::Owner, caller, owner)
    }

    pub fn set_fee_manager(&self, caller: Address, fee_manager: Address) -> Result<()> {
        self.permissions
            .reassign(Role::FeeManager, caller, fee_manager)
    }

    pub fn set_pool_manager(&self, caller: Address, pool_manager: Address) -> Result<()> {
        self.permissions
            .reassign(Role::PoolManager, caller, pool_manager)
    }

    pub fn set_vote_delegate(&self, caller: Address, vote_delegate: Address) -> Result<()> {
        self.permissions
            .reassign(Role::VoteDelegate, caller, vote_delegate)
    }

    pub fn set_reward_manager(&self, caller: Address, reward_manager: Address) -> Result<()> {
        self.permissions
            .reassign(Role::RewardManager, caller, reward_manager)
    }

    async fn pool(&self, pid: PoolId) -> Result<Arc<PoolEntry>> {
        self.pools
            .read()
            .await
            .get(pid as usize)
            .cloned()
            .ok_or(ProtocolError::PoolNotFound(pid))
    }

    fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Registers a gauge and builds the pool's deposit token, reward ledger and stash.
    pub async fn add_pool(
        &self,
        caller: Address,
        lp: SharedToken,
        gauge: SharedGauge,
    ) -> Result<PoolId> {
        self.permissions.require(Role::PoolManager, caller)?;
        let shutdown = self.shutdown.read().await;
        if *shutdown {
            return Err(ProtocolError::Shutdown);
        }
        if lp.address().is_zero() || gauge.address().is_zero() {
            return Err(ProtocolError::invalid("zero lp token or gauge"));
        }

        let mut pools = self.pools.write().await;
        if pools.iter().any(|p| p.gauge.address() == gauge.address()) {
            return Err(ProtocolError::invalid(format!(
                "gauge {} already registered",
                gauge.address()
            )));
        }
        let pid = pools.len() as PoolId;

        let deposit_token = self
            .factories
            .token_factory
            .create_deposit_token(self.address, lp.as_ref())?;
        let pool_handle: Weak<dyn PoolOperator> = self.self_handle.clone();
        let rewards = self.factories.reward_factory.create_crv_rewards(
            self.address,
            pid,
            deposit_token.clone(),
            pool_handle,
        )?;
        let stash_handle: Weak<dyn StashOperator> = self.self_handle.clone();
        let stash = self
            .factories
            .stash_factory
            .create_stash(self.address, pid, gauge.clone(), stash_handle)
            .await?
            .ok_or(ProtocolError::InvalidStash(pid))?;
        self.factories
            .reward_factory
            .set_access(self.address, stash.address(), true)
            .await?;

        info!(
            pid,
            lp = %lp.address(),
            gauge = %gauge.address(),
            deposit_token = %deposit_token.address(),
            ledger = %rewards.address(),
            stash = %stash.address(),
            "🏊 Pool added"
        );
        self.events.emit(
            self.address,
            self.now(),
            ProtocolEvent::PoolAdded {
                pid,
                underlying_token: lp.address(),
                gauge: gauge.address(),
            },
        );
        pools.push(Arc::new(PoolEntry {
            pid,
            lp,
            gauge,
            deposit_token,
            rewards,
            stash,
            closed: Mutex::new(false),
        }));
        Ok(pid)
    }

    /// Moves `amount` LP from the caller into the gauge and mints deposit tokens, either to
    /// the caller or staked for the caller in the pool's reward ledger.
    pub async fn deposit(
        &self,
        caller: Address,
        pid: PoolId,
        amount: Amount,
        stake: bool,
    ) -> Result<()> {
        if amount == 0 {
            return Err(ProtocolError::InvalidAmount);
        }
        let shutdown = self.shutdown.read().await;
        if *shutdown {
            return Err(ProtocolError::Shutdown);
        }
        let pool = self.pool(pid).await?;
        let closed = pool.closed.lock().await;
        if *closed {
            return Err(ProtocolError::PoolIsClosed(pid));
        }

        pool.lp
            .transfer_from(self.address, caller, self.proxy.address(), amount)
            .await?;
        if let Err(e) = self
            .proxy
            .deposit(self.address, &pool.lp, pool.gauge.as_ref())
            .await
        {
            self.refund_lp(&pool, caller, amount).await?;
            return Err(e);
        }

        if stake {
            pool.deposit_token
                .mint(self.address, self.address, amount)
                .await?;
            pool.deposit_token
                .approve(self.address, pool.rewards.address(), amount)
                .await?;
            if let Err(e) = pool.rewards.stake_for(self.address, caller, amount).await {
                pool.deposit_token
                    .burn(self.address, self.address, amount)
                    .await?;
                self.refund_lp(&pool, caller, amount).await?;
                return Err(e);
            }
        } else {
            pool.deposit_token.mint(self.address, caller, amount).await?;
        }

        info!(account = %caller, pid, amount, stake, "💰 Deposited");
        self.events.emit(
            self.address,
            self.now(),
            ProtocolEvent::Deposited {
                account: caller,
                pid,
                amount,
            },
        );
        Ok(())
    }

    // Pulls a failed deposit back out of the proxy and returns it to the depositor
    async fn refund_lp(&self, pool: &PoolEntry, account: Address, amount: Amount) -> Result<()> {
        self.proxy
            .withdraw(self.address, &pool.lp, pool.gauge.as_ref(), amount)
            .await?;
        pool.lp.transfer(self.address, account, amount).await?;
        warn!(account = %account, pid = pool.pid, amount, "Deposit unwound");
        Ok(())
    }

    pub async fn deposit_all(&self, caller: Address, pid: PoolId, stake: bool) -> Result<Amount> {
        let pool = self.pool(pid).await?;
        let balance = pool.lp.balance_of(caller).await;
        self.deposit(caller, pid, balance, stake).await?;
        Ok(balance)
    }

    /// Burns the caller's deposit tokens and returns the LP.
    pub async fn withdraw(&self, caller: Address, pid: PoolId, amount: Amount) -> Result<()> {
        self.withdraw_inner(pid, amount, caller, caller).await
    }

    pub async fn withdraw_all(&self, caller: Address, pid: PoolId) -> Result<Amount> {
        let pool = self.pool(pid).await?;
        let balance = pool.deposit_token.balance_of(caller).await;
        self.withdraw_inner(pid, balance, caller, caller).await?;
        Ok(balance)
    }

    /// Only the pool's reward ledger may call this; the deposit tokens are burned from the
    /// ledger's own holding and the LP goes to `to`.
    pub async fn withdraw_to(
        &self,
        caller: Address,
        pid: PoolId,
        amount: Amount,
        to: Address,
    ) -> Result<()> {
        let pool = self.pool(pid).await?;
        if caller.is_zero() || caller != pool.rewards.address() {
            return Err(ProtocolError::unauthorized("reward-ledger", caller));
        }
        self.withdraw_inner(pid, amount, caller, to).await
    }

    async fn withdraw_inner(
        &self,
        pid: PoolId,
        amount: Amount,
        from: Address,
        to: Address,
    ) -> Result<()> {
        if amount == 0 {
            return Err(ProtocolError::InvalidAmount);
        }
        if to.is_zero() {
            return Err(ProtocolError::invalid("withdraw to zero address"));
        }
        let pool = self.pool(pid).await?;
        let closed = pool.closed.lock().await;

        pool.deposit_token.burn(self.address, from, amount).await?;
        // A closed pool's LP already sits with the controller
        if !*closed {
            if let Err(e) = self
                .proxy
                .withdraw(self.address, &pool.lp, pool.gauge.as_ref(), amount)
                .await
            {
                pool.deposit_token.mint(self.address, from, amount).await?;
                return Err(e);
            }
        }
        pool.lp.transfer(self.address, to, amount).await?;

        info!(account = %to, pid, amount, closed = *closed, "📤 Withdrawn");
        self.events.emit(
            self.address,
            self.now(),
            ProtocolEvent::Withdrawn {
                account: to,
                pid,
                amount,
            },
        );
        Ok(())
    }

    /// Claims the pool's CRV, runs its stash, takes fees and streams the rest to stakers.
    pub async fn earmark_rewards(&self, caller: Address, pid: PoolId) -> Result<FeeSplit> {
        let shutdown = self.shutdown.read().await;
        if *shutdown {
            return Err(ProtocolError::Shutdown);
        }
        let pool = self.pool(pid).await?;
        let closed = pool.closed.lock().await;
        if *closed {
            return Err(ProtocolError::PoolIsClosed(pid));
        }

        // Secondary tokens first: once CRV is claimed nothing below may fail on the stash
        pool.stash.claim_rewards(self.address).await?;
        let forwarded = pool.stash.process_stash(self.address).await?;

        let claimed = self
            .proxy
            .claim_crv(self.address, pool.gauge.as_ref())
            .await?;

        let fees = *self.fees.read().await;
        let treasury = *self.treasury.read().await;
        let fee_manager = self.permissions.holder(Role::FeeManager);
        let mut split = FeeSplit::compute(claimed, &fees, treasury.is_some())?;

        if split.platform > 0 {
            match fee_manager {
                Some(fee_manager) => {
                    self.crv
                        .transfer(self.address, fee_manager, split.platform)
                        .await?;
                }
                None => {
                    split.stakers += split.platform;
                    split.platform = 0;
                }
            }
        }
        if split.profit > 0 {
            if let Some(treasury) = treasury {
                self.crv
                    .transfer(self.address, treasury, split.profit)
                    .await?;
            }
        }
        if split.stakers > 0 {
            self.crv
                .transfer(self.address, pool.rewards.address(), split.stakers)
                .await?;
            let outcome = pool
                .rewards
                .queue_new_rewards(self.address, split.stakers)
                .await?;
            debug!(pid, applied = matches!(outcome, QueueOutcome::Applied(_)), "Earmark queued");
        }

        info!(
            caller = %caller,
            pid,
            claimed,
            platform = split.platform,
            profit = split.profit,
            stakers = split.stakers,
            extra_tokens = forwarded.len(),
            "🌾 Rewards earmarked"
        );
        Ok(split)
    }

    /// Applies new fees. A sum above the maximum is an error; a fee outside its own range is
    /// ignored and `false` returned.
    pub async fn set_fees(
        &self,
        caller: Address,
        platform_fee_bps: u32,
        profit_fee_bps: u32,
    ) -> Result<bool> {
        self.permissions.require(Role::FeeManager, caller)?;
        let proposed = FeeConfig {
            platform_fee_bps,
            profit_fee_bps,
        };
        let mut fees = self.fees.write().await;
        if !self.fee_bounds.check(&proposed)? {
            warn!(
                platform_fee_bps,
                profit_fee_bps,
                current = ?*fees,
                "Fee outside its bounds, ignored"
            );
            return Ok(false);
        }
        *fees = proposed;
        info!(platform_fee_bps, profit_fee_bps, "⚙️ Fees updated");
        self.events.emit(
            self.address,
            self.now(),
            ProtocolEvent::FeesChanged {
                platform_fee_bps,
                profit_fee_bps,
            },
        );
        Ok(true)
    }

    pub async fn set_treasury(&self, caller: Address, treasury: Address) -> Result<()> {
        self.permissions.require(Role::FeeManager, caller)?;
        if treasury.is_zero() {
            return Err(ProtocolError::invalid("zero treasury"));
        }
        *self.treasury.write().await = Some(treasury);
        info!(treasury = %treasury, "🏦 Treasury set");
        self.events.emit(
            self.address,
            self.now(),
            ProtocolEvent::TreasuryChanged { treasury },
        );
        Ok(())
    }

    /// Pulls the pool's LP out of the gauge into controller custody and closes the pool.
    pub async fn shutdown_pool(&self, caller: Address, pid: PoolId) -> Result<Amount> {
        self.permissions.require(Role::PoolManager, caller)?;
        let pool = self.pool(pid).await?;
        let mut closed = pool.closed.lock().await;
        if *closed {
            return Err(ProtocolError::PoolIsClosed(pid));
        }
        let amount = self.close_pool(&pool, &mut closed).await?;
        Ok(amount)
    }

    /// Shuts down every open pool in `range`, skipping those already closed.
    pub async fn bulk_shutdown(&self, caller: Address, range: Range<PoolId>) -> Result<Vec<PoolId>> {
        self.permissions.require(Role::PoolManager, caller)?;
        let pools: Vec<Arc<PoolEntry>> = {
            let pools = self.pools.read().await;
            let end = (range.end as usize).min(pools.len());
            let start = (range.start as usize).min(end);
            pools[start..end].to_vec()
        };
        let mut shut = Vec::new();
        for pool in pools {
            let mut closed = pool.closed.lock().await;
            if *closed {
                continue;
            }
            self.close_pool(&pool, &mut closed).await?;
            shut.push(pool.pid);
        }
        Ok(shut)
    }

    /// One-way. Waits for in-flight deposits, then closes every pool it can; a pool whose
    /// gauge refuses the withdrawal stays open and is logged.
    pub async fn shutdown_system(&self, caller: Address) -> Result<()> {
        self.permissions.require(Role::Owner, caller)?;
        let mut shutdown = self.shutdown.write().await;
        if *shutdown {
            return Err(ProtocolError::Shutdown);
        }
        *shutdown = true;

        let pools: Vec<Arc<PoolEntry>> = self.pools.read().await.clone();
        for pool in pools {
            let mut closed = pool.closed.lock().await;
            if *closed {
                continue;
            }
            if let Err(e) = self.close_pool(&pool, &mut closed).await {
                warn!(pid = pool.pid, error = %e, "Pool could not be closed during shutdown");
            }
        }

        info!("🛑 System shut down");
        self.events
            .emit(self.address, self.now(), ProtocolEvent::SystemShutdown);
        Ok(())
    }

    async fn close_pool(&self, pool: &PoolEntry, closed: &mut bool) -> Result<Amount> {
        let amount = self
            .proxy
            .withdraw_all(self.address, &pool.lp, pool.gauge.as_ref())
            .await?;
        *closed = true;
        info!(pid = pool.pid, recovered = amount, "🛑 Pool shut down");
        self.events.emit(
            self.address,
            self.now(),
            ProtocolEvent::PoolShutDown { pid: pool.pid },
        );
        Ok(amount)
    }

    pub async fn vote_gauge_weight(
        &self,
        caller: Address,
        gauges: &[Address],
        weights: &[u32],
    ) -> Result<()> {
        self.permissions.require(Role::VoteDelegate, caller)?;
        if gauges.len() != weights.len() {
            return Err(ProtocolError::invalid("gauges and weights differ in length"));
        }
        for (gauge, weight) in gauges.iter().zip(weights) {
            self.proxy
                .vote_gauge_weight(self.address, *gauge, *weight)
                .await?;
        }
        info!(count = gauges.len(), "🗳️ Gauge weights voted");
        Ok(())
    }

    pub async fn delegate_voting_power(&self, caller: Address, delegate: Address) -> Result<()> {
        self.permissions.require(Role::VoteDelegate, caller)?;
        self.proxy
            .delegate_voting_power(self.address, delegate)
            .await?;
        self.events.emit(
            self.address,
            self.now(),
            ProtocolEvent::VotingPowerDelegated { delegate },
        );
        Ok(())
    }

    pub async fn clear_delegation(&self, caller: Address) -> Result<()> {
        self.permissions.require(Role::VoteDelegate, caller)?;
        self.proxy.clear_delegation(self.address).await?;
        self.events
            .emit(self.address, self.now(), ProtocolEvent::VotingPowerCleared);
        Ok(())
    }

    /// Detaches the pool's secondary ledgers from its primary ledger and has the stash start
    /// over. Returns how many ledgers were retired.
    pub async fn clear_extra_rewards(&self, caller: Address, pid: PoolId) -> Result<usize> {
        self.permissions.require(Role::RewardManager, caller)?;
        let pool = self.pool(pid).await?;
        self.factories
            .reward_factory
            .clear_extra_rewards(self.address, &pool.rewards)
            .await?;
        let retired = pool.stash.retire_ledgers(self.address).await?;
        info!(pid, retired, "🧹 Extra rewards cleared");
        Ok(retired)
    }

    /// Only the pool's stash: has the proxy send the gauge's secondary rewards to it.
    pub async fn claim_rewards(&self, caller: Address, pid: PoolId) -> Result<()> {
        // Runs inside earmark_rewards; must not touch the pool's lifecycle lock
        let pool = self.pool(pid).await?;
        if caller.is_zero() || caller != pool.stash.address() {
            return Err(ProtocolError::unauthorized("stash", caller));
        }
        self.proxy
            .claim_rewards(self.address, pool.gauge.as_ref(), caller)
            .await
    }

    pub async fn pool_length(&self) -> usize {
        self.pools.read().await.len()
    }

    pub async fn pool_info(&self, pid: PoolId) -> Result<PoolInfo> {
        Ok(self.pool(pid).await?.info().await)
    }

    pub async fn reward_ledger(&self, pid: PoolId) -> Result<Arc<BaseRewardPool>> {
        Ok(self.pool(pid).await?.rewards.clone())
    }

    pub async fn deposit_token(&self, pid: PoolId) -> Result<Arc<TokenLedger>> {
        Ok(self.pool(pid).await?.deposit_token.clone())
    }

    pub async fn stash(&self, pid: PoolId) -> Result<Arc<ExtraRewardStash>> {
        Ok(self.pool(pid).await?.stash.clone())
    }

    pub async fn fees(&self) -> FeeConfig {
        *self.fees.read().await
    }

    pub fn fee_bounds(&self) -> FeeBounds {
        self.fee_bounds
    }

    pub async fn treasury(&self) -> Option<Address> {
        *self.treasury.read().await
    }

    pub async fn is_shutdown(&self) -> bool {
        *self.shutdown.read().await
    }
}

#[async_trait]
impl PoolOperator for Booster {
    async fn withdraw_to(
        &self,
        caller: Address,
        pid: PoolId,
        amount: Amount,
        to: Address,
    ) -> Result<()> {
        Booster::withdraw_to(self, caller, pid, amount, to).await
    }
}

#[async_trait]
impl StashOperator for Booster {
    async fn claim_rewards(&self, caller: Address, pid: PoolId) -> Result<()> {
        Booster::claim_rewards(self, caller, pid).await
    }

    async fn reward_ledger(&self, pid: PoolId) -> Result<Arc<BaseRewardPool>> {
        Booster::reward_ledger(self, pid).await
    }

    fn reward_manager(&self) -> Option<Address> {
        self.permissions.holder(Role::RewardManager)
    }
}
