//! Per-pool extra reward stash.
//!
//! The stash is the receiver of a gauge's secondary reward tokens. On each earmark it claims
//! them (through the controller, which owns the gauge position), registers any token it has
//! not seen before with a fresh secondary ledger, and forwards its whole balance of every
//! registered token into the matching ledger.

use crate::reward_factory::RewardFactory;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use yieldlock_gauge::SharedGauge;
use yieldlock_rewards::{BaseRewardPool, QueueOutcome, VirtualRewardPool};
use yieldlock_token::{FungibleToken, SharedToken};
use yieldlock_types::{
    Address, Amount, PermissionTable, PoolId, ProtocolError, Reassign, Result, Role,
};

/// The controller as seen from a stash.
#[async_trait]
pub trait StashOperator: Send + Sync {
    /// Claims the gauge's secondary rewards of pool `pid` into its stash. Only that stash may
    /// call it.
    async fn claim_rewards(&self, caller: Address, pid: PoolId) -> Result<()>;

    /// Primary ledger of pool `pid`.
    async fn reward_ledger(&self, pid: PoolId) -> Result<Arc<BaseRewardPool>>;

    /// Current holder of the controller's reward-manager role.
    fn reward_manager(&self) -> Option<Address>;
}

/// Extra claim step run after the regular gauge claim, for reward sources that do not pay
/// through the gauge.
#[async_trait]
pub trait RewardHook: Send + Sync {
    async fn on_reward_claim(&self, stash: Address, pid: PoolId) -> anyhow::Result<()>;
}

/// Configuration shared by every stash a [`crate::StashFactory`] builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StashTemplate {
    pub version: u32,
    /// Most secondary tokens one stash will track.
    pub max_tokens: usize,
}

impl Default for StashTemplate {
    fn default() -> Self {
        Self {
            version: 3,
            max_tokens: 8,
        }
    }
}

/// One-time wiring handed to [`ExtraRewardStash::initialize`].
#[derive(Clone)]
pub struct StashInit {
    pub pid: PoolId,
    pub operator: Address,
    pub operator_handle: Weak<dyn StashOperator>,
    pub gauge: SharedGauge,
    pub reward_factory: Arc<RewardFactory>,
}

#[derive(Clone)]
struct TokenReward {
    token: SharedToken,
    rewards: Arc<VirtualRewardPool>,
}

#[derive(Default)]
struct StashState {
    init: Option<StashInit>,
    tokens: Vec<TokenReward>,
    // Secondary ledgers this stash created that are still attached to the primary, by token
    ledgers: HashMap<Address, Arc<VirtualRewardPool>>,
    // Removed by the reward manager; automatic registration skips these
    cleared: HashSet<Address>,
    retired: Vec<Arc<VirtualRewardPool>>,
    hook: Option<Arc<dyn RewardHook>>,
}

pub struct ExtraRewardStash {
    address: Address,
    template: StashTemplate,
    permissions: PermissionTable,
    state: Mutex<StashState>,
}

impl ExtraRewardStash {
    pub fn new(address: Address, factory: Address, template: StashTemplate) -> Self {
        Self {
            address,
            template,
            permissions: PermissionTable::new().with(Role::Owner, factory, Reassign::Holder),
            state: Mutex::new(StashState::default()),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn template(&self) -> &StashTemplate {
        &self.template
    }

    pub async fn initialize(&self, caller: Address, init: StashInit) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.init.is_some() {
            return Err(ProtocolError::AlreadyInitialized);
        }
        self.permissions.require(Role::Owner, caller)?;
        self.permissions
            .grant(Role::Operator, init.operator, Reassign::Owner);
        info!(
            stash = %self.address,
            pid = init.pid,
            gauge = %init.gauge.address(),
            "🧺 Stash initialized"
        );
        state.init = Some(init);
        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.lock().await.init.is_some()
    }

    pub async fn pid(&self) -> Option<PoolId> {
        self.state.lock().await.init.as_ref().map(|i| i.pid)
    }

    /// Claims the gauge's secondary rewards into the stash and picks up newly listed tokens.
    pub async fn claim_rewards(&self, caller: Address) -> Result<()> {
        let mut state = self.state.lock().await;
        let init = self.require_operator(&state, caller)?;
        let handle = Self::upgrade(&init)?;

        self.check_for_new_tokens(&mut state, &init, handle.as_ref())
            .await?;
        handle.claim_rewards(self.address, init.pid).await?;

        if let Some(hook) = state.hook.clone() {
            if let Err(e) = hook.on_reward_claim(self.address, init.pid).await {
                warn!(stash = %self.address, pid = init.pid, error = %e, "Reward hook failed");
            }
        }
        Ok(())
    }

    /// Moves the stash's whole balance of every registered token into its secondary ledger.
    pub async fn process_stash(&self, caller: Address) -> Result<Vec<(Address, Amount)>> {
        let state = self.state.lock().await;
        let init = self.require_operator(&state, caller)?;

        let mut forwarded = Vec::new();
        for entry in &state.tokens {
            let balance = entry.token.balance_of(self.address).await;
            if balance == 0 {
                continue;
            }
            entry
                .token
                .transfer(self.address, entry.rewards.address(), balance)
                .await?;
            let outcome = entry
                .rewards
                .queue_new_rewards(self.address, balance)
                .await?;
            debug!(
                pid = init.pid,
                token = entry.token.symbol(),
                amount = balance,
                applied = matches!(outcome, QueueOutcome::Applied(_)),
                "Stash forwarded rewards"
            );
            forwarded.push((entry.token.address(), balance));
        }
        Ok(forwarded)
    }

    /// Registers `token`, creating its secondary ledger if this stash has not seen it.
    pub async fn set_extra_reward(&self, caller: Address, token: SharedToken) -> Result<()> {
        let mut state = self.state.lock().await;
        let init = Self::require_reward_manager(&state, caller)?;
        let handle = Self::upgrade(&init)?;
        let address = token.address();
        self.register_token(&mut state, &init, handle.as_ref(), token)
            .await?;
        state.cleared.remove(&address);
        Ok(())
    }

    /// Stops forwarding `token`. Its secondary ledger stays attached to the primary and is
    /// reused if the token is registered again; until then the gauge listing is ignored.
    pub async fn clear_extra_reward(&self, caller: Address, token: Address) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::require_reward_manager(&state, caller)?;
        state.tokens.retain(|t| t.token.address() != token);
        state.cleared.insert(token);
        info!(stash = %self.address, token = %token, "🧺 Stash token cleared");
        Ok(())
    }

    pub async fn clear_extra_rewards(&self, caller: Address) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::require_reward_manager(&state, caller)?;
        let cleared: Vec<Address> = state.tokens.iter().map(|t| t.token.address()).collect();
        state.cleared.extend(cleared);
        state.tokens.clear();
        info!(stash = %self.address, "🧺 Stash tokens cleared");
        Ok(())
    }

    /// Forgets every secondary ledger after the primary detached them. Registration starts
    /// over with fresh ledgers; the old ones stay payable through [`Self::retired_rewards`].
    pub async fn retire_ledgers(&self, caller: Address) -> Result<usize> {
        let mut state = self.state.lock().await;
        self.require_operator(&state, caller)?;
        let retired: Vec<Arc<VirtualRewardPool>> =
            state.ledgers.drain().map(|(_, ledger)| ledger).collect();
        let count = retired.len();
        state.retired.extend(retired);
        state.tokens.clear();
        state.cleared.clear();
        info!(stash = %self.address, count, "🧺 Stash ledgers retired");
        Ok(count)
    }

    /// Detached secondary ledgers; stakers collect what they still owe with `get_reward`.
    pub async fn retired_rewards(&self) -> Vec<Arc<VirtualRewardPool>> {
        self.state.lock().await.retired.clone()
    }

    pub async fn set_reward_hook(
        &self,
        caller: Address,
        hook: Option<Arc<dyn RewardHook>>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::require_reward_manager(&state, caller)?;
        debug!(stash = %self.address, enabled = hook.is_some(), "Stash reward hook set");
        state.hook = hook;
        Ok(())
    }

    pub async fn token_count(&self) -> usize {
        self.state.lock().await.tokens.len()
    }

    /// Registered `(token, secondary ledger)` pairs in registration order.
    pub async fn token_rewards(&self) -> Vec<(Address, Arc<VirtualRewardPool>)> {
        let state = self.state.lock().await;
        state
            .tokens
            .iter()
            .map(|t| (t.token.address(), t.rewards.clone()))
            .collect()
    }

    async fn check_for_new_tokens(
        &self,
        state: &mut StashState,
        init: &StashInit,
        handle: &dyn StashOperator,
    ) -> Result<()> {
        for token in init.gauge.reward_tokens().await {
            if state.cleared.contains(&token.address()) {
                continue;
            }
            if !state
                .tokens
                .iter()
                .any(|t| t.token.address() == token.address())
            {
                self.register_token(state, init, handle, token).await?;
            }
        }
        Ok(())
    }

    async fn register_token(
        &self,
        state: &mut StashState,
        init: &StashInit,
        handle: &dyn StashOperator,
        token: SharedToken,
    ) -> Result<()> {
        if token.address().is_zero() {
            return Err(ProtocolError::invalid("zero reward token"));
        }
        if state
            .tokens
            .iter()
            .any(|t| t.token.address() == token.address())
        {
            return Ok(());
        }
        if state.tokens.len() >= self.template.max_tokens {
            return Err(ProtocolError::TooManyExtraRewards {
                max: self.template.max_tokens,
            });
        }

        if let Some(rewards) = state.ledgers.get(&token.address()).cloned() {
            debug!(
                stash = %self.address,
                token = token.symbol(),
                ledger = %rewards.address(),
                "Stash token re-attached"
            );
            state.tokens.push(TokenReward { token, rewards });
            return Ok(());
        }

        let main_rewards = handle.reward_ledger(init.pid).await?;
        let rewards = init
            .reward_factory
            .create_token_rewards(self.address, token.clone(), &main_rewards, self.address)
            .await?;
        state.ledgers.insert(token.address(), rewards.clone());
        info!(
            stash = %self.address,
            pid = init.pid,
            token = token.symbol(),
            ledger = %rewards.address(),
            "🧺 Stash token registered"
        );
        state.tokens.push(TokenReward { token, rewards });
        Ok(())
    }

    fn require_operator(&self, state: &StashState, caller: Address) -> Result<StashInit> {
        let init = state.init.clone().ok_or(ProtocolError::NotInitialized)?;
        self.permissions.require(Role::Operator, caller)?;
        Ok(init)
    }

    fn require_reward_manager(state: &StashState, caller: Address) -> Result<StashInit> {
        let init = state.init.clone().ok_or(ProtocolError::NotInitialized)?;
        let handle = Self::upgrade(&init)?;
        if caller.is_zero() || handle.reward_manager() != Some(caller) {
            return Err(ProtocolError::unauthorized(
                Role::RewardManager.to_string(),
                caller,
            ));
        }
        Ok(init)
    }

    fn upgrade(init: &StashInit) -> Result<Arc<dyn StashOperator>> {
        init.operator_handle
            .upgrade()
            .ok_or(ProtocolError::ComponentUnavailable("stash operator"))
    }
}
