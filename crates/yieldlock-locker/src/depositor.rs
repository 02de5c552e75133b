use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use yieldlock_gauge::MAX_LOCK_TIME;
use yieldlock_proxy::VoterProxy;
use yieldlock_rewards::BaseRewardPool;
use yieldlock_token::{FungibleToken, MintableToken, SharedToken};
use yieldlock_types::math::bps_of;
use yieldlock_types::{
    Address, Amount, Clock, PermissionTable, ProtocolError, Reassign, Result, Role, Timestamp,
    WEEK,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockerParams {
    /// Share of a deferred deposit set aside for whoever locks it, in bps.
    pub lock_incentive_bps: u32,
    pub max_lock_incentive_bps: u32,
    pub max_lock_time: u64,
}

impl Default for LockerParams {
    fn default() -> Self {
        Self {
            lock_incentive_bps: 10,
            max_lock_incentive_bps: 30,
            max_lock_time: MAX_LOCK_TIME,
        }
    }
}

#[derive(Debug, Default)]
struct LockerState {
    lock_incentive_bps: u32,
    incentive_crv: Amount,
    unlock_time: Timestamp,
    released: bool,
}

pub struct CrvDepositor {
    address: Address,
    crv: SharedToken,
    wrapped: Arc<dyn MintableToken>,
    proxy: Arc<VoterProxy>,
    clock: Arc<dyn Clock>,
    params: LockerParams,
    permissions: PermissionTable,
    state: Mutex<LockerState>,
}

impl CrvDepositor {
    /// `wrapped` must list [`CrvDepositor::address`] as its minter, and the proxy must list
    /// it as depositor.
    pub fn new(
        owner: Address,
        fee_manager: Address,
        crv: SharedToken,
        wrapped: Arc<dyn MintableToken>,
        proxy: Arc<VoterProxy>,
        clock: Arc<dyn Clock>,
        params: LockerParams,
    ) -> Self {
        Self {
            address: Self::default_address(),
            crv,
            wrapped,
            proxy,
            clock,
            params,
            permissions: PermissionTable::new()
                .with(Role::Owner, owner, Reassign::Holder)
                .with(Role::FeeManager, fee_manager, Reassign::Holder),
            state: Mutex::new(LockerState {
                lock_incentive_bps: params.lock_incentive_bps,
                ..LockerState::default()
            }),
        }
    }

    pub fn default_address() -> Address {
        Address::derive("crv-depositor")
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn wrapped_token(&self) -> Address {
        self.wrapped.address()
    }

    pub fn role(&self, role: Role) -> Option<Address> {
        self.permissions.holder(role)
    }

    pub fn set_owner(&self, caller: Address, owner: Address) -> Result<()> {
        self.permissions.reassign(Role::Owner, caller, owner)
    }

    pub fn set_fee_manager(&self, caller: Address, fee_manager: Address) -> Result<()> {
        self.permissions.reassign(Role::FeeManager, caller, fee_manager)
    }

    /// Out-of-range values leave the incentive unchanged and return `false`.
    pub async fn set_fees(&self, caller: Address, lock_incentive_bps: u32) -> Result<bool> {
        self.permissions.require(Role::FeeManager, caller)?;
        let mut state = self.state.lock().await;
        if lock_incentive_bps > self.params.max_lock_incentive_bps {
            warn!(
                requested = lock_incentive_bps,
                max = self.params.max_lock_incentive_bps,
                current = state.lock_incentive_bps,
                "Lock incentive out of range, ignored"
            );
            return Ok(false);
        }
        state.lock_incentive_bps = lock_incentive_bps;
        info!(lock_incentive_bps, "⚙️ Lock incentive updated");
        Ok(true)
    }

    /// Bootstraps the escrow position with everything held once no voting power remains.
    pub async fn initial_lock(&self, caller: Address) -> Result<()> {
        self.permissions.require(Role::FeeManager, caller)?;
        let mut state = self.state.lock().await;
        if state.released {
            return Err(ProtocolError::Shutdown);
        }
        if self.proxy.voting_power().await > 0 {
            debug!("Escrow lock already active");
            return Ok(());
        }

        let now = self.clock.now();
        let unlock_at = now + self.params.max_lock_time;
        let unlock_in_weeks = (unlock_at / WEEK) * WEEK;

        let mut amount = self.crv.balance_of(self.address).await;
        if self.proxy.locked().await.amount > 0 {
            amount += self.proxy.release(self.address).await?;
        }
        self.crv
            .transfer(self.address, self.proxy.address(), amount)
            .await?;
        if let Err(e) = self
            .proxy
            .create_lock(self.address, amount, unlock_at)
            .await
        {
            self.proxy.return_crv(self.address, amount).await?;
            return Err(e);
        }
        state.unlock_time = unlock_in_weeks;

        info!(amount, unlock_time = unlock_in_weeks, "🔒 Initial lock created");
        Ok(())
    }

    /// Pulls `amount` CRV from the caller and mints the same amount of wrapped token, to the
    /// caller or staked for the caller into `stake_target`.
    pub async fn deposit(
        &self,
        caller: Address,
        amount: Amount,
        lock_now: bool,
        stake_target: Option<&BaseRewardPool>,
    ) -> Result<Amount> {
        if amount == 0 {
            return Err(ProtocolError::InvalidAmount);
        }
        let mut state = self.state.lock().await;
        if state.released {
            return Err(ProtocolError::Shutdown);
        }

        self.crv
            .transfer_from(self.address, caller, self.address, amount)
            .await?;

        let mut minted = amount;
        if lock_now {
            if let Err(e) = self.lock_pending(&mut state).await {
                self.crv.transfer(self.address, caller, amount).await?;
                return Err(e);
            }
            minted += std::mem::take(&mut state.incentive_crv);
        } else {
            let incentive = bps_of(amount, state.lock_incentive_bps)?;
            minted -= incentive;
            state.incentive_crv += incentive;
        }

        match stake_target {
            None => {
                self.wrapped.mint(self.address, caller, minted).await?;
            }
            Some(rewards) => {
                self.wrapped.mint(self.address, self.address, minted).await?;
                self.wrapped
                    .approve(self.address, rewards.address(), minted)
                    .await?;
                rewards.stake_for(self.address, caller, minted).await?;
            }
        }

        info!(
            account = %caller,
            amount,
            minted,
            lock_now,
            staked = stake_target.is_some(),
            pending_incentive = state.incentive_crv,
            "💰 CRV deposited"
        );
        Ok(minted)
    }

    pub async fn deposit_all(
        &self,
        caller: Address,
        lock_now: bool,
        stake_target: Option<&BaseRewardPool>,
    ) -> Result<Amount> {
        let balance = self.crv.balance_of(caller).await;
        self.deposit(caller, balance, lock_now, stake_target).await
    }

    /// Locks everything pending and pays the accumulated incentive to the caller in wrapped
    /// tokens.
    pub async fn lock_crv(&self, caller: Address) -> Result<Amount> {
        let mut state = self.state.lock().await;
        if state.released {
            return Err(ProtocolError::Shutdown);
        }
        self.lock_pending(&mut state).await?;

        let incentive = std::mem::take(&mut state.incentive_crv);
        if incentive > 0 {
            self.wrapped.mint(self.address, caller, incentive).await?;
            info!(account = %caller, incentive, "🎁 Lock incentive paid");
        }
        Ok(incentive)
    }

    async fn lock_pending(&self, state: &mut LockerState) -> Result<()> {
        let pending = self.crv.balance_of(self.address).await;
        if pending == 0 {
            return Ok(());
        }
        let now = self.clock.now();
        let locked = self.proxy.locked().await;
        if locked.amount == 0 || locked.end <= now {
            return Err(ProtocolError::NotInitialized);
        }
        self.crv
            .transfer(self.address, self.proxy.address(), pending)
            .await?;
        if let Err(e) = self.proxy.increase_amount(self.address, pending).await {
            self.proxy.return_crv(self.address, pending).await?;
            return Err(e);
        }

        let unlock_at = now + self.params.max_lock_time;
        let unlock_in_weeks = (unlock_at / WEEK) * WEEK;
        // Only moves on week boundaries; a refused extension is retried on the next lock
        if unlock_in_weeks.saturating_sub(state.unlock_time) > 2 {
            match self.proxy.increase_time(self.address, unlock_at).await {
                Ok(()) => state.unlock_time = unlock_in_weeks,
                Err(e) => warn!(unlock_time = unlock_in_weeks, error = %e, "Lock extension refused"),
            }
        }
        debug!(amount = pending, unlock_time = state.unlock_time, "CRV locked");
        Ok(())
    }

    /// Withdraws the matured escrow lock back into the depositor and opens redemption.
    pub async fn release_lock(&self, caller: Address) -> Result<Amount> {
        self.permissions.require(Role::Owner, caller)?;
        let mut state = self.state.lock().await;
        if state.released {
            return Err(ProtocolError::Shutdown);
        }
        let amount = self.proxy.release(self.address).await?;
        state.released = true;
        info!(amount, "🔓 Escrow lock released, redemption open");
        Ok(amount)
    }

    /// Burns `amount` wrapped tokens and returns the same amount of CRV.
    pub async fn redeem(&self, caller: Address, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Err(ProtocolError::InvalidAmount);
        }
        let state = self.state.lock().await;
        if !state.released {
            return Err(ProtocolError::invalid("lock has not been released"));
        }
        self.wrapped.burn(self.address, caller, amount).await?;
        self.crv.transfer(self.address, caller, amount).await?;
        info!(account = %caller, amount, "💸 Wrapped CRV redeemed");
        Ok(())
    }

    pub async fn incentive_crv(&self) -> Amount {
        self.state.lock().await.incentive_crv
    }

    pub async fn lock_incentive(&self) -> u32 {
        self.state.lock().await.lock_incentive_bps
    }

    pub async fn unlock_time(&self) -> Timestamp {
        self.state.lock().await.unlock_time
    }

    pub async fn is_released(&self) -> bool {
        self.state.lock().await.released
    }
}
