use std::sync::Arc;
use tracing::{debug, info};
use yieldlock_gauge::{
    DelegateRegistry, Gauge, GaugeController, LockedBalance, Minter, VotingEscrow,
};
use yieldlock_token::{FungibleToken, SharedToken};
use yieldlock_types::{Address, Amount, PermissionTable, Reassign, Result, Role, Timestamp};

/// Vote-delegation namespace the proxy registers its delegate under.
pub const DELEGATE_SPACE: &str = "yieldlock.eth";

pub struct VoterProxy {
    address: Address,
    crv: SharedToken,
    escrow: Arc<dyn VotingEscrow>,
    minter: Arc<dyn Minter>,
    gauge_controller: Arc<dyn GaugeController>,
    delegate_registry: Arc<dyn DelegateRegistry>,
    permissions: PermissionTable,
}

impl VoterProxy {
    pub fn new(
        owner: Address,
        crv: SharedToken,
        escrow: Arc<dyn VotingEscrow>,
        minter: Arc<dyn Minter>,
        gauge_controller: Arc<dyn GaugeController>,
        delegate_registry: Arc<dyn DelegateRegistry>,
    ) -> Self {
        let permissions = PermissionTable::new()
            .with(Role::Owner, owner, Reassign::Holder)
            .with(Role::Operator, Address::ZERO, Reassign::Owner)
            .with(Role::Depositor, Address::ZERO, Reassign::Owner);
        Self {
            address: Address::derive("voter-proxy"),
            crv,
            escrow,
            minter,
            gauge_controller,
            delegate_registry,
            permissions,
        }
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

    pub fn set_operator(&self, caller: Address, operator: Address) -> Result<()> {
        self.permissions.reassign(Role::Operator, caller, operator)
    }

    pub fn set_depositor(&self, caller: Address, depositor: Address) -> Result<()> {
        self.permissions.reassign(Role::Depositor, caller, depositor)
    }

    /// Stakes the proxy's whole `lp` balance into `gauge`.
    pub async fn deposit(&self, caller: Address, lp: &SharedToken, gauge: &dyn Gauge) -> Result<Amount> {
        self.permissions
            .require_any(&[Role::Operator, Role::Depositor], caller)?;
        let balance = lp.balance_of(self.address).await;
        if balance > 0 {
            lp.approve(self.address, gauge.address(), balance).await?;
            gauge.deposit(self.address, balance).await?;
        }
        debug!(gauge = %gauge.address(), amount = balance, "Proxy staked into gauge");
        Ok(balance)
    }

    /// Sends `amount` LP to the caller, pulling only the shortfall out of the gauge.
    pub async fn withdraw(
        &self,
        caller: Address,
        lp: &SharedToken,
        gauge: &dyn Gauge,
        amount: Amount,
    ) -> Result<()> {
        self.permissions
            .require_any(&[Role::Operator, Role::Depositor], caller)?;
        let held = lp.balance_of(self.address).await;
        if held < amount {
            gauge.withdraw(self.address, amount - held).await?;
        }
        lp.transfer(self.address, caller, amount).await?;
        debug!(gauge = %gauge.address(), to = %caller, amount, "Proxy withdrew from gauge");
        Ok(())
    }

    pub async fn withdraw_all(
        &self,
        caller: Address,
        lp: &SharedToken,
        gauge: &dyn Gauge,
    ) -> Result<Amount> {
        let amount = gauge.balance_of(self.address).await + lp.balance_of(self.address).await;
        self.withdraw(caller, lp, gauge, amount).await?;
        Ok(amount)
    }

    /// Locks `amount` CRV the proxy already holds until `unlock_time`.
    pub async fn create_lock(
        &self,
        caller: Address,
        amount: Amount,
        unlock_time: Timestamp,
    ) -> Result<()> {
        self.permissions.require(Role::Depositor, caller)?;
        self.crv.approve(self.address, self.escrow.address(), amount).await?;
        self.escrow
            .create_lock(self.address, amount, unlock_time)
            .await?;
        info!(amount, unlock_time, "🔒 Proxy lock created");
        Ok(())
    }

    pub async fn increase_amount(&self, caller: Address, amount: Amount) -> Result<()> {
        self.permissions.require(Role::Depositor, caller)?;
        self.crv.approve(self.address, self.escrow.address(), amount).await?;
        self.escrow.increase_amount(self.address, amount).await?;
        info!(amount, "🔒 Proxy lock increased");
        Ok(())
    }

    pub async fn increase_time(&self, caller: Address, unlock_time: Timestamp) -> Result<()> {
        self.permissions.require(Role::Depositor, caller)?;
        self.escrow
            .increase_unlock_time(self.address, unlock_time)
            .await?;
        debug!(unlock_time, "Proxy lock extended");
        Ok(())
    }

    /// Withdraws the expired lock and hands the CRV to the caller.
    pub async fn release(&self, caller: Address) -> Result<Amount> {
        self.permissions.require(Role::Depositor, caller)?;
        let locked = self.escrow.locked(self.address).await;
        self.escrow.withdraw(self.address).await?;
        self.crv.transfer(self.address, caller, locked.amount).await?;
        info!(amount = locked.amount, to = %caller, "🔓 Proxy lock released");
        Ok(locked.amount)
    }

    /// Hands back `amount` of the proxy's unlocked CRV to the depositor, after the escrow
    /// refused to take it.
    pub async fn return_crv(&self, caller: Address, amount: Amount) -> Result<()> {
        self.permissions.require(Role::Depositor, caller)?;
        self.crv.transfer(self.address, caller, amount).await?;
        debug!(amount, to = %caller, "Proxy returned unlocked CRV");
        Ok(())
    }

    /// Mints the emission accrued on `gauge` and forwards it to the caller.
    pub async fn claim_crv(&self, caller: Address, gauge: &dyn Gauge) -> Result<Amount> {
        self.permissions.require(Role::Operator, caller)?;
        let minted = self.minter.mint(self.address, gauge).await?;
        if minted > 0 {
            self.crv.transfer(self.address, caller, minted).await?;
        }
        debug!(gauge = %gauge.address(), amount = minted, "Proxy claimed emission");
        Ok(minted)
    }

    pub async fn claim_rewards(
        &self,
        caller: Address,
        gauge: &dyn Gauge,
        receiver: Address,
    ) -> Result<()> {
        self.permissions.require(Role::Operator, caller)?;
        gauge.claim_rewards(self.address, receiver).await?;
        Ok(())
    }

    pub async fn vote_gauge_weight(
        &self,
        caller: Address,
        gauge: Address,
        weight: u32,
    ) -> Result<()> {
        self.permissions.require(Role::Operator, caller)?;
        self.gauge_controller
            .vote_for_gauge_weights(self.address, gauge, weight)
            .await?;
        Ok(())
    }

    pub async fn delegate_voting_power(&self, caller: Address, delegate: Address) -> Result<()> {
        self.permissions.require(Role::Operator, caller)?;
        self.delegate_registry
            .set_delegate(self.address, DELEGATE_SPACE, delegate)
            .await?;
        info!(delegate = %delegate, "🗳️ Voting power delegated");
        Ok(())
    }

    pub async fn clear_delegation(&self, caller: Address) -> Result<()> {
        self.permissions.require(Role::Operator, caller)?;
        self.delegate_registry
            .clear_delegate(self.address, DELEGATE_SPACE)
            .await?;
        info!("🗳️ Voting delegation cleared");
        Ok(())
    }

    pub async fn balance_of_pool(&self, gauge: &dyn Gauge) -> Amount {
        gauge.balance_of(self.address).await
    }

    pub async fn locked(&self) -> LockedBalance {
        self.escrow.locked(self.address).await
    }

    pub async fn voting_power(&self) -> Amount {
        self.escrow.balance_of(self.address).await
    }
}
