/*!
# External escrow / gauge contracts

Narrow call contracts the Yieldlock core depends on. The protocol never re-implements the
policies behind them (for example the escrow's refusal of contract callers); failures are
returned as `anyhow::Error` and passed through to the caller untouched.

The [`memory`] module carries in-memory implementations with the same observable behaviour,
used by the test suites and by local simulations.
*/

pub mod memory;

pub use memory::{
    MemoryDelegateRegistry, MemoryGauge, MemoryGaugeController, MemoryMinter, MemoryVotingEscrow,
};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use yieldlock_token::SharedToken;
use yieldlock_types::{Address, Amount, Timestamp};

/// Maximum escrow lock length (4 years).
pub const MAX_LOCK_TIME: u64 = 4 * 365 * 86_400;

/// Liquidity gauge accruing emissions to staked LP tokens.
#[async_trait]
pub trait Gauge: Send + Sync {
    fn address(&self) -> Address;

    /// LP token staked into this gauge.
    fn lp_token(&self) -> Address;

    /// Pulls `amount` LP from `caller` (which must have approved the gauge).
    async fn deposit(&self, caller: Address, amount: Amount) -> Result<()>;

    async fn withdraw(&self, caller: Address, amount: Amount) -> Result<()>;

    async fn balance_of(&self, account: Address) -> Amount;

    /// Checkpoints `account` and returns its lifetime primary emission.
    async fn integrate_fraction(&self, account: Address) -> Result<Amount>;

    async fn claimable_rewards(&self, account: Address, token: Address) -> Amount;

    /// Sends every claimable secondary reward of `caller` to `receiver`.
    async fn claim_rewards(&self, caller: Address, receiver: Address) -> Result<()>;

    async fn reward_tokens(&self) -> Vec<SharedToken>;
}

/// Mints the primary emission token for gauge stakers.
#[async_trait]
pub trait Minter: Send + Sync {
    /// Mints everything `caller` accrued on `gauge` since the last mint; returns the amount.
    async fn mint(&self, caller: Address, gauge: &dyn Gauge) -> Result<Amount>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedBalance {
    pub amount: Amount,
    pub end: Timestamp,
}

/// Time-lock granting voting power for the locked governance-pool token.
#[async_trait]
pub trait VotingEscrow: Send + Sync {
    fn address(&self) -> Address;

    async fn create_lock(&self, caller: Address, amount: Amount, unlock_time: Timestamp)
        -> Result<()>;

    async fn increase_amount(&self, caller: Address, amount: Amount) -> Result<()>;

    async fn increase_unlock_time(&self, caller: Address, unlock_time: Timestamp) -> Result<()>;

    /// Returns the whole lock to `caller` once it has expired.
    async fn withdraw(&self, caller: Address) -> Result<()>;

    async fn locked(&self, account: Address) -> LockedBalance;

    /// Current voting power of `account`.
    async fn balance_of(&self, account: Address) -> Amount;
}

/// Gauge weight voting.
#[async_trait]
pub trait GaugeController: Send + Sync {
    async fn vote_for_gauge_weights(&self, caller: Address, gauge: Address, weight: u32)
        -> Result<()>;
}

/// Off-chain vote delegation registry.
#[async_trait]
pub trait DelegateRegistry: Send + Sync {
    async fn set_delegate(&self, caller: Address, space: &str, delegate: Address) -> Result<()>;

    async fn clear_delegate(&self, caller: Address, space: &str) -> Result<()>;

    async fn delegation(&self, account: Address, space: &str) -> Option<Address>;
}

pub type SharedGauge = Arc<dyn Gauge>;
