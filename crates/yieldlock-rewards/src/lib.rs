/*!
# Yieldlock reward ledgers

Per-pool streaming reward accounting:

- **stream**: the reward-per-share math and top-up smoothing ([`RewardStream`])
- **base**: the primary ledger staked with a pool's deposit token, paying CRV
  ([`BaseRewardPool`])
- **virtual_pool**: secondary ledgers mirroring a primary's shares and paying one secondary
  token each ([`VirtualRewardPool`])

Every ledger keeps its stream behind one `tokio::sync::Mutex`; the snapshot of an account and
the balance change that follows it run under the same guard.
*/

pub mod base;
pub mod stream;
pub mod virtual_pool;

pub use base::BaseRewardPool;
pub use stream::{QueueOutcome, RewardParams, RewardStream, DURATION, NEW_REWARD_RATIO};
pub use virtual_pool::VirtualRewardPool;

use async_trait::async_trait;
use yieldlock_types::{Address, Amount, PoolId, Result};

/// The pool controller as seen from a primary ledger: returns underlying LP to a staker who
/// withdraws and unwraps in one call.
#[async_trait]
pub trait PoolOperator: Send + Sync {
    /// `caller` must be the primary ledger of pool `pid`; the deposit tokens are burned
    /// from its own holding.
    async fn withdraw_to(
        &self,
        caller: Address,
        pid: PoolId,
        amount: Amount,
        to: Address,
    ) -> Result<()>;
}
