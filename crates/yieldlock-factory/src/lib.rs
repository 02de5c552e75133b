/*!
# Yieldlock factories

Constructors the controller calls when a pool is added, plus the stash they produce:

- [`RewardFactory`]: primary ledgers, and secondary ledgers on behalf of access-listed stashes
- [`TokenFactory`]: the per-pool deposit token, minted only by the controller
- [`StashFactory`]: independent [`ExtraRewardStash`] instances built from one shared
  [`StashTemplate`]
*/

pub mod reward_factory;
pub mod stash;
pub mod stash_factory;
pub mod token_factory;

pub use reward_factory::RewardFactory;
pub use stash::{ExtraRewardStash, RewardHook, StashInit, StashOperator, StashTemplate};
pub use stash_factory::StashFactory;
pub use token_factory::TokenFactory;
