//! Reward stream accounting shared by primary and secondary ledgers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use yieldlock_types::math::{checked_add, checked_mul_div, checked_sub, SCALE};
use yieldlock_types::{Address, Amount, ProtocolError, Result, Timestamp};

/// Ratio (per mille) of already-streamed reward to incoming reward below which a mid-period
/// top-up is applied immediately instead of being queued.
pub const NEW_REWARD_RATIO: u128 = 830;

/// Streaming window in seconds.
pub const DURATION: u64 = 604_800;

/// Bound on the secondary-ledger fan-out of one primary ledger.
pub const MAX_EXTRA_REWARDS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardParams {
    pub duration: u64,
    pub new_reward_ratio: u128,
    pub max_extra_rewards: usize,
}

impl Default for RewardParams {
    fn default() -> Self {
        Self {
            duration: DURATION,
            new_reward_ratio: NEW_REWARD_RATIO,
            max_extra_rewards: MAX_EXTRA_REWARDS,
        }
    }
}

/// Outcome of [`RewardStream::queue_new_rewards`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOutcome {
    /// A new rate was applied; carries the streamed total including any leftover.
    Applied(Amount),
    /// The amount was held back in `queued_rewards`.
    Deferred,
}

/// Reward-per-share accounting for one ledger.
///
/// All methods take the current time explicitly; the owning ledger reads its clock once per
/// operation and runs the snapshot and the mutation against the same instant.
#[derive(Debug, Clone, Default)]
pub struct RewardStream {
    pub reward_rate: Amount,
    pub period_finish: Timestamp,
    pub last_update_time: Timestamp,
    pub reward_per_share_stored: u128,
    pub queued_rewards: Amount,
    pub current_rewards: Amount,
    pub historical_rewards: Amount,
    pub total_shares: Amount,
    shares: HashMap<Address, Amount>,
    reward_per_share_paid: HashMap<Address, u128>,
    owed: HashMap<Address, Amount>,
}

impl RewardStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_time_reward_applicable(&self, now: Timestamp) -> Timestamp {
        now.min(self.period_finish)
    }

    pub fn reward_per_share(&self, now: Timestamp) -> Result<u128> {
        if self.total_shares == 0 {
            return Ok(self.reward_per_share_stored);
        }
        let elapsed = self
            .last_time_reward_applicable(now)
            .saturating_sub(self.last_update_time) as u128;
        let streamed = elapsed
            .checked_mul(self.reward_rate)
            .ok_or(ProtocolError::MathOverflow)?;
        let delta = checked_mul_div(streamed, SCALE, self.total_shares)?;
        checked_add(self.reward_per_share_stored, delta)
    }

    pub fn earned(&self, account: &Address, now: Timestamp) -> Result<Amount> {
        let rps = self.reward_per_share(now)?;
        let paid = self.reward_per_share_paid.get(account).copied().unwrap_or(0);
        let accrued = checked_mul_div(self.shares_of(account), rps.saturating_sub(paid), SCALE)?;
        checked_add(accrued, self.owed_to(account))
    }

    /// Checkpoints the global accumulator and, if given, the account's owed reward.
    pub fn update(&mut self, account: Option<&Address>, now: Timestamp) -> Result<()> {
        self.reward_per_share_stored = self.reward_per_share(now)?;
        self.last_update_time = self.last_time_reward_applicable(now);
        if let Some(account) = account {
            let earned = self.earned(account, now)?;
            self.owed.insert(*account, earned);
            self.reward_per_share_paid
                .insert(*account, self.reward_per_share_stored);
        }
        Ok(())
    }

    /// Adds shares; the caller must have run [`RewardStream::update`] for `account` first.
    pub fn add_shares(&mut self, account: Address, amount: Amount) -> Result<()> {
        let total = checked_add(self.total_shares, amount)?;
        let balance = checked_add(self.shares_of(&account), amount)?;
        self.total_shares = total;
        self.shares.insert(account, balance);
        Ok(())
    }

    pub fn remove_shares(&mut self, account: Address, amount: Amount) -> Result<()> {
        let available = self.shares_of(&account);
        if available < amount {
            return Err(ProtocolError::InsufficientBalance {
                account,
                available,
                needed: amount,
            });
        }
        self.total_shares = checked_sub(self.total_shares, amount)?;
        if available == amount {
            self.shares.remove(&account);
        } else {
            self.shares.insert(account, available - amount);
        }
        Ok(())
    }

    /// Zeroes and returns what `account` is owed. Run [`RewardStream::update`] first.
    pub fn take_owed(&mut self, account: &Address) -> Amount {
        self.owed.insert(*account, 0).unwrap_or(0)
    }

    /// Restores an owed amount whose payout failed.
    pub fn restore_owed(&mut self, account: Address, amount: Amount) {
        *self.owed.entry(account).or_insert(0) += amount;
    }

    pub fn shares_of(&self, account: &Address) -> Amount {
        self.shares.get(account).copied().unwrap_or(0)
    }

    pub fn owed_to(&self, account: &Address) -> Amount {
        self.owed.get(account).copied().unwrap_or(0)
    }

    pub fn paid_of(&self, account: &Address) -> u128 {
        self.reward_per_share_paid.get(account).copied().unwrap_or(0)
    }

    pub fn holders(&self) -> impl Iterator<Item = (&Address, &Amount)> {
        self.shares.iter()
    }

    pub fn sum_of_shares(&self) -> Amount {
        self.shares.values().sum()
    }

    /// Adds the incoming amount (plus anything queued) to the stream, or defers it when the
    /// current period has already streamed a large share of it.
    pub fn queue_new_rewards(
        &mut self,
        amount: Amount,
        now: Timestamp,
        params: &RewardParams,
    ) -> Result<QueueOutcome> {
        let amount = checked_add(amount, self.queued_rewards)?;
        if amount == 0 {
            return Ok(QueueOutcome::Deferred);
        }

        if now >= self.period_finish {
            let total = self.notify_reward_amount(amount, now, params.duration)?;
            self.queued_rewards = 0;
            return Ok(QueueOutcome::Applied(total));
        }

        let period_start = self.period_finish.saturating_sub(params.duration);
        let elapsed = now.saturating_sub(period_start) as u128;
        let current_at_now = self
            .reward_rate
            .checked_mul(elapsed)
            .ok_or(ProtocolError::MathOverflow)?;
        let queued_ratio = checked_mul_div(current_at_now, 1000, amount)?;

        if queued_ratio < params.new_reward_ratio {
            let total = self.notify_reward_amount(amount, now, params.duration)?;
            self.queued_rewards = 0;
            Ok(QueueOutcome::Applied(total))
        } else {
            self.queued_rewards = amount;
            Ok(QueueOutcome::Deferred)
        }
    }

    /// Direct top-up that skips the ratio check; picked up by the next queue call.
    pub fn donate(&mut self, amount: Amount) -> Result<()> {
        self.queued_rewards = checked_add(self.queued_rewards, amount)?;
        Ok(())
    }

    fn notify_reward_amount(
        &mut self,
        reward: Amount,
        now: Timestamp,
        duration: u64,
    ) -> Result<Amount> {
        self.update(None, now)?;
        self.historical_rewards = checked_add(self.historical_rewards, reward)?;

        let mut total = reward;
        if now < self.period_finish {
            let remaining = (self.period_finish - now) as u128;
            let leftover = remaining
                .checked_mul(self.reward_rate)
                .ok_or(ProtocolError::MathOverflow)?;
            total = checked_add(total, leftover)?;
        }
        self.reward_rate = total / duration as u128;
        self.current_rewards = total;
        self.last_update_time = now;
        self.period_finish = now + duration;
        Ok(total)
    }
}
