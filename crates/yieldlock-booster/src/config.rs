use crate::booster::BoosterParams;
use crate::fees::{FeeBounds, FeeConfig};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use yieldlock_factory::StashTemplate;
use yieldlock_locker::LockerParams;
use yieldlock_rewards::RewardParams;

/// Deployment configuration, one section per component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub rewards: RewardsConfig,
    pub fees: FeesConfig,
    pub locker: LockerParams,
    /// Template the stash factory starts with.
    pub stash: StashTemplate,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardsConfig {
    pub duration: u64,
    pub new_reward_ratio: u64,
    pub max_extra_rewards: usize,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        let params = RewardParams::default();
        Self {
            duration: params.duration,
            new_reward_ratio: params.new_reward_ratio as u64,
            max_extra_rewards: params.max_extra_rewards,
        }
    }
}

impl From<RewardsConfig> for RewardParams {
    fn from(config: RewardsConfig) -> Self {
        RewardParams {
            duration: config.duration,
            new_reward_ratio: config.new_reward_ratio as u128,
            max_extra_rewards: config.max_extra_rewards,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeesConfig {
    pub platform_fee_bps: u32,
    pub profit_fee_bps: u32,
    pub max_fees: u32,
    pub platform_min: u32,
    pub platform_max: u32,
    pub profit_min: u32,
    pub profit_max: u32,
}

impl Default for FeesConfig {
    fn default() -> Self {
        let fees = FeeConfig::default();
        let bounds = FeeBounds::default();
        Self {
            platform_fee_bps: fees.platform_fee_bps,
            profit_fee_bps: fees.profit_fee_bps,
            max_fees: bounds.max_fees,
            platform_min: bounds.platform_min,
            platform_max: bounds.platform_max,
            profit_min: bounds.profit_min,
            profit_max: bounds.profit_max,
        }
    }
}

impl From<FeesConfig> for BoosterParams {
    fn from(config: FeesConfig) -> Self {
        BoosterParams {
            fee_bounds: FeeBounds {
                max_fees: config.max_fees,
                platform_min: config.platform_min,
                platform_max: config.platform_max,
                profit_min: config.profit_min,
                profit_max: config.profit_max,
            },
            fees: FeeConfig {
                platform_fee_bps: config.platform_fee_bps,
                profit_fee_bps: config.profit_fee_bps,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty`, `compact` or `json`.
    pub format: String,
    pub file_output: Option<PathBuf>,
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_output: None,
            module_filters: HashMap::new(),
        }
    }
}

impl ProtocolConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// File (or defaults), then environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `YIELDLOCK_*` environment variable overrides. Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(val) = env_parse("YIELDLOCK_PLATFORM_FEE_BPS") {
            self.fees.platform_fee_bps = val;
        }
        if let Some(val) = env_parse("YIELDLOCK_PROFIT_FEE_BPS") {
            self.fees.profit_fee_bps = val;
        }
        if let Some(val) = env_parse("YIELDLOCK_MAX_FEES") {
            self.fees.max_fees = val;
        }
        if let Some(val) = env_parse("YIELDLOCK_LOCK_INCENTIVE_BPS") {
            self.locker.lock_incentive_bps = val;
        }
        if let Some(val) = env_parse("YIELDLOCK_REWARD_DURATION") {
            self.rewards.duration = val;
        }
        if let Some(val) = env_parse("YIELDLOCK_MAX_EXTRA_REWARDS") {
            self.rewards.max_extra_rewards = val;
        }
        if let Some(val) = env_parse("YIELDLOCK_STASH_MAX_TOKENS") {
            self.stash.max_tokens = val;
        }
        if let Ok(level) = env::var("YIELDLOCK_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
        if let Ok(format) = env::var("YIELDLOCK_LOG_FORMAT") {
            if !format.is_empty() {
                self.logging.format = format;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.rewards.duration == 0 {
            bail!("rewards.duration must be positive");
        }
        if self.rewards.new_reward_ratio == 0 {
            bail!("rewards.new_reward_ratio must be positive");
        }
        let booster = self.booster_params();
        booster.fee_bounds.validate()?;
        if !booster.fee_bounds.check(&booster.fees)? {
            bail!(
                "fees {}/{} outside their bounds",
                booster.fees.platform_fee_bps,
                booster.fees.profit_fee_bps
            );
        }
        if self.locker.lock_incentive_bps > self.locker.max_lock_incentive_bps {
            bail!(
                "locker.lock_incentive_bps {} above maximum {}",
                self.locker.lock_incentive_bps,
                self.locker.max_lock_incentive_bps
            );
        }
        if self.stash.max_tokens == 0 {
            bail!("stash.max_tokens must be positive");
        }
        Ok(())
    }

    pub fn reward_params(&self) -> RewardParams {
        self.rewards.clone().into()
    }

    pub fn booster_params(&self) -> BoosterParams {
        self.fees.clone().into()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
