//! Fee configuration and the earmark split.

use serde::{Deserialize, Serialize};
use yieldlock_types::math::{bps_of, checked_sub};
use yieldlock_types::{Amount, ProtocolError, Result};

/// Basis-point denominator shared by every fee.
pub const FEE_DENOMINATOR: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Share of each earmark sent to the fee manager.
    pub platform_fee_bps: u32,
    /// Share of each earmark sent to the treasury, when one is set.
    pub profit_fee_bps: u32,
}

impl FeeConfig {
    pub fn total(&self) -> u32 {
        self.platform_fee_bps.saturating_add(self.profit_fee_bps)
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            platform_fee_bps: 1000,
            profit_fee_bps: 700,
        }
    }
}

/// Per-fee floor/ceiling and the joint maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBounds {
    pub max_fees: u32,
    pub platform_min: u32,
    pub platform_max: u32,
    pub profit_min: u32,
    pub profit_max: u32,
}

impl Default for FeeBounds {
    fn default() -> Self {
        Self {
            max_fees: 2000,
            platform_min: 500,
            platform_max: 1500,
            profit_min: 300,
            profit_max: 1000,
        }
    }
}

impl FeeBounds {
    /// `Err(InvalidParameters)` when the sum exceeds `max_fees`; `Ok(false)` when the sum fits
    /// but one fee is outside its own range.
    pub fn check(&self, proposed: &FeeConfig) -> Result<bool> {
        if proposed.total() > self.max_fees {
            return Err(ProtocolError::invalid(format!(
                "fee sum {} exceeds maximum {}",
                proposed.total(),
                self.max_fees
            )));
        }
        let platform_ok = (self.platform_min..=self.platform_max).contains(&proposed.platform_fee_bps);
        let profit_ok = (self.profit_min..=self.profit_max).contains(&proposed.profit_fee_bps);
        Ok(platform_ok && profit_ok)
    }

    /// Bounds must admit at least one configuration and never exceed the denominator.
    pub fn validate(&self) -> Result<()> {
        if self.max_fees > FEE_DENOMINATOR {
            return Err(ProtocolError::invalid("max_fees above denominator"));
        }
        if self.platform_min > self.platform_max || self.profit_min > self.profit_max {
            return Err(ProtocolError::invalid("fee floor above ceiling"));
        }
        if self.platform_min.saturating_add(self.profit_min) > self.max_fees {
            return Err(ProtocolError::invalid("fee floors exceed max_fees"));
        }
        Ok(())
    }
}

/// How one earmarked amount is divided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeSplit {
    pub platform: Amount,
    pub profit: Amount,
    pub stakers: Amount,
}

impl FeeSplit {
    /// Without a treasury the profit share stays with stakers.
    pub fn compute(claimed: Amount, fees: &FeeConfig, has_treasury: bool) -> Result<Self> {
        let platform = bps_of(claimed, fees.platform_fee_bps)?;
        let profit = if has_treasury {
            bps_of(claimed, fees.profit_fee_bps)?
        } else {
            0
        };
        let stakers = checked_sub(checked_sub(claimed, platform)?, profit)?;
        Ok(Self {
            platform,
            profit,
            stakers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sum_over_max_rejected() {
        let bounds = FeeBounds::default();
        let result = bounds.check(&FeeConfig {
            platform_fee_bps: 1000,
            profit_fee_bps: 1001,
        });
        assert!(matches!(result, Err(ProtocolError::InvalidParameters(_))));
    }

    #[test]
    fn test_individual_bounds_soft_fail() {
        let bounds = FeeBounds::default();
        assert!(!bounds
            .check(&FeeConfig {
                platform_fee_bps: 100,
                profit_fee_bps: 500,
            })
            .unwrap());
        assert!(bounds
            .check(&FeeConfig {
                platform_fee_bps: 1200,
                profit_fee_bps: 800,
            })
            .unwrap());
    }

    #[test]
    fn test_split_without_treasury() {
        let split = FeeSplit::compute(10_000, &FeeConfig::default(), false).unwrap();
        assert_eq!(split.platform, 1_000);
        assert_eq!(split.profit, 0);
        assert_eq!(split.stakers, 9_000);
    }

    #[test]
    fn test_bad_bounds() {
        let bounds = FeeBounds {
            platform_min: 1500,
            profit_min: 600,
            ..FeeBounds::default()
        };
        assert!(bounds.validate().is_err());
        assert!(FeeBounds::default().validate().is_ok());
    }

    proptest! {
        #[test]
        fn prop_split_conserves_amount(
            claimed in 0u128..1_000_000_000_000_000_000_000u128,
            platform in 0u32..=1500,
            profit in 0u32..=500,
            has_treasury in any::<bool>(),
        ) {
            let fees = FeeConfig { platform_fee_bps: platform, profit_fee_bps: profit };
            let split = FeeSplit::compute(claimed, &fees, has_treasury).unwrap();
            prop_assert_eq!(split.platform + split.profit + split.stakers, claimed);
            prop_assert!(split.platform + split.profit <= claimed * fees.total() as u128 / 10_000);
        }
    }
}
