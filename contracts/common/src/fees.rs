//! Fee / Reward Policy
//!
//! Basis-point schedules and the floor-rounding rules used to price a flash
//! loan. A reserve pool charges `platform + pool` bips on the borrowed
//! amount; the platform part is carved out first and the pool keeps the
//! remainder, including any rounding dust.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::constants::fees::{DEFAULT_PLATFORM_FEE_BIPS, DEFAULT_POOL_FEE_BIPS, MAX_FEE_BIPS};
use crate::errors::{FlashError, FlashResult};
use crate::math::{bips_of, safe_add, safe_sub};
use crate::types::validate_bips;

/// Pool-level fee rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct FeeSchedule {
    /// Share routed to the fee vault
    pub platform_fee_bips: u64,
    /// Share kept by the pool for its holders
    pub pool_fee_bips: u64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::new(DEFAULT_PLATFORM_FEE_BIPS, DEFAULT_POOL_FEE_BIPS)
    }
}

/// A reward broken into its platform and pool parts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RewardSplit {
    pub platform: u64,
    pub pool: u64,
}

impl RewardSplit {
    /// platform + pool
    pub fn total(&self) -> u64 {
        self.platform.saturating_add(self.pool)
    }
}

impl FeeSchedule {
    pub fn new(platform_fee_bips: u64, pool_fee_bips: u64) -> Self {
        Self { platform_fee_bips, pool_fee_bips }
    }

    /// Combined rate charged to borrowers
    pub fn total_bips(&self) -> u64 {
        self.platform_fee_bips.saturating_add(self.pool_fee_bips)
    }

    /// Reject schedules whose parts or sum exceed the protocol maximum
    pub fn validate(&self) -> FlashResult<()> {
        validate_bips(self.platform_fee_bips)?;
        validate_bips(self.pool_fee_bips)?;
        let total = safe_add(self.platform_fee_bips, self.pool_fee_bips)?;
        if total > MAX_FEE_BIPS {
            return Err(FlashError::InvalidFee { bips: total, maximum: MAX_FEE_BIPS });
        }
        Ok(())
    }

    /// Reward required on top of the principal: floor(amount * total_bips / 10000)
    pub fn reserved_fee(&self, amount: u64) -> FlashResult<u64> {
        bips_of(amount, self.total_bips())
    }

    /// Split the reward for `amount` into platform and pool parts
    pub fn split(&self, amount: u64) -> FlashResult<RewardSplit> {
        let reward = self.reserved_fee(amount)?;
        let platform = bips_of(amount, self.platform_fee_bips)?.min(reward);
        let pool = safe_sub(reward, platform)?;
        Ok(RewardSplit { platform, pool })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_fee_floors() {
        let schedule = FeeSchedule::new(2, 3);
        assert_eq!(schedule.reserved_fee(100_000).unwrap(), 50);
        // 1,999 * 5 / 10000 = 0.9995 -> 0
        assert_eq!(schedule.reserved_fee(1_999).unwrap(), 0);
        assert_eq!(schedule.reserved_fee(2_000).unwrap(), 1);
    }

    #[test]
    fn test_split_gives_dust_to_pool() {
        let schedule = FeeSchedule::new(2, 3);
        // reward = floor(2000*5/1e4) = 1, platform = floor(2000*2/1e4) = 0
        let split = schedule.split(2_000).unwrap();
        assert_eq!(split, RewardSplit { platform: 0, pool: 1 });

        let split = schedule.split(1_000_000).unwrap();
        assert_eq!(split, RewardSplit { platform: 200, pool: 300 });
        assert_eq!(split.total(), schedule.reserved_fee(1_000_000).unwrap());
    }

    #[test]
    fn test_zero_schedule_is_free() {
        let schedule = FeeSchedule::new(0, 0);
        assert_eq!(schedule.split(123_456).unwrap(), RewardSplit::default());
    }

    #[test]
    fn test_validate_sum() {
        assert!(FeeSchedule::new(MAX_FEE_BIPS, 0).validate().is_ok());
        assert!(matches!(
            FeeSchedule::new(MAX_FEE_BIPS, 1).validate(),
            Err(FlashError::InvalidFee { bips, .. }) if bips == MAX_FEE_BIPS + 1
        ));
    }
}
