//! Mathematical Utilities for flashvault
//!
//! Share issuance and fee arithmetic. Every quotient is computed in `u128`
//! and rounds in the direction that protects the pool: floor when paying
//! out or minting, ceil when burning shares for an exact asset amount.

use crate::constants::fees::BPS_DENOMINATOR;
use crate::errors::{FlashError, FlashResult};

/// floor(a * b / c)
pub fn mul_div_floor(a: u64, b: u64, c: u64) -> FlashResult<u64> {
    if c == 0 {
        return Err(FlashError::DivisionByZero);
    }
    let result = (a as u128)
        .checked_mul(b as u128)
        .ok_or(FlashError::Overflow)?
        / c as u128;

    u64::try_from(result).map_err(|_| FlashError::Overflow)
}

/// ceil(a * b / c)
pub fn mul_div_ceil(a: u64, b: u64, c: u64) -> FlashResult<u64> {
    if c == 0 {
        return Err(FlashError::DivisionByZero);
    }
    let product = (a as u128)
        .checked_mul(b as u128)
        .ok_or(FlashError::Overflow)?;
    let result = product.div_ceil(c as u128);

    u64::try_from(result).map_err(|_| FlashError::Overflow)
}

/// floor(amount * bips / 10000)
pub fn bips_of(amount: u64, bips: u64) -> FlashResult<u64> {
    mul_div_floor(amount, bips, BPS_DENOMINATOR)
}

/// Shares minted for a deposit
///
/// The first deposit mints 1:1. Later deposits mint
/// `floor(amount * total_shares / reserve_before)`, so a pool whose reserve
/// grew through fee income hands out fewer shares per unit.
pub fn shares_for_deposit(amount: u64, total_shares: u64, reserve_before: u64) -> FlashResult<u64> {
    if total_shares == 0 {
        return Ok(amount);
    }
    mul_div_floor(amount, total_shares, reserve_before)
}

/// Assets paid out for burning `shares`: floor(shares * reserve / total_shares)
pub fn assets_for_shares(shares: u64, total_shares: u64, reserve: u64) -> FlashResult<u64> {
    if total_shares == 0 {
        return Err(FlashError::NoSupply);
    }
    mul_div_floor(shares, reserve, total_shares)
}

/// Shares burned to pay out exactly `assets`: ceil(assets * total_shares / reserve)
pub fn shares_for_assets(assets: u64, total_shares: u64, reserve: u64) -> FlashResult<u64> {
    if total_shares == 0 {
        return Err(FlashError::NoSupply);
    }
    mul_div_ceil(assets, total_shares, reserve)
}

/// Safe addition with overflow check
pub fn safe_add(a: u64, b: u64) -> FlashResult<u64> {
    a.checked_add(b).ok_or(FlashError::Overflow)
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u64, b: u64) -> FlashResult<u64> {
    a.checked_sub(b).ok_or(FlashError::Underflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_mul_div_rounding() {
        assert_eq!(mul_div_floor(10, 1, 3).unwrap(), 3);
        assert_eq!(mul_div_ceil(10, 1, 3).unwrap(), 4);
        assert_eq!(mul_div_ceil(9, 1, 3).unwrap(), 3);
        assert_eq!(mul_div_floor(u64::MAX, u64::MAX, u64::MAX).unwrap(), u64::MAX);
    }

    #[test]
    fn test_mul_div_errors() {
        assert_eq!(mul_div_floor(1, 1, 0), Err(FlashError::DivisionByZero));
        assert_eq!(mul_div_floor(u64::MAX, 2, 1), Err(FlashError::Overflow));
    }

    #[test]
    fn test_bips_floor() {
        // 10,000 at 9 bips = 9
        assert_eq!(bips_of(10_000, 9).unwrap(), 9);
        // 1,111 at 9 bips = 0.9999 -> 0
        assert_eq!(bips_of(1_111, 9).unwrap(), 0);
        assert_eq!(bips_of(150_000, 5).unwrap(), 75);
    }

    #[test]
    fn test_first_deposit_is_one_to_one() {
        assert_eq!(shares_for_deposit(1_000, 0, 0).unwrap(), 1_000);
    }

    #[test]
    fn test_deposit_after_gain_mints_fewer_shares() {
        // R=2000 after an untracked gain, S=1000
        assert_eq!(shares_for_deposit(1_000, 1_000, 2_000).unwrap(), 500);
    }

    #[test]
    fn test_withdraw_math_on_empty_supply() {
        assert_eq!(assets_for_shares(1, 0, 0), Err(FlashError::NoSupply));
        assert_eq!(shares_for_assets(1, 0, 0), Err(FlashError::NoSupply));
    }

    #[test]
    fn test_shares_for_assets_rounds_up() {
        // R=3, S=2: 1 asset needs ceil(2/3) = 1 share
        assert_eq!(shares_for_assets(1, 2, 3).unwrap(), 1);
        assert_eq!(assets_for_shares(1, 2, 3).unwrap(), 1);
    }

    proptest! {
        #[test]
        fn prop_ceil_never_below_floor(a in 0u64..1_000_000_000, b in 0u64..1_000_000_000, c in 1u64..1_000_000_000) {
            let lo = mul_div_floor(a, b, c).unwrap();
            let hi = mul_div_ceil(a, b, c).unwrap();
            prop_assert!(hi >= lo);
            prop_assert!(hi - lo <= 1);
        }

        #[test]
        fn prop_burn_for_assets_covers_payout(
            reserve in 1u64..1_000_000_000,
            supply in 1u64..1_000_000_000,
            assets in 1u64..1_000_000_000,
        ) {
            prop_assume!(assets <= reserve);
            let burned = shares_for_assets(assets, supply, reserve).unwrap();
            // Redeeming the burned shares is never worth less than the assets paid
            let worth = mul_div_ceil(burned, reserve, supply).unwrap();
            prop_assert!(worth >= assets);
        }
    }
}
