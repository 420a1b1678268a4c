//! External Lending Pool
//!
//! Multi-asset money-market style pool. Anyone can supply liquidity; flash
//! loans charge `premium_bips` and settle by pull: once the receiver's
//! callback returns, the pool collects `amount + premium` from it.

use borsh::{BorshDeserialize, BorshSerialize};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::access_control::Owned;
use crate::errors::{FlashError, FlashResult};
use crate::events::FlashEvent;
use crate::guard::ReentrancyGuard;
use crate::math::{bips_of, safe_add};
use crate::runtime::{FlashLoan, FlashReceipt, Runtime, Settlement};
use crate::types::{validate_bips, Address, Asset, LendingPoolConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct LendingPoolState {
    pub config: LendingPoolConfig,
    pub paused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LendingPool {
    state: LendingPoolState,
    guard: ReentrancyGuard,
}

impl Owned for LendingPool {
    fn owner(&self) -> Address {
        self.state.config.owner
    }
}

impl LendingPool {
    pub fn new(config: LendingPoolConfig) -> Self {
        Self {
            state: LendingPoolState { config, paused: false },
            guard: ReentrancyGuard::new(),
        }
    }

    pub fn state(&self) -> &LendingPoolState {
        &self.state
    }

    pub fn premium_bips(&self) -> u64 {
        self.state.config.premium_bips
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    pub fn guard(&self) -> &ReentrancyGuard {
        &self.guard
    }

    /// Premium charged on a loan of `amount`
    pub fn quote_premium(&self, amount: u64) -> FlashResult<u64> {
        bips_of(amount, self.premium_bips())
    }
}

/// Drawable amount of `asset` (0 while paused)
pub fn available_liquidity(rt: &Runtime, pool: &Address, asset: &Asset) -> FlashResult<u64> {
    if rt.lending_pool(pool)?.is_paused() {
        return Ok(0);
    }
    Ok(rt.balance_of(asset, pool))
}

/// Add liquidity to the pool
pub fn supply(rt: &mut Runtime, pool: &Address, provider: &Address, asset: &Asset, amount: u64) -> FlashResult<()> {
    rt.atomically(|rt| {
        if !rt.lending_pool(pool)?.guard().is_idle() {
            rt.flag_reentry(pool);
            return Err(FlashError::NotFreshEnvironment);
        }
        if amount == 0 {
            return Err(FlashError::ZeroAmount);
        }
        rt.move_funds(asset, provider, pool, amount)?;
        info!("supplied {} {:?} to lending pool", amount, asset);
        Ok(())
    })
}

/// Lend `amount` of `asset` to `receiver`, then collect principal + premium
pub fn flash_loan(
    rt: &mut Runtime,
    pool: &Address,
    caller: &Address,
    receiver: &Address,
    asset: &Asset,
    amount: u64,
    payload: &[u8],
) -> FlashResult<FlashReceipt> {
    rt.atomically(|rt| {
        let (idle, paused, premium) = {
            let state = rt.lending_pool(pool)?;
            (state.guard().is_idle(), state.is_paused(), state.quote_premium(amount)?)
        };
        if !idle {
            rt.flag_reentry(pool);
            return Err(FlashError::NotFreshEnvironment);
        }
        if amount == 0 {
            return Err(FlashError::ZeroAmount);
        }
        if paused {
            return Err(FlashError::PoolPaused);
        }

        let start = rt.balance_of(asset, pool);
        if amount > start {
            return Err(FlashError::InsufficientReserve { available: start, requested: amount });
        }

        rt.lending_pool_mut(pool)?.guard.enter()?;
        rt.clear_reentry(pool);
        rt.move_funds(asset, pool, receiver, amount)?;

        let loan = FlashLoan {
            lender: *pool,
            initiator: *caller,
            asset: *asset,
            amount,
            fee: premium,
            value: 0,
            payload: payload.to_vec(),
            settlement: Settlement::Pull,
        };
        rt.call_borrower(receiver, &loan)?;

        rt.lending_pool_mut(pool)?.guard.begin_verification()?;
        if rt.take_reentry(pool) {
            return Err(FlashError::NotFreshEnvironment);
        }
        rt.move_funds(asset, receiver, pool, loan.repayment()?)?;

        // Surplus sent straight to the pool fails like a shortfall
        let expected = safe_add(start, premium)?;
        let actual = rt.balance_of(asset, pool);
        if actual != expected {
            warn!("lending pool settled at {}, expected {}", actual, expected);
            return Err(FlashError::IncorrectEndingBalance { expected, actual });
        }

        rt.emit(*pool, FlashEvent::FlashLoan {
            receiver: *receiver,
            asset: *asset,
            amount,
            premium,
        });
        rt.lending_pool_mut(pool)?.guard.release();
        debug!("lending pool flash loan of {} collected premium {}", amount, premium);

        Ok(FlashReceipt {
            lender: *pool,
            asset: *asset,
            amount,
            fee: premium,
        })
    })
}

// ============ Administration ============

pub fn set_premium(rt: &mut Runtime, pool: &Address, caller: &Address, premium_bips: u64) -> FlashResult<()> {
    rt.atomically(|rt| {
        rt.lending_pool(pool)?.ensure_owner(caller)?;
        validate_bips(premium_bips)?;
        rt.lending_pool_mut(pool)?.state.config.premium_bips = premium_bips;
        rt.emit(*pool, FlashEvent::FeeScheduleUpdated {
            platform_fee_bips: 0,
            pool_fee_bips: premium_bips,
        });
        Ok(())
    })
}

pub fn pause(rt: &mut Runtime, pool: &Address, caller: &Address) -> FlashResult<()> {
    set_paused(rt, pool, caller, true)
}

pub fn unpause(rt: &mut Runtime, pool: &Address, caller: &Address) -> FlashResult<()> {
    set_paused(rt, pool, caller, false)
}

fn set_paused(rt: &mut Runtime, pool: &Address, caller: &Address, paused: bool) -> FlashResult<()> {
    rt.atomically(|rt| {
        rt.lending_pool(pool)?.ensure_owner(caller)?;
        rt.lending_pool_mut(pool)?.state.paused = paused;
        let event = if paused {
            FlashEvent::PoolPaused { by: *caller }
        } else {
            FlashEvent::PoolUnpaused { by: *caller }
        };
        rt.emit(*pool, event);
        Ok(())
    })
}
